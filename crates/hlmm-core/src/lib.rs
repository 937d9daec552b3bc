//! Core domain types for the hlmm quoting engine.
//!
//! This crate provides the shared data model used by every other crate:
//! - `Price`, `Size`: Precision-safe numeric types with tick/lot rounding
//! - `TradingPair`, `MarketSpec`: Market identification and trading rules
//! - `Side`, `PriceType`, `ClientOrderId`: Quoting enums and identifiers
//! - `Quote`, `Order`, `OrderState`, `Position`: Order lifecycle model
//! - `AccountEvent`, `VenueOrder`, `AccountState`: What the venue reports

pub mod decimal;
pub mod error;
pub mod execution;
pub mod market;
pub mod order;
pub mod types;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{MarketSpec, TradingPair};
pub use order::{ClientOrderId, PriceType, Side};
pub use types::{now_ms, AccountState, Bbo, LastTrade};

// Execution types
pub use execution::{
    AccountEvent, CancelRequest, Order, OrderRecord, OrderRequest, OrderState, Position, Quote,
    VenueOrder,
};
