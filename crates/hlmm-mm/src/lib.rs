//! Quoting strategy for the hlmm engine.
//!
//! Provides single-market quoting:
//! - Quote calculation from a reference price and fractional spreads
//! - Inventory and leverage bounds that shrink or veto a side
//! - Order lifecycle management (place/cancel/reconcile)
//! - Inventory tracking with PnL calculation
//!
//! # Architecture
//!
//! ```text
//! Refresh tick → compute_quotes()
//!                 ├─ RiskGovernor: shrink/veto per side
//!                 └─ LifecycleManager.on_cycle()
//!                      ↓
//!                 LifecycleAction: submit / cancel / reconcile
//!                      ↓
//!                 Venue results and account events → LifecycleManager
//! ```

pub mod config;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod quote_engine;
pub mod risk;

pub use config::MakerConfig;
pub use error::{MakerError, MakerResult};
pub use inventory::{Inventory, SideVolume};
pub use lifecycle::{
    AppliedFill, EventOutcome, LifecycleAction, LifecycleManager, LifecycleSnapshot,
    ReconcileOutcome, ReconcileReason,
};
pub use quote_engine::{compute_quotes, QuotePair};
pub use risk::{QuoteVeto, RiskGovernor, RiskVerdict, VetoReason};
