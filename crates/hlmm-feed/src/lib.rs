//! Market data for the hlmm quoting engine.
//!
//! Holds the most recent BBO and last trade for the quoted market and
//! derives the reference price that quotes are anchored to.

pub mod error;
pub mod market_state;

pub use error::{FeedError, FeedResult};
pub use market_state::{MarketState, ReferencePriceSource};
