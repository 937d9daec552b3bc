//! Feed error types.

use hlmm_core::PriceType;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("No {0} price available")]
    Unavailable(PriceType),

    #[error("{price_type} price is stale: age {age_ms}ms > {max_age_ms}ms")]
    Stale {
        price_type: PriceType,
        age_ms: u64,
        max_age_ms: u64,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
