//! Market making error types.

use hlmm_core::Side;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MakerError {
    /// Reference price missing, stale or unusable. The cycle is skipped.
    #[error("Invalid reference price: {0}")]
    InvalidReferencePrice(String),

    #[error("Order rejected on {side}: {reason}")]
    OrderRejected { side: Side, reason: String },

    #[error("Request timed out: {0}")]
    RequestTimeout(String),

    #[error("Reconciliation mismatch: {0}")]
    ReconciliationMismatch(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl MakerError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidReferencePrice(_) => "invalid_reference_price",
            Self::OrderRejected { .. } => "order_rejected",
            Self::RequestTimeout(_) => "request_timeout",
            Self::ReconciliationMismatch(_) => "reconciliation_mismatch",
            Self::ConfigInvalid(_) => "config_invalid",
        }
    }
}

pub type MakerResult<T> = Result<T, MakerError>;
