//! Executor error types.

use hlmm_mm::MakerError;
use thiserror::Error;

/// Error reported by an account adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VenueError {
    /// Network trouble, rate limiting or a venue hiccup. Worth retrying.
    #[error("Transient venue error: {0}")]
    Transient(String),

    /// The venue refused the request outright.
    #[error("Venue error: {0}")]
    Fatal(String),
}

impl VenueError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type VenueResult<T> = Result<T, VenueError>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Venue(#[from] VenueError),

    /// Every attempt timed out or failed transiently. Whether the request
    /// reached the venue is unknown.
    #[error("{request} gave up after {attempts} attempts: {last}")]
    RequestTimeout {
        request: &'static str,
        attempts: u32,
        last: String,
    },

    #[error(transparent)]
    Config(#[from] MakerError),

    #[error("Engine is not running")]
    EngineStopped,
}

impl ExecutorError {
    /// Short label for metrics and the snapshot error ring.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Venue(VenueError::Transient(_)) => "venue_transient",
            Self::Venue(VenueError::Fatal(_)) => "venue_fatal",
            Self::RequestTimeout { .. } => "request_timeout",
            Self::Config(e) => e.kind(),
            Self::EngineStopped => "engine_stopped",
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
