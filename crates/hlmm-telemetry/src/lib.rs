//! Prometheus metrics, structured logging and session statistics for hlmm.
//!
//! - Prometheus metrics for refresh cycles, orders, vetoes and reconciliation
//! - Structured logging with tracing (JSON in production)
//! - Per-session trading statistics, logged periodically and on shutdown

pub mod error;
pub mod logging;
pub mod metrics;
pub mod session_stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use session_stats::{SessionStats, SideStats};
