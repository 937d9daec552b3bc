//! hlmm paper-trading bot.
//!
//! Wires the quoting engine to the in-memory paper venue:
//! - Loads `AppConfig` from TOML
//! - Drives the simulated market and the engine task
//! - Logs session statistics periodically and on shutdown

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, TelemetryConfig};
pub use error::{AppError, AppResult};
