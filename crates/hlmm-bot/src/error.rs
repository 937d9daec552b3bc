//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Maker error: {0}")]
    Maker(#[from] hlmm_mm::MakerError),

    #[error("Executor error: {0}")]
    Executor(#[from] hlmm_executor::ExecutorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] hlmm_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
