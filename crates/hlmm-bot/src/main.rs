//! hlmm paper-trading bot - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Two-sided quoting engine running against the paper venue.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via HLMM_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // CLI arg > HLMM_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("HLMM_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = hlmm_bot::AppConfig::from_file(&config_path)?;

    hlmm_telemetry::init_logging(config.telemetry.log_filter.as_deref())?;

    info!("Starting hlmm v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        pair = %config.maker.trading_pair,
        "Configuration loaded"
    );

    let app = hlmm_bot::Application::new(config)?;
    let report = app.run().await?;

    if !report.is_clean() {
        anyhow::bail!(
            "{} order(s) left without terminal confirmation",
            report.abandoned.len()
        );
    }
    Ok(())
}
