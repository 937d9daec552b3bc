//! Main application orchestration.
//!
//! Builds the paper venue and the shared market cache, starts the engine
//! and keeps it running until Ctrl-C. Shutdown goes through the engine's
//! stop-with-grace so no order is left resting unknowingly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hlmm_executor::{start_engine, Clock, EngineParts, PaperVenue, ShutdownReport};
use hlmm_feed::MarketState;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::AppResult;

/// Main application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    /// Create a new application from validated configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<ShutdownReport> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            info!("Shutdown signal received");
        })
        .await
    }

    /// Run until `shutdown` resolves, then stop the engine and report.
    pub async fn run_until<F>(self, shutdown: F) -> AppResult<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        let clock = Clock::new();
        let market = MarketState::new();
        let pair = self.config.maker.trading_pair.clone();
        let (venue, events) =
            PaperVenue::new(self.config.paper.clone(), pair.clone(), market.clone(), clock);
        let market_task = venue.spawn_market();

        info!(
            pair = %pair,
            order_amount = %self.config.maker.order_amount,
            bid_spread = %self.config.maker.bid_spread,
            ask_spread = %self.config.maker.ask_spread,
            refresh_secs = self.config.maker.refresh_interval_secs,
            "Starting engine on paper venue"
        );

        let started = start_engine(EngineParts {
            config: self.config.maker.clone(),
            venue: venue.clone(),
            prices: Arc::new(market),
            events,
            clock,
        })
        .await;
        let (handle, mut engine_task) = match started {
            Ok(started) => started,
            Err(e) => {
                market_task.abort();
                return Err(e.into());
            }
        };

        let mut stats_interval =
            tokio::time::interval(Duration::from_secs(self.config.telemetry.stats_interval_secs));
        // First tick completes immediately.
        stats_interval.tick().await;

        tokio::pin!(shutdown);
        let mut engine_exited = false;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = stats_interval.tick() => {
                    let snapshot = handle.snapshot();
                    snapshot.stats.log_summary();
                    info!(
                        position = %snapshot.position.base_amount,
                        live_orders = snapshot.live_orders.len(),
                        mid = %venue.mid(),
                        "Engine status"
                    );
                }
                result = &mut engine_task => {
                    if let Err(e) = result {
                        error!(error = %e, "Engine task failed");
                    }
                    engine_exited = true;
                    break;
                }
            }
        }

        let report = handle.stop().await;
        if !engine_exited {
            if let Err(e) = engine_task.await {
                error!(error = %e, "Engine task failed during shutdown");
            }
        }
        market_task.abort();

        let report = report?;
        if report.is_clean() {
            info!(
                position = %report.position.base_amount,
                realized_pnl = %report.realized_pnl,
                "Engine stopped cleanly"
            );
        } else {
            warn!(
                abandoned = report.abandoned.len(),
                position = %report.position.base_amount,
                "Engine stopped with orders possibly resting on the venue"
            );
        }
        report.stats.log_summary();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use rust_decimal_macros::dec;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.maker.order_amount = dec!(0.001);
        config.maker.refresh_interval_secs = 1;
        config.paper.seed = Some(42);
        config.telemetry.stats_interval_secs = 2;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_and_stops_cleanly() {
        let app = Application::new(test_config()).unwrap();

        let report = app
            .run_until(tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(report.is_clean());
        assert!(report.stats.orders_created >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_failure_is_reported() {
        let mut app = Application::new(test_config()).unwrap();
        // Bypass load-time validation so the venue check at startup trips.
        app.config.maker.leverage = 10;
        app.config.paper.max_leverage = 5;

        let result = app.run_until(std::future::pending()).await;
        assert!(matches!(result, Err(AppError::Executor(_))));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = test_config();
        config.maker.order_amount = dec!(0);
        assert!(Application::new(config).is_err());
    }
}
