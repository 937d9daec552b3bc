//! Application configuration.

use crate::error::{AppError, AppResult};
use hlmm_executor::PaperConfig;
use hlmm_mm::MakerConfig;
use serde::{Deserialize, Serialize};

/// Logging and statistics settings (`[telemetry]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub log_filter: Option<String>,

    /// Period of the session statistics summary.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_stats_interval_secs() -> u64 {
    300
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub maker: MakerConfig,

    #[serde(default)]
    pub paper: PaperConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.maker.validate()?;
        self.paper.validate()?;
        if self.maker.leverage > self.paper.max_leverage {
            return Err(AppError::Config(format!(
                "maker.leverage {} exceeds paper.max_leverage {}",
                self.maker.leverage, self.paper.max_leverage
            )));
        }
        if self.telemetry.stats_interval_secs == 0 {
            return Err(AppError::Config(
                "telemetry.stats_interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlmm_core::{PriceType, TradingPair};
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.telemetry.stats_interval_secs, 300);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = AppConfig::parse(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.maker.bid_spread, dec!(0.003));
        assert_eq!(config.maker.leverage, 5);
        assert_eq!(config.telemetry.log_filter.as_deref(), Some("info,hlmm=debug"));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_parse_sections() {
        let config = AppConfig::parse(
            r#"
            [maker]
            trading_pair = "ETH-USD"
            order_amount = "0.01"
            bid_spread = "0.002"
            ask_spread = "0.004"
            refresh_interval_secs = 5
            price_type = "best_bid"

            [paper]
            initial_mid = "3000"
            seed = 7

            [telemetry]
            log_filter = "warn"
            stats_interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.maker.trading_pair, TradingPair::new("ETH", "USD"));
        assert_eq!(config.maker.order_amount, dec!(0.01));
        assert_eq!(config.maker.ask_spread, dec!(0.004));
        assert_eq!(config.maker.price_type, PriceType::BestBid);
        // Unset fields keep their defaults.
        assert_eq!(config.maker.leverage, MakerConfig::default().leverage);
        assert_eq!(config.paper.initial_mid, dec!(3000));
        assert_eq!(config.paper.seed, Some(7));
        assert_eq!(config.telemetry.log_filter.as_deref(), Some("warn"));
    }

    #[test]
    fn test_invalid_maker_section_rejected() {
        let err = AppConfig::parse(
            r#"
            [maker]
            bid_spread = "1.5"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Maker(_)));
    }

    #[test]
    fn test_leverage_above_paper_limit_rejected() {
        let err = AppConfig::parse(
            r#"
            [maker]
            leverage = 20

            [paper]
            max_leverage = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_zero_stats_interval_rejected() {
        let mut config = AppConfig::default();
        config.telemetry.stats_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[maker]"));
        assert!(toml_str.contains("[paper]"));
        let back: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }
}
