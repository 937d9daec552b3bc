//! Market making configuration.

use hlmm_core::{PriceType, TradingPair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MakerError, MakerResult};

/// Market making configuration.
///
/// Loaded once at startup. Updates are validated and only take effect from
/// the next refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakerConfig {
    /// Market to quote.
    #[serde(default = "default_trading_pair")]
    pub trading_pair: TradingPair,

    /// Order size in base units (same on both sides).
    #[serde(default = "default_order_amount")]
    pub order_amount: Decimal,

    /// Bid offset from the reference price as a fraction (0.001 = 10 bps).
    #[serde(default = "default_spread")]
    pub bid_spread: Decimal,

    /// Ask offset from the reference price as a fraction.
    #[serde(default = "default_spread")]
    pub ask_spread: Decimal,

    /// Refresh cycle interval in seconds.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Orders older than this are cancelled.
    #[serde(default = "default_max_order_age_secs")]
    pub max_order_age_secs: u64,

    /// Leverage to set on the venue and to cap projected exposure with.
    #[serde(default = "default_leverage")]
    pub leverage: u32,

    /// Which book price quotes are anchored to.
    #[serde(default)]
    pub price_type: PriceType,

    /// Account address, logged at start only.
    #[serde(default)]
    pub wallet_address: Option<String>,

    /// Whether the account is a vault.
    #[serde(default)]
    pub use_vault: bool,

    /// A resting order is replaced only if its price is further than this
    /// from the new target.
    #[serde(default = "default_requote_tolerance_bps")]
    pub requote_tolerance_bps: Decimal,

    /// Maximum absolute inventory skew in base units.
    #[serde(default = "default_max_inventory_base")]
    pub max_inventory_base: Decimal,

    /// Neutral inventory in base units.
    #[serde(default)]
    pub inventory_target_base: Decimal,

    /// Market data older than this is not quoted on.
    #[serde(default = "default_stale_price_ms")]
    pub stale_price_ms: u64,

    /// Pending/Cancelling orders unacknowledged for longer than this
    /// trigger reconciliation.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Timeout for a single venue request attempt.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Retries for transient venue errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Age check cadence, independent of refresh.
    #[serde(default = "default_age_check_interval_ms")]
    pub age_check_interval_ms: u64,

    /// How long stop waits for cancels to be confirmed.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Client order ID prefix identifying this strategy's orders.
    #[serde(default = "default_strategy_tag")]
    pub strategy_tag: String,
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            trading_pair: default_trading_pair(),
            order_amount: default_order_amount(),
            bid_spread: default_spread(),
            ask_spread: default_spread(),
            refresh_interval_secs: default_refresh_interval_secs(),
            max_order_age_secs: default_max_order_age_secs(),
            leverage: default_leverage(),
            price_type: PriceType::default(),
            wallet_address: None,
            use_vault: false,
            requote_tolerance_bps: default_requote_tolerance_bps(),
            max_inventory_base: default_max_inventory_base(),
            inventory_target_base: Decimal::ZERO,
            stale_price_ms: default_stale_price_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            age_check_interval_ms: default_age_check_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            strategy_tag: default_strategy_tag(),
        }
    }
}

impl MakerConfig {
    pub fn max_order_age_ms(&self) -> u64 {
        self.max_order_age_secs.saturating_mul(1000)
    }

    pub fn refresh_interval_ms(&self) -> u64 {
        self.refresh_interval_secs.saturating_mul(1000)
    }

    pub fn leverage_decimal(&self) -> Decimal {
        Decimal::from(self.leverage)
    }

    /// Reject configurations the engine must not start with.
    pub fn validate(&self) -> MakerResult<()> {
        for (name, spread) in [("bid_spread", self.bid_spread), ("ask_spread", self.ask_spread)] {
            if spread < Decimal::ZERO || spread >= Decimal::ONE {
                return Err(invalid(format!("{name} must be in [0, 1), got {spread}")));
            }
        }
        if self.order_amount <= Decimal::ZERO {
            return Err(invalid(format!(
                "order_amount must be positive, got {}",
                self.order_amount
            )));
        }
        if self.refresh_interval_secs == 0 {
            return Err(invalid("refresh_interval_secs must be > 0"));
        }
        if self.max_order_age_secs == 0 {
            return Err(invalid("max_order_age_secs must be > 0"));
        }
        if !(1..=100).contains(&self.leverage) {
            return Err(invalid(format!(
                "leverage must be in [1, 100], got {}",
                self.leverage
            )));
        }
        if self.max_inventory_base <= Decimal::ZERO {
            return Err(invalid("max_inventory_base must be positive"));
        }
        if self.requote_tolerance_bps < Decimal::ZERO {
            return Err(invalid("requote_tolerance_bps must be >= 0"));
        }
        if self.stale_price_ms == 0
            || self.ack_timeout_ms == 0
            || self.request_timeout_ms == 0
            || self.age_check_interval_ms == 0
        {
            return Err(invalid("timeouts and intervals must be > 0"));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(invalid("retry_base_delay_ms must not exceed retry_max_delay_ms"));
        }
        if self.strategy_tag.is_empty() || self.strategy_tag.contains('_') {
            return Err(invalid("strategy_tag must be non-empty and contain no '_'"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> MakerError {
    MakerError::ConfigInvalid(msg.into())
}

fn default_trading_pair() -> TradingPair {
    TradingPair::new("BTC", "USD")
}
fn default_order_amount() -> Decimal {
    Decimal::new(1, 2) // 0.01 base
}
fn default_spread() -> Decimal {
    Decimal::new(1, 3) // 0.001 = 10 bps
}
fn default_refresh_interval_secs() -> u64 {
    15
}
fn default_max_order_age_secs() -> u64 {
    1800 // 30 minutes
}
fn default_leverage() -> u32 {
    1
}
fn default_requote_tolerance_bps() -> Decimal {
    Decimal::new(2, 0) // 2 bps
}
fn default_max_inventory_base() -> Decimal {
    Decimal::new(1, 1) // 0.1 base
}
fn default_stale_price_ms() -> u64 {
    5_000
}
fn default_ack_timeout_ms() -> u64 {
    10_000
}
fn default_request_timeout_ms() -> u64 {
    3_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    200
}
fn default_retry_max_delay_ms() -> u64 {
    2_000
}
fn default_age_check_interval_ms() -> u64 {
    1_000
}
fn default_shutdown_grace_ms() -> u64 {
    5_000
}
fn default_strategy_tag() -> String {
    "hlmm".to_string()
}
