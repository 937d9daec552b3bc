//! Trading statistics for one engine session.
//!
//! Accumulated by the engine from fills and order events, logged
//! periodically and once more on shutdown.

use chrono::{DateTime, Utc};
use hlmm_core::{Price, Side, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Fill statistics for one side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideStats {
    pub fills: u64,
    pub volume_base: Decimal,
    pub volume_quote: Decimal,
}

impl SideStats {
    /// Volume-weighted average fill price.
    pub fn avg_price(&self) -> Option<Decimal> {
        if self.volume_base.is_zero() {
            return None;
        }
        Some(self.volume_quote / self.volume_base)
    }
}

/// Session statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub market: String,
    pub started_at: DateTime<Utc>,
    pub bought: SideStats,
    pub sold: SideStats,
    pub orders_created: u64,
    pub orders_cancelled: u64,
    pub orders_rejected: u64,
    pub errors: u64,
    pub realized_pnl: Decimal,
}

impl SessionStats {
    pub fn new(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            started_at: Utc::now(),
            bought: SideStats::default(),
            sold: SideStats::default(),
            orders_created: 0,
            orders_cancelled: 0,
            orders_rejected: 0,
            errors: 0,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn record_fill(&mut self, side: Side, price: Price, size: Size) {
        let stats = match side {
            Side::Bid => &mut self.bought,
            Side::Ask => &mut self.sold,
        };
        stats.fills += 1;
        stats.volume_base += size.inner();
        stats.volume_quote += size.notional(price);
    }

    pub fn record_order_created(&mut self) {
        self.orders_created += 1;
    }

    pub fn record_cancelled(&mut self) {
        self.orders_cancelled += 1;
    }

    pub fn record_rejected(&mut self) {
        self.orders_rejected += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn set_realized_pnl(&mut self, pnl: Decimal) {
        self.realized_pnl = pnl;
    }

    pub fn total_fills(&self) -> u64 {
        self.bought.fills + self.sold.fills
    }

    /// Net base bought minus sold during the session.
    pub fn net_base(&self) -> Decimal {
        self.bought.volume_base - self.sold.volume_base
    }

    /// Output the statistics to logs.
    pub fn log_summary(&self) {
        let duration = Utc::now() - self.started_at;
        let fmt_avg = |s: &SideStats| {
            s.avg_price()
                .map(|p| p.round_dp(8).to_string())
                .unwrap_or_else(|| "-".to_string())
        };

        info!("========== Session Statistics ==========");
        info!(
            "Period: {} ({} hours {} minutes)",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            duration.num_hours(),
            duration.num_minutes() % 60
        );
        info!(
            market = %self.market,
            fills = self.total_fills(),
            "  Bought: {} fills, {} base, avg {}",
            self.bought.fills,
            self.bought.volume_base,
            fmt_avg(&self.bought)
        );
        info!(
            "  Sold: {} fills, {} base, avg {}",
            self.sold.fills,
            self.sold.volume_base,
            fmt_avg(&self.sold)
        );
        info!(
            "  Orders: {} created, {} cancelled, {} rejected",
            self.orders_created, self.orders_cancelled, self.orders_rejected
        );
        info!(
            "  Realized PnL: {}, errors: {}",
            self.realized_pnl, self.errors
        );
        info!("========================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fill_accounting_per_side() {
        let mut stats = SessionStats::new("BTC-USD");
        stats.record_fill(Side::Bid, Price::new(dec!(100)), Size::new(dec!(1)));
        stats.record_fill(Side::Bid, Price::new(dec!(110)), Size::new(dec!(1)));
        stats.record_fill(Side::Ask, Price::new(dec!(120)), Size::new(dec!(0.5)));

        assert_eq!(stats.total_fills(), 3);
        assert_eq!(stats.bought.avg_price(), Some(dec!(105)));
        assert_eq!(stats.sold.avg_price(), Some(dec!(120)));
        assert_eq!(stats.net_base(), dec!(1.5));
    }

    #[test]
    fn test_empty_side_has_no_average() {
        let stats = SessionStats::new("BTC-USD");
        assert_eq!(stats.bought.avg_price(), None);
        assert_eq!(stats.total_fills(), 0);
    }

    #[test]
    fn test_counters() {
        let mut stats = SessionStats::new("ETH-USD");
        stats.record_order_created();
        stats.record_order_created();
        stats.record_cancelled();
        stats.record_rejected();
        stats.record_error();
        stats.set_realized_pnl(dec!(-3.5));

        assert_eq!(stats.orders_created, 2);
        assert_eq!(stats.orders_cancelled, 1);
        assert_eq!(stats.orders_rejected, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.realized_pnl, dec!(-3.5));
    }
}
