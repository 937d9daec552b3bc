//! Risk governor.
//!
//! Applies inventory and leverage bounds to the quotes of one refresh
//! cycle. A side may be shrunk or vetoed; the position is never touched.

use hlmm_core::{AccountState, MarketSpec, Position, Price, Quote, Side, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::MakerConfig;
use crate::quote_engine::QuotePair;

/// Why a side was not quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VetoReason {
    /// Inventory headroom below the venue minimum size.
    InventoryLimit,
    /// Projected leverage after a full fill above the configured bound.
    LeverageLimit,
    /// No equity to margin the order.
    NoEquity,
}

impl VetoReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InventoryLimit => "inventory_limit",
            Self::LeverageLimit => "leverage_limit",
            Self::NoEquity => "no_equity",
        }
    }
}

impl fmt::Display for VetoReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteVeto {
    pub side: Side,
    pub reason: VetoReason,
    pub generation: u64,
    pub detail: String,
}

/// Quotes that survived risk checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RiskVerdict {
    pub bid: Option<Quote>,
    pub ask: Option<Quote>,
    pub vetoes: Vec<QuoteVeto>,
}

impl RiskVerdict {
    pub fn get(&self, side: Side) -> Option<&Quote> {
        match side {
            Side::Bid => self.bid.as_ref(),
            Side::Ask => self.ask.as_ref(),
        }
    }

    fn set(&mut self, side: Side, quote: Option<Quote>) {
        match side {
            Side::Bid => self.bid = quote,
            Side::Ask => self.ask = quote,
        }
    }
}

/// Deterministic inventory and leverage checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskGovernor;

impl RiskGovernor {
    pub fn evaluate(
        &self,
        position: &Position,
        account: &AccountState,
        reference: Price,
        quotes: &QuotePair,
        config: &MakerConfig,
        spec: &MarketSpec,
    ) -> RiskVerdict {
        let mut verdict = RiskVerdict::default();
        let generation = quotes.bid.generation;

        if account.equity <= Decimal::ZERO {
            for side in Side::BOTH {
                verdict.vetoes.push(QuoteVeto {
                    side,
                    reason: VetoReason::NoEquity,
                    generation,
                    detail: format!("equity {}", account.equity),
                });
            }
            return verdict;
        }

        let skew = position.base_amount - config.inventory_target_base;

        for side in Side::BOTH {
            let proposed = quotes.get(side);
            let sign = Decimal::from(side.sign());

            // (a) inventory: the side may move skew toward its own direction
            // only up to max_inventory_base.
            let headroom = config.max_inventory_base - sign * skew;
            let size = if proposed.size.inner() > headroom {
                let shrunk = spec.round_size(Size::new(headroom.max(Decimal::ZERO)));
                if !spec.meets_min_size(shrunk) {
                    verdict.vetoes.push(QuoteVeto {
                        side,
                        reason: VetoReason::InventoryLimit,
                        generation,
                        detail: format!("skew {skew}, headroom {headroom}"),
                    });
                    continue;
                }
                debug!(
                    %side,
                    from = %proposed.size,
                    to = %shrunk,
                    %skew,
                    "Quote size shrunk by inventory limit"
                );
                shrunk
            } else {
                proposed.size
            };

            // (b) leverage after a full fill at the quote price. A side that
            // shrinks exposure is never vetoed, so an over-levered book can
            // quote its way back inside the bound.
            let projected_base = position.base_amount + sign * size.inner();
            let projected_leverage =
                projected_base.abs() * proposed.price.inner() / account.equity;
            let adds_exposure = projected_base.abs() > position.base_amount.abs();
            if adds_exposure && projected_leverage > config.leverage_decimal() {
                verdict.vetoes.push(QuoteVeto {
                    side,
                    reason: VetoReason::LeverageLimit,
                    generation,
                    detail: format!(
                        "projected leverage {} > {} (reference {reference})",
                        projected_leverage.round_dp(4),
                        config.leverage
                    ),
                });
                continue;
            }

            verdict.set(
                side,
                Some(Quote {
                    size,
                    ..proposed.clone()
                }),
            );
        }

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote_engine::compute_quotes;
    use rust_decimal_macros::dec;

    fn spec() -> MarketSpec {
        MarketSpec {
            pair: "BTC-USD".parse().unwrap(),
            tick_size: Price::new(dec!(1)),
            lot_size: Size::new(dec!(0.001)),
            min_size: Size::new(dec!(0.001)),
            max_leverage: 40,
        }
    }

    fn config() -> MakerConfig {
        MakerConfig {
            order_amount: dec!(0.01),
            bid_spread: dec!(0.003),
            ask_spread: dec!(0.003),
            leverage: 2,
            max_inventory_base: dec!(0.05),
            ..Default::default()
        }
    }

    fn account(equity: Decimal) -> AccountState {
        AccountState {
            equity,
            ..Default::default()
        }
    }

    fn evaluate(base: Decimal, equity: Decimal, config: &MakerConfig) -> RiskVerdict {
        let reference = Price::new(dec!(50000));
        let quotes = compute_quotes(reference, config, &spec(), 1).unwrap();
        RiskGovernor.evaluate(
            &Position::new(base, dec!(2)),
            &account(equity),
            reference,
            &quotes,
            config,
            &spec(),
        )
    }

    #[test]
    fn test_pass_through() {
        let verdict = evaluate(dec!(0), dec!(10000), &config());
        assert!(verdict.vetoes.is_empty());
        assert_eq!(verdict.bid.as_ref().unwrap().size.inner(), dec!(0.01));
        assert_eq!(verdict.ask.as_ref().unwrap().size.inner(), dec!(0.01));
        assert_eq!(verdict.bid.unwrap().price.inner(), dec!(49850));
    }

    #[test]
    fn test_inventory_shrinks_increasing_side() {
        // Long 0.045, headroom on bid 0.005.
        let verdict = evaluate(dec!(0.045), dec!(100000), &config());
        assert_eq!(verdict.bid.unwrap().size.inner(), dec!(0.005));
        assert_eq!(verdict.ask.unwrap().size.inner(), dec!(0.01));
        assert!(verdict.vetoes.is_empty());
    }

    #[test]
    fn test_inventory_vetoes_when_no_headroom() {
        let verdict = evaluate(dec!(-0.05), dec!(100000), &config());
        assert!(verdict.ask.is_none());
        assert!(verdict.bid.is_some());
        assert_eq!(verdict.vetoes.len(), 1);
        assert_eq!(verdict.vetoes[0].side, Side::Ask);
        assert_eq!(verdict.vetoes[0].reason, VetoReason::InventoryLimit);
    }

    #[test]
    fn test_inventory_target_shifts_neutral() {
        let mut cfg = config();
        cfg.inventory_target_base = dec!(0.05);
        // At target: full size both sides.
        let verdict = evaluate(dec!(0.05), dec!(100000), &cfg);
        assert_eq!(verdict.bid.unwrap().size.inner(), dec!(0.01));
        assert_eq!(verdict.ask.unwrap().size.inner(), dec!(0.01));
    }

    #[test]
    fn test_leverage_vetoes_ask_only() {
        // Short 0.02 with equity 1000 at 2x: ask fill -> 0.03 * 50150 / 1000 = 1.5045
        // under bound; with equity 700 -> 2.149 > 2. Bid fill -> 0.01 * 49850 / 700 = 0.71.
        let mut cfg = config();
        cfg.max_inventory_base = dec!(1);
        let verdict = evaluate(dec!(-0.02), dec!(700), &cfg);
        assert!(verdict.bid.is_some());
        assert!(verdict.ask.is_none());
        assert_eq!(verdict.vetoes.len(), 1);
        assert_eq!(verdict.vetoes[0].reason, VetoReason::LeverageLimit);
    }

    #[test]
    fn test_over_levered_book_keeps_reducing_side() {
        // Short 0.1 at equity 1000 is 5x against a 2x bound. The bid cuts
        // exposure and stays; the ask would add to it.
        let mut cfg = config();
        cfg.max_inventory_base = dec!(1);
        let verdict = evaluate(dec!(-0.1), dec!(1000), &cfg);
        assert_eq!(verdict.bid.unwrap().size.inner(), dec!(0.01));
        assert!(verdict.ask.is_none());
        assert_eq!(verdict.vetoes.len(), 1);
        assert_eq!(verdict.vetoes[0].side, Side::Ask);
        assert_eq!(verdict.vetoes[0].reason, VetoReason::LeverageLimit);
    }

    #[test]
    fn test_no_equity_vetoes_both() {
        let verdict = evaluate(dec!(0), dec!(0), &config());
        assert!(verdict.bid.is_none());
        assert!(verdict.ask.is_none());
        assert_eq!(verdict.vetoes.len(), 2);
        assert!(verdict
            .vetoes
            .iter()
            .all(|v| v.reason == VetoReason::NoEquity));
    }
}
