//! Market state cache.
//!
//! Keeps the latest BBO and last trade for the quoted market. Writers
//! (the feed task or the paper venue) overwrite; the engine reads once at
//! the start of each refresh cycle.

use hlmm_core::{Bbo, LastTrade, Price, PriceType};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{FeedError, FeedResult};

/// Source of the price quotes are anchored to.
pub trait ReferencePriceSource: Send + Sync {
    /// Reference price for `price_type`, rejecting data older than
    /// `max_age_ms` relative to `now_ms`.
    fn reference_price(
        &self,
        price_type: PriceType,
        now_ms: u64,
        max_age_ms: u64,
    ) -> FeedResult<Price>;
}

/// Latest market data entry.
#[derive(Debug, Default, Clone)]
pub struct MarketStateEntry {
    /// Best bid/offer.
    pub bbo: Option<Bbo>,
    /// Last public trade.
    pub last_trade: Option<LastTrade>,
    /// Number of BBO updates received.
    pub bbo_updates: u64,
}

/// Shared latest-value market data cache.
#[derive(Debug, Clone, Default)]
pub struct MarketState {
    inner: Arc<RwLock<MarketStateEntry>>,
}

impl MarketState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the BBO.
    pub fn update_bbo(&self, bbo: Bbo) {
        trace!(bid = %bbo.bid_price, ask = %bbo.ask_price, "BBO update");
        let mut entry = self.inner.write();
        entry.bbo = Some(bbo);
        entry.bbo_updates += 1;
    }

    /// Overwrite the last trade.
    pub fn update_trade(&self, trade: LastTrade) {
        trace!(price = %trade.price, size = %trade.size, "Trade update");
        self.inner.write().last_trade = Some(trade);
    }

    pub fn bbo(&self) -> Option<Bbo> {
        self.inner.read().bbo.clone()
    }

    pub fn last_trade(&self) -> Option<LastTrade> {
        self.inner.read().last_trade.clone()
    }

    /// Copy of the whole entry.
    pub fn entry(&self) -> MarketStateEntry {
        self.inner.read().clone()
    }

    fn check_age(price_type: PriceType, age_ms: u64, max_age_ms: u64) -> FeedResult<()> {
        if age_ms > max_age_ms {
            debug!(%price_type, age_ms, max_age_ms, "Reference data stale");
            return Err(FeedError::Stale {
                price_type,
                age_ms,
                max_age_ms,
            });
        }
        Ok(())
    }
}

impl ReferencePriceSource for MarketState {
    fn reference_price(
        &self,
        price_type: PriceType,
        now_ms: u64,
        max_age_ms: u64,
    ) -> FeedResult<Price> {
        let entry = self.inner.read();

        let (price, age_ms) = match price_type {
            PriceType::LastTrade => {
                let trade = entry
                    .last_trade
                    .as_ref()
                    .ok_or(FeedError::Unavailable(price_type))?;
                (trade.price, trade.age_ms(now_ms))
            }
            PriceType::Mid | PriceType::BestBid | PriceType::BestAsk => {
                let bbo = entry
                    .bbo
                    .as_ref()
                    .ok_or(FeedError::Unavailable(price_type))?;
                let price = match price_type {
                    PriceType::Mid => bbo.mid_price(),
                    PriceType::BestBid => Some(bbo.bid_price),
                    _ => Some(bbo.ask_price),
                };
                (
                    price.ok_or(FeedError::Unavailable(price_type))?,
                    bbo.age_ms(now_ms),
                )
            }
        };

        Self::check_age(price_type, age_ms, max_age_ms)?;

        if !price.is_positive() {
            return Err(FeedError::Unavailable(price_type));
        }
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlmm_core::Size;
    use rust_decimal_macros::dec;

    fn test_bbo(at: u64) -> Bbo {
        Bbo::new(
            Price::new(dec!(49990)),
            Size::new(dec!(1)),
            Price::new(dec!(50010)),
            Size::new(dec!(1)),
            at,
        )
    }

    #[test]
    fn test_empty_state_is_unavailable() {
        let state = MarketState::new();
        assert_eq!(
            state.reference_price(PriceType::Mid, 1_000, 5_000),
            Err(FeedError::Unavailable(PriceType::Mid))
        );
        assert_eq!(
            state.reference_price(PriceType::LastTrade, 1_000, 5_000),
            Err(FeedError::Unavailable(PriceType::LastTrade))
        );
    }

    #[test]
    fn test_mid_and_touch_prices() {
        let state = MarketState::new();
        state.update_bbo(test_bbo(1_000));

        assert_eq!(
            state.reference_price(PriceType::Mid, 1_500, 5_000).unwrap(),
            Price::new(dec!(50000))
        );
        assert_eq!(
            state
                .reference_price(PriceType::BestBid, 1_500, 5_000)
                .unwrap(),
            Price::new(dec!(49990))
        );
        assert_eq!(
            state
                .reference_price(PriceType::BestAsk, 1_500, 5_000)
                .unwrap(),
            Price::new(dec!(50010))
        );
        assert_eq!(state.entry().bbo_updates, 1);
    }

    #[test]
    fn test_stale_bbo_rejected() {
        let state = MarketState::new();
        state.update_bbo(test_bbo(1_000));

        let err = state
            .reference_price(PriceType::Mid, 10_000, 5_000)
            .unwrap_err();
        assert!(matches!(err, FeedError::Stale { age_ms: 9_000, .. }));
    }

    #[test]
    fn test_crossed_book_has_no_mid() {
        let state = MarketState::new();
        state.update_bbo(Bbo::new(
            Price::new(dec!(50010)),
            Size::new(dec!(1)),
            Price::new(dec!(49990)),
            Size::new(dec!(1)),
            1_000,
        ));
        assert_eq!(
            state.reference_price(PriceType::Mid, 1_000, 5_000),
            Err(FeedError::Unavailable(PriceType::Mid))
        );
    }

    #[test]
    fn test_last_trade_price() {
        let state = MarketState::new();
        state.update_trade(LastTrade {
            price: Price::new(dec!(50003)),
            size: Size::new(dec!(0.2)),
            received_at_ms: 2_000,
        });
        assert_eq!(
            state
                .reference_price(PriceType::LastTrade, 2_100, 5_000)
                .unwrap(),
            Price::new(dec!(50003))
        );
    }

    #[test]
    fn test_clones_share_state() {
        let writer = MarketState::new();
        let reader = writer.clone();
        writer.update_bbo(test_bbo(1_000));
        assert!(reader.bbo().is_some());
    }
}
