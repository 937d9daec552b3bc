//! Market data and account snapshot types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Price, Size};

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Best Bid and Offer (BBO).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbo {
    /// Best bid price.
    pub bid_price: Price,
    /// Best bid size.
    pub bid_size: Size,
    /// Best ask price.
    pub ask_price: Price,
    /// Best ask size.
    pub ask_size: Size,
    /// When this BBO was received (Unix ms).
    pub received_at_ms: u64,
}

impl Bbo {
    pub fn new(
        bid_price: Price,
        bid_size: Size,
        ask_price: Price,
        ask_size: Size,
        received_at_ms: u64,
    ) -> Self {
        Self {
            bid_price,
            bid_size,
            ask_price,
            ask_size,
            received_at_ms,
        }
    }

    /// Both sides present and not crossed.
    pub fn is_valid(&self) -> bool {
        self.bid_price.is_positive()
            && self.ask_price.is_positive()
            && self.bid_price < self.ask_price
    }

    /// (bid + ask) / 2, or None when the book is empty or crossed.
    pub fn mid_price(&self) -> Option<Price> {
        if !self.is_valid() {
            return None;
        }
        Some(Price::new(
            (self.bid_price.inner() + self.ask_price.inner()) / Decimal::TWO,
        ))
    }

    /// Spread in basis points relative to mid.
    pub fn spread_bps(&self) -> Option<Decimal> {
        let mid = self.mid_price()?;
        Some((self.ask_price - self.bid_price).inner() / mid.inner() * Decimal::from(10000))
    }

    /// Age relative to `now_ms`.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.received_at_ms)
    }
}

/// Last public trade on the market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTrade {
    pub price: Price,
    pub size: Size,
    pub received_at_ms: u64,
}

impl LastTrade {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.received_at_ms)
    }
}

/// Account state for one market as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountState {
    /// Account equity in quote currency.
    pub equity: Decimal,
    /// Signed position in base units.
    pub position_base: Decimal,
    /// Leverage currently configured on the venue.
    pub leverage: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bbo(bid: Decimal, ask: Decimal) -> Bbo {
        Bbo::new(
            Price::new(bid),
            Size::new(dec!(1)),
            Price::new(ask),
            Size::new(dec!(1)),
            1_000,
        )
    }

    #[test]
    fn test_mid_price() {
        assert_eq!(
            bbo(dec!(49990), dec!(50010)).mid_price(),
            Some(Price::new(dec!(50000)))
        );
    }

    #[test]
    fn test_crossed_or_empty_book_has_no_mid() {
        assert!(bbo(dec!(50010), dec!(49990)).mid_price().is_none());
        assert!(bbo(dec!(0), dec!(49990)).mid_price().is_none());
    }

    #[test]
    fn test_spread_bps() {
        let b = bbo(dec!(99.5), dec!(100.5));
        assert_eq!(b.spread_bps(), Some(dec!(100)));
    }

    #[test]
    fn test_age_saturates() {
        let b = bbo(dec!(1), dec!(2));
        assert_eq!(b.age_ms(1_500), 500);
        assert_eq!(b.age_ms(500), 0);
    }
}
