//! Quote price calculation.
//!
//! Computes bid/ask from a reference price and the configured fractional
//! spreads, then snaps both to the venue grid. The bid is rounded down and
//! the ask up so rounding never tightens the quote.

use hlmm_core::{MarketSpec, Price, Quote, Side, Size};
use rust_decimal::Decimal;

use crate::config::MakerConfig;
use crate::error::{MakerError, MakerResult};

/// Computed quotes for both sides of one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotePair {
    pub bid: Quote,
    pub ask: Quote,
}

impl QuotePair {
    pub fn get(&self, side: Side) -> &Quote {
        match side {
            Side::Bid => &self.bid,
            Side::Ask => &self.ask,
        }
    }
}

/// Calculate bid and ask for a reference price.
///
/// # Errors
/// `InvalidReferencePrice` when `reference <= 0`, when the bid rounds to
/// zero or below, or when the rounded quotes cross. `ConfigInvalid` when the
/// order amount rounds below the venue minimum.
pub fn compute_quotes(
    reference: Price,
    config: &MakerConfig,
    spec: &MarketSpec,
    generation: u64,
) -> MakerResult<QuotePair> {
    if !reference.is_positive() {
        return Err(MakerError::InvalidReferencePrice(format!(
            "reference price {reference} is not positive"
        )));
    }

    let p = reference.inner();
    let bid_price = spec.round_bid(Price::new(p * (Decimal::ONE - config.bid_spread)));
    let ask_price = spec.round_ask(Price::new(p * (Decimal::ONE + config.ask_spread)));

    if !bid_price.is_positive() {
        return Err(MakerError::InvalidReferencePrice(format!(
            "bid rounds to {bid_price} at reference {reference}"
        )));
    }
    if bid_price >= ask_price {
        return Err(MakerError::InvalidReferencePrice(format!(
            "quotes cross after rounding: bid {bid_price} >= ask {ask_price}"
        )));
    }

    let size = spec.round_size(Size::new(config.order_amount));
    if !spec.meets_min_size(size) {
        return Err(MakerError::ConfigInvalid(format!(
            "order_amount {} rounds to {size}, below venue minimum {}",
            config.order_amount, spec.min_size
        )));
    }

    Ok(QuotePair {
        bid: Quote {
            side: Side::Bid,
            price: bid_price,
            size,
            generation,
        },
        ask: Quote {
            side: Side::Ask,
            price: ask_price,
            size,
            generation,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_spec(tick: Decimal) -> MarketSpec {
        MarketSpec {
            pair: "BTC-USD".parse().unwrap(),
            tick_size: Price::new(tick),
            lot_size: Size::new(dec!(0.0001)),
            min_size: Size::new(dec!(0.0001)),
            max_leverage: 40,
        }
    }

    fn test_config(bid: Decimal, ask: Decimal) -> MakerConfig {
        MakerConfig {
            bid_spread: bid,
            ask_spread: ask,
            order_amount: dec!(0.001),
            ..Default::default()
        }
    }

    #[test]
    fn test_symmetric_quotes() {
        let quotes = compute_quotes(
            Price::new(dec!(50000)),
            &test_config(dec!(0.003), dec!(0.003)),
            &test_spec(dec!(1)),
            1,
        )
        .unwrap();

        assert_eq!(quotes.bid.price.inner(), dec!(49850));
        assert_eq!(quotes.ask.price.inner(), dec!(50150));
        assert_eq!(quotes.bid.size.inner(), dec!(0.001));
        assert_eq!(quotes.ask.size.inner(), dec!(0.001));
        assert_eq!(quotes.bid.generation, 1);
        assert_eq!(quotes.get(Side::Ask).side, Side::Ask);
    }

    #[test]
    fn test_rounding_widens_quotes() {
        // 50001 * 0.999 = 49951.001, 50001 * 1.001 = 50051.001
        let quotes = compute_quotes(
            Price::new(dec!(50001)),
            &test_config(dec!(0.001), dec!(0.001)),
            &test_spec(dec!(1)),
            3,
        )
        .unwrap();
        assert_eq!(quotes.bid.price.inner(), dec!(49951));
        assert_eq!(quotes.ask.price.inner(), dec!(50052));
    }

    #[test]
    fn test_zero_spread_on_grid_is_allowed() {
        let quotes = compute_quotes(
            Price::new(dec!(100)),
            &test_config(dec!(0), dec!(0.01)),
            &test_spec(dec!(0.5)),
            1,
        )
        .unwrap();
        assert_eq!(quotes.bid.price.inner(), dec!(100));
        assert_eq!(quotes.ask.price.inner(), dec!(101));
    }

    #[test]
    fn test_non_positive_reference_rejected() {
        let config = test_config(dec!(0.001), dec!(0.001));
        for p in [dec!(0), dec!(-1)] {
            let err = compute_quotes(Price::new(p), &config, &test_spec(dec!(1)), 1).unwrap_err();
            assert!(matches!(err, MakerError::InvalidReferencePrice(_)));
        }
    }

    #[test]
    fn test_crossed_after_rounding_rejected() {
        // Zero spreads on an on-grid price yield bid == ask.
        let err = compute_quotes(
            Price::new(dec!(100)),
            &test_config(dec!(0), dec!(0)),
            &test_spec(dec!(1)),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, MakerError::InvalidReferencePrice(_)));
    }

    #[test]
    fn test_bid_rounding_to_zero_rejected() {
        let err = compute_quotes(
            Price::new(dec!(0.5)),
            &test_config(dec!(0.1), dec!(0.1)),
            &test_spec(dec!(1)),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, MakerError::InvalidReferencePrice(_)));
    }

    #[test]
    fn test_size_below_minimum_rejected() {
        let mut config = test_config(dec!(0.001), dec!(0.001));
        config.order_amount = dec!(0.00001);
        let err =
            compute_quotes(Price::new(dec!(50000)), &config, &test_spec(dec!(1)), 1).unwrap_err();
        assert!(matches!(err, MakerError::ConfigInvalid(_)));
    }
}
