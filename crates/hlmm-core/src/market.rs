//! Market identification and trading rules.

use crate::error::{CoreError, Result};
use crate::{Price, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading pair in `BASE-QUOTE` form (e.g. `BTC-USD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingPair {
    base: String,
    quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('-') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(Self::new(base, quote))
            }
            _ => Err(CoreError::InvalidTradingPair(s.to_string())),
        }
    }
}

impl TryFrom<String> for TradingPair {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TradingPair> for String {
    fn from(pair: TradingPair) -> Self {
        pair.to_string()
    }
}

/// Trading rules for a market, as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSpec {
    /// Market this spec applies to.
    pub pair: TradingPair,

    /// Minimum price increment.
    pub tick_size: Price,

    /// Minimum size increment.
    pub lot_size: Size,

    /// Minimum order size.
    pub min_size: Size,

    /// Maximum leverage the venue allows on this market.
    pub max_leverage: u32,
}

impl MarketSpec {
    /// Round a bid down to the tick grid (never more aggressive than asked).
    pub fn round_bid(&self, price: Price) -> Price {
        price.floor_to_tick(self.tick_size)
    }

    /// Round an ask up to the tick grid (never more aggressive than asked).
    pub fn round_ask(&self, price: Price) -> Price {
        price.ceil_to_tick(self.tick_size)
    }

    /// Round a size down to the lot grid.
    pub fn round_size(&self, size: Size) -> Size {
        size.round_to_lot(self.lot_size)
    }

    /// Whether `size` meets the minimum order size.
    pub fn meets_min_size(&self, size: Size) -> bool {
        size.is_positive() && size >= self.min_size
    }
}
