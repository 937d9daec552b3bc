//! Quote-side, price-type and client order ID types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Quote side: bid (buy) or ask (sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Bid, Side::Ask];

    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }

    /// Returns 1 for bid, -1 for ask (for position calculations).
    pub fn sign(&self) -> i8 {
        match self {
            Self::Bid => 1,
            Self::Ask => -1,
        }
    }

    /// Venue-facing label.
    pub fn as_trade_type(&self) -> &'static str {
        match self {
            Self::Bid => "BUY",
            Self::Ask => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// Which book price the quotes are anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PriceType {
    /// (best bid + best ask) / 2.
    #[default]
    #[serde(rename = "mid")]
    Mid,
    /// Last traded price.
    #[serde(rename = "last")]
    LastTrade,
    /// Best bid.
    #[serde(rename = "best_bid")]
    BestBid,
    /// Best ask.
    #[serde(rename = "best_ask")]
    BestAsk,
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mid => write!(f, "mid"),
            Self::LastTrade => write!(f, "last"),
            Self::BestBid => write!(f, "best_bid"),
            Self::BestAsk => write!(f, "best_ask"),
        }
    }
}

/// Client order ID.
///
/// Carries the strategy tag as a prefix so that reconciliation can tell
/// this strategy's venue orders apart from anything else on the account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `{tag}_{timestamp_ms}_{uuid_short}`
    pub fn new(tag: &str) -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        Self(format!("{tag}_{ts}_{uuid_short}"))
    }

    /// Create from an existing string (for parsing venue responses).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this ID was generated with `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.0
            .strip_prefix(tag)
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl From<&str> for ClientOrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ClientOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
    }

    #[test]
    fn test_side_sign() {
        assert_eq!(Side::Bid.sign(), 1);
        assert_eq!(Side::Ask.sign(), -1);
    }

    #[test]
    fn test_client_order_id_unique() {
        let id1 = ClientOrderId::new("hlmm");
        let id2 = ClientOrderId::new("hlmm");
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_client_order_id_tag() {
        let id = ClientOrderId::new("hlmm");
        assert!(id.as_str().starts_with("hlmm_"));
        assert!(id.has_tag("hlmm"));
        assert!(!id.has_tag("hl"));
        assert!(!ClientOrderId::from("manual_123").has_tag("hlmm"));
    }

    #[test]
    fn test_price_type_serde_names() {
        let parsed: PriceType = serde_json::from_str("\"last\"").unwrap();
        assert_eq!(parsed, PriceType::LastTrade);
        let parsed: PriceType = serde_json::from_str("\"best_ask\"").unwrap();
        assert_eq!(parsed, PriceType::BestAsk);
        assert_eq!(PriceType::default(), PriceType::Mid);
    }
}
