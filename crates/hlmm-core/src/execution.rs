//! Order lifecycle types.
//!
//! This module provides types for:
//! - Quotes produced by each refresh cycle
//! - Locally tracked orders and their state machine
//! - Requests sent to, and events received from, the venue
//! - Position state mutated by confirmed fills

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{ClientOrderId, Side};
use crate::{Price, Size};

// ============================================================================
// Quotes
// ============================================================================

/// Desired resting order for one side, produced by a refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub side: Side,
    pub price: Price,
    pub size: Size,
    /// Refresh-cycle counter that produced this quote.
    pub generation: u64,
}

// ============================================================================
// Order Tracking Types
// ============================================================================

/// State of an order in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderState {
    /// Submitted, no acknowledgement yet.
    #[default]
    Pending,
    /// Acknowledged and resting.
    Open,
    /// Resting with some size filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancel requested, not yet confirmed.
    Cancelling,
    /// Cancel confirmed (or order gone from the venue).
    Cancelled,
    /// Declined by the venue.
    Rejected,
}

impl OrderState {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Returns true while the order may still rest on the venue.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

/// Order tracked by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Client order ID (always known).
    pub cloid: ClientOrderId,
    /// Venue order ID, absent until acknowledged.
    pub oid: Option<String>,
    pub side: Side,
    pub price: Price,
    /// Original order size.
    pub size: Size,
    /// Amount filled so far.
    pub filled: Size,
    pub state: OrderState,
    /// Creation timestamp (Unix ms).
    pub created_at_ms: u64,
    /// Generation of the quote that spawned this order.
    pub generation: u64,
    /// When the last submit/cancel request for this order was sent (Unix ms).
    pub last_request_ms: u64,
}

impl Order {
    /// Create a Pending order from a submission request.
    #[must_use]
    pub fn from_request(request: &OrderRequest, now_ms: u64) -> Self {
        Self {
            cloid: request.cloid.clone(),
            oid: None,
            side: request.side,
            price: request.price,
            size: request.size,
            filled: Size::ZERO,
            state: OrderState::Pending,
            created_at_ms: now_ms,
            generation: request.generation,
            last_request_ms: now_ms,
        }
    }

    /// Remaining unfilled size.
    #[must_use]
    pub fn remaining(&self) -> Size {
        self.size - self.filled
    }

    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }

    /// Terminal record for history.
    #[must_use]
    pub fn to_record(&self, closed_at_ms: u64, note: impl Into<String>) -> OrderRecord {
        OrderRecord {
            cloid: self.cloid.clone(),
            oid: self.oid.clone(),
            side: self.side,
            price: self.price,
            size: self.size,
            filled: self.filled,
            state: self.state,
            generation: self.generation,
            closed_at_ms,
            note: note.into(),
        }
    }
}

/// An order that has left tracking, kept for the operator snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub cloid: ClientOrderId,
    pub oid: Option<String>,
    pub side: Side,
    pub price: Price,
    pub size: Size,
    pub filled: Size,
    /// Terminal state the order ended in.
    pub state: OrderState,
    pub generation: u64,
    pub closed_at_ms: u64,
    pub note: String,
}

// ============================================================================
// Venue Requests / Reports
// ============================================================================

/// Order submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub cloid: ClientOrderId,
    pub side: Side,
    pub price: Price,
    pub size: Size,
    pub generation: u64,
}

/// Cancel request for an acknowledged order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub cloid: ClientOrderId,
    pub oid: String,
    pub side: Side,
}

/// Open order as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueOrder {
    pub oid: String,
    /// Client order ID, if the venue echoes one.
    pub cloid: Option<ClientOrderId>,
    pub side: Side,
    pub price: Price,
    pub size: Size,
    pub filled: Size,
}

/// Unsolicited account event pushed by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    /// Incremental fill.
    Fill {
        oid: String,
        /// Venue trade ID, used to drop replayed fills.
        trade_id: Option<String>,
        side: Side,
        filled_size: Size,
        filled_price: Price,
    },
    /// Order cancelled (locally requested or out-of-band).
    OrderCancelled { oid: String },
    /// Order rejected after acknowledgement.
    OrderRejected { oid: String, reason: String },
}

impl AccountEvent {
    pub fn oid(&self) -> &str {
        match self {
            Self::Fill { oid, .. } | Self::OrderCancelled { oid } | Self::OrderRejected { oid, .. } => {
                oid
            }
        }
    }
}

// ============================================================================
// Position
// ============================================================================

/// Net position on the market.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Signed base amount (positive = long).
    pub base_amount: Decimal,
    /// Leverage configured on the venue.
    pub leverage: Decimal,
}

impl Position {
    pub fn new(base_amount: Decimal, leverage: Decimal) -> Self {
        Self {
            base_amount,
            leverage,
        }
    }

    /// Apply a confirmed fill.
    pub fn apply_fill(&mut self, side: Side, size: Size) {
        self.base_amount += Decimal::from(side.sign()) * size.inner();
    }

    /// Absolute notional at `price`.
    pub fn notional(&self, price: Price) -> Decimal {
        self.base_amount.abs() * price.inner()
    }

    pub fn is_flat(&self) -> bool {
        self.base_amount.is_zero()
    }

    pub fn direction(&self) -> &'static str {
        if self.base_amount > Decimal::ZERO {
            "LONG"
        } else if self.base_amount < Decimal::ZERO {
            "SHORT"
        } else {
            "FLAT"
        }
    }
}
