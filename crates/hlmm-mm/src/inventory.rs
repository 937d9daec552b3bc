//! Inventory tracking for the quoted market.
//!
//! Owns the engine's `Position` and mutates it only on confirmed fills (or
//! when seeding from venue truth), alongside entry price and PnL.

use hlmm_core::{Position, Price, Side, Size};
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Traded volume on one side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideVolume {
    pub fills: u64,
    pub base: Decimal,
    pub notional: Decimal,
}

/// Position and PnL accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    position: Position,
    /// Average entry price of the open position.
    avg_entry: Decimal,
    realized_pnl: Decimal,
    fill_count: u64,
    bought: SideVolume,
    sold: SideVolume,
}

impl Inventory {
    pub fn new(leverage: Decimal) -> Self {
        Self {
            position: Position::new(Decimal::ZERO, leverage),
            ..Default::default()
        }
    }

    /// Replace the position with what the venue reports.
    ///
    /// Entry price is unknown after seeding, so the reference price is used
    /// until the next fill.
    pub fn seed(&mut self, base_amount: Decimal, leverage: Decimal, mark: Option<Price>) {
        self.position = Position::new(base_amount, leverage);
        self.avg_entry = if base_amount.is_zero() {
            Decimal::ZERO
        } else {
            mark.map(|p| p.inner()).unwrap_or(Decimal::ZERO)
        };
    }

    pub fn set_leverage(&mut self, leverage: Decimal) {
        self.position.leverage = leverage;
    }

    /// Record a confirmed fill.
    pub fn record_fill(&mut self, side: Side, price: Price, size: Size) {
        let fill_size = size.inner();
        let fill_price = price.inner();
        let signed_size = Decimal::from(side.sign()) * fill_size;

        let old_size = self.position.base_amount;
        let new_size = old_size + signed_size;

        // Reducing the position realizes PnL on the reduced amount.
        if (old_size > Decimal::ZERO && signed_size < Decimal::ZERO)
            || (old_size < Decimal::ZERO && signed_size > Decimal::ZERO)
        {
            let reduce_amount = fill_size.min(old_size.abs());
            let pnl = if old_size > Decimal::ZERO {
                (fill_price - self.avg_entry) * reduce_amount
            } else {
                (self.avg_entry - fill_price) * reduce_amount
            };
            self.realized_pnl += pnl;
        }

        if new_size.is_zero() {
            self.avg_entry = Decimal::ZERO;
        } else if !old_size.is_zero() && new_size.signum() != old_size.signum() {
            // Flipped through zero.
            self.avg_entry = fill_price;
        } else if old_size.is_zero() || new_size.signum() == signed_size.signum() {
            let old_notional = old_size.abs() * self.avg_entry;
            let new_notional = fill_size * fill_price;
            self.avg_entry = (old_notional + new_notional) / new_size.abs();
        }

        self.position.apply_fill(side, size);
        self.fill_count += 1;

        let volume = match side {
            Side::Bid => &mut self.bought,
            Side::Ask => &mut self.sold,
        };
        volume.fills += 1;
        volume.base += fill_size;
        volume.notional += fill_size * fill_price;
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn net_size(&self) -> Decimal {
        self.position.base_amount
    }

    /// Signed distance from the neutral inventory.
    pub fn skew(&self, target: Decimal) -> Decimal {
        self.position.base_amount - target
    }

    pub fn avg_entry(&self) -> Decimal {
        self.avg_entry
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn unrealized_pnl(&self, mark: Price) -> Decimal {
        let net = self.position.base_amount;
        if net.is_zero() {
            return Decimal::ZERO;
        }
        (mark.inner() - self.avg_entry) * net
    }

    pub fn fill_count(&self) -> u64 {
        self.fill_count
    }

    pub fn volume(&self, side: Side) -> &SideVolume {
        match side {
            Side::Bid => &self.bought,
            Side::Ask => &self.sold,
        }
    }
}
