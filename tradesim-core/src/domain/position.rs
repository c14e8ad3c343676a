//! Position — net holdings in one instrument.

use super::order::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Net position with VWAP entry price.
///
/// Quantity is signed: positive long, negative short. Realized P&L is in the
/// instrument's quote currency and accumulates across side flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    symbol: String,
    quantity: Decimal,
    average_price: Decimal,
    realized_pnl: Decimal,
    updated_at: DateTime<Utc>,
}

impl Position {
    pub fn flat(symbol: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            updated_at: ts,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn average_price(&self) -> Decimal {
        self.average_price
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    /// Part of a `side`/`quantity` trade that adds exposure (opens or extends
    /// the position, or the portion beyond a flip).
    pub fn increasing_quantity(&self, side: OrderSide, quantity: Decimal) -> Decimal {
        let same_direction = self.is_flat() || (self.is_long() == side.is_buy());
        if same_direction {
            quantity
        } else {
            (quantity - self.quantity.abs()).max(Decimal::ZERO)
        }
    }

    /// Mark-to-market P&L of the open quantity.
    pub fn unrealized_pnl(&self, mark: Decimal, contract_size: Decimal) -> Decimal {
        (mark - self.average_price) * self.quantity * contract_size
    }

    /// Apply a fill and return the P&L it realized.
    pub fn apply_fill(
        &mut self,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        contract_size: Decimal,
        ts: DateTime<Utc>,
    ) -> Decimal {
        let signed = side.sign() * quantity;
        let previous = self.quantity;
        let mut realized = Decimal::ZERO;

        if previous.is_zero() || self.is_long() == side.is_buy() {
            // Opening or averaging in
            let total = previous.abs() + quantity;
            self.average_price = (self.average_price * previous.abs() + price * quantity) / total;
            self.quantity = previous + signed;
        } else {
            // Reducing, closing, or flipping
            let closed = quantity.min(previous.abs());
            let direction = if previous > Decimal::ZERO { Decimal::ONE } else { Decimal::NEGATIVE_ONE };
            realized = (price - self.average_price) * closed * contract_size * direction;
            self.quantity = previous + signed;
            if self.quantity.is_zero() {
                self.average_price = Decimal::ZERO;
            } else if (self.quantity > Decimal::ZERO) != (previous > Decimal::ZERO) {
                self.average_price = price;
            }
        }

        self.realized_pnl += realized;
        self.updated_at = ts;
        realized
    }
}
