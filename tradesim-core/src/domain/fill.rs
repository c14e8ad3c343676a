//! Execution — a realized fill of (part of) an order.

use super::ids::{ExecutionId, OrderId};
use super::order::{Order, OrderError, OrderSide};
use crate::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    id: ExecutionId,
    order_id: OrderId,
    symbol: String,
    side: OrderSide,
    quantity: Decimal,
    price: Decimal,
    timestamp: DateTime<Utc>,
    commission: Option<Money>,
}

impl Execution {
    /// Build an execution against `order`. The quantity must be positive and
    /// fit in the order's unfilled quantity at this moment.
    pub fn new(
        order: &Order,
        quantity: Decimal,
        price: Decimal,
        timestamp: DateTime<Utc>,
        commission: Option<Money>,
    ) -> Result<Self, OrderError> {
        if quantity <= Decimal::ZERO {
            return Err(OrderError::NonPositiveQuantity(quantity));
        }
        let unfilled = order.unfilled_quantity();
        if quantity > unfilled {
            return Err(OrderError::Overfill { order_id: order.id(), quantity, unfilled });
        }
        if let Some(fee) = &commission {
            if fee.is_negative() {
                return Err(OrderError::NegativeCommission(fee.amount()));
            }
        }
        Ok(Self {
            id: ExecutionId::new(),
            order_id: order.id(),
            symbol: order.symbol().to_string(),
            side: order.side(),
            quantity,
            price,
            timestamp,
            commission,
        })
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn commission(&self) -> Option<&Money> {
        self.commission.as_ref()
    }
}
