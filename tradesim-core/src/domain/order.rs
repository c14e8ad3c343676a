//! Orders, their kinds and the order life-cycle state machine.

use super::fill::Execution;
use super::ids::OrderId;
use crate::state_machine::{StateMachine, TransitionError, TransitionTable};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn is_buy(self) -> bool {
        matches!(self, OrderSide::Buy)
    }

    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// What kind of order and its price parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderKind {
    /// Fill at whatever the book offers.
    Market,
    /// Fill at limit price or better.
    Limit { limit_price: Decimal },
    /// Triggers when price reaches the stop level, then fills as market.
    Stop { stop_price: Decimal },
    /// Triggers at stop_price, then becomes a limit order at limit_price.
    StopLimit { stop_price: Decimal, limit_price: Decimal },
}

impl OrderKind {
    pub fn limit_price(&self) -> Option<Decimal> {
        match *self {
            OrderKind::Limit { limit_price } | OrderKind::StopLimit { limit_price, .. } => Some(limit_price),
            OrderKind::Market | OrderKind::Stop { .. } => None,
        }
    }

    pub fn stop_price(&self) -> Option<Decimal> {
        match *self {
            OrderKind::Stop { stop_price } | OrderKind::StopLimit { stop_price, .. } => Some(stop_price),
            OrderKind::Market | OrderKind::Limit { .. } => None,
        }
    }

    /// Stop and stop-limit orders wait for a trigger before working.
    pub fn needs_trigger(&self) -> bool {
        matches!(self, OrderKind::Stop { .. } | OrderKind::StopLimit { .. })
    }

    fn validate(&self) -> Result<(), OrderError> {
        if let Some(limit_price) = self.limit_price() {
            if limit_price <= Decimal::ZERO {
                return Err(OrderError::NonPositivePrice { field: "limit_price", value: limit_price });
            }
        }
        if let Some(stop_price) = self.stop_price() {
            if stop_price <= Decimal::ZERO {
                return Err(OrderError::NonPositivePrice { field: "stop_price", value: stop_price });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    #[default]
    GoodTillCancelled,
    ImmediateOrCancel,
    GoodTillDate(DateTime<Utc>),
}

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Initialized,
    PendingSubmit,
    Submitted,
    TriggerPending,
    Triggered,
    Working,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Submit,
    Acknowledge,
    Activate,
    Arm,
    Trigger,
    PartialFill,
    Fill,
    Cancel,
    Reject,
    Expire,
}

/// The shared order transition table.
pub fn order_transitions() -> &'static TransitionTable<OrderState, OrderAction> {
    use OrderAction as A;
    use OrderState as S;

    static TABLE: OnceLock<TransitionTable<OrderState, OrderAction>> = OnceLock::new();
    TABLE.get_or_init(|| {
        TransitionTable::new()
            .with(S::Initialized, A::Submit, S::PendingSubmit)
            .with(S::PendingSubmit, A::Acknowledge, S::Submitted)
            .with_many(&[S::Submitted, S::Triggered], A::Activate, S::Working)
            .with(S::Submitted, A::Arm, S::TriggerPending)
            .with(S::TriggerPending, A::Trigger, S::Triggered)
            .with_many(&[S::Working, S::PartiallyFilled], A::PartialFill, S::PartiallyFilled)
            .with_many(&[S::Working, S::PartiallyFilled], A::Fill, S::Filled)
            .with_many(
                &[
                    S::PendingSubmit,
                    S::Submitted,
                    S::TriggerPending,
                    S::Triggered,
                    S::Working,
                    S::PartiallyFilled,
                ],
                A::Cancel,
                S::Cancelled,
            )
            .with_many(&[S::Initialized, S::PendingSubmit, S::Submitted], A::Reject, S::Rejected)
            .with_many(
                &[S::TriggerPending, S::Triggered, S::Working, S::PartiallyFilled],
                A::Expire,
                S::Expired,
            )
    })
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("order symbol must not be empty")]
    EmptySymbol,

    #[error("order quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("{field} must be positive, got {value}")]
    NonPositivePrice { field: &'static str, value: Decimal },

    #[error(transparent)]
    Transition(#[from] TransitionError<OrderState, OrderAction>),

    #[error("execution {field} does not match order {order_id}")]
    ExecutionMismatch { order_id: OrderId, field: &'static str },

    #[error("execution quantity {quantity} exceeds unfilled quantity {unfilled} of order {order_id}")]
    Overfill { order_id: OrderId, quantity: Decimal, unfilled: Decimal },

    #[error("commission must be non-negative, got {0}")]
    NegativeCommission(Decimal),

    #[error("order {order_id} cannot be amended: {reason}")]
    InvalidAmendment { order_id: OrderId, reason: String },
}

/// Requested changes to an open order. `None` leaves a field unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAmendment {
    pub quantity: Option<Decimal>,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
}

/// A single order.
///
/// State moves only through `change_state` and fills only through
/// `add_execution`; everything else is derived.
#[derive(Debug, Clone)]
pub struct Order {
    id: OrderId,
    symbol: String,
    side: OrderSide,
    quantity: Decimal,
    kind: OrderKind,
    time_in_force: TimeInForce,
    machine: StateMachine<OrderState, OrderAction>,
    executions: Vec<Execution>,
}

impl Order {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        kind: OrderKind,
    ) -> Result<Self, OrderError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(OrderError::EmptySymbol);
        }
        if quantity <= Decimal::ZERO {
            return Err(OrderError::NonPositiveQuantity(quantity));
        }
        kind.validate()?;
        Ok(Self {
            id: OrderId::new(),
            symbol,
            side,
            quantity,
            kind,
            time_in_force: TimeInForce::default(),
            machine: StateMachine::new(OrderState::Initialized, order_transitions()),
            executions: Vec::new(),
        })
    }

    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Result<Self, OrderError> {
        Self::new(symbol, side, quantity, OrderKind::Market)
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Result<Self, OrderError> {
        Self::new(symbol, side, quantity, OrderKind::Limit { limit_price })
    }

    pub fn stop(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Result<Self, OrderError> {
        Self::new(symbol, side, quantity, OrderKind::Stop { stop_price })
    }

    pub fn stop_limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    ) -> Result<Self, OrderError> {
        Self::new(symbol, side, quantity, OrderKind::StopLimit { stop_price, limit_price })
    }

    /// Use a caller-supplied id instead of a generated one.
    pub fn with_id(mut self, id: OrderId) -> Self {
        self.id = id;
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    pub fn id(&self) -> OrderId {
        self.id
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

    pub fn kind(&self) -> &OrderKind {
        &self.kind
    }

    pub fn time_in_force(&self) -> TimeInForce {
        self.time_in_force
    }

    pub fn state(&self) -> OrderState {
        self.machine.state()
    }

    pub fn executions(&self) -> &[Execution] {
        &self.executions
    }

    pub fn filled_quantity(&self) -> Decimal {
        self.executions.iter().map(Execution::quantity).sum()
    }

    pub fn unfilled_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity()
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity() >= self.quantity
    }

    /// Volume-weighted average fill price, unrounded.
    pub fn average_fill_price(&self) -> Option<Decimal> {
        let filled = self.filled_quantity();
        if filled.is_zero() {
            return None;
        }
        let notional: Decimal = self.executions.iter().map(|e| e.quantity() * e.price()).sum();
        Some(notional / filled)
    }

    pub fn is_terminal(&self) -> bool {
        self.machine.is_in_terminal_state()
    }

    /// Accepted by a broker and not yet finished.
    pub fn is_open(&self) -> bool {
        !self.is_terminal() && self.state() != OrderState::Initialized
    }

    /// Apply a life-cycle action, returning the state that was left.
    pub fn change_state(&mut self, action: OrderAction) -> Result<OrderState, OrderError> {
        Ok(self.machine.execute_action(action)?)
    }

    /// Append a realized fill. Side, symbol and parent id must match and the
    /// quantity must fit in what is still unfilled.
    pub fn add_execution(&mut self, execution: Execution) -> Result<(), OrderError> {
        if execution.order_id() != self.id {
            return Err(OrderError::ExecutionMismatch { order_id: self.id, field: "order_id" });
        }
        if execution.symbol() != self.symbol {
            return Err(OrderError::ExecutionMismatch { order_id: self.id, field: "symbol" });
        }
        if execution.side() != self.side {
            return Err(OrderError::ExecutionMismatch { order_id: self.id, field: "side" });
        }
        let unfilled = self.unfilled_quantity();
        if execution.quantity() > unfilled {
            return Err(OrderError::Overfill {
                order_id: self.id,
                quantity: execution.quantity(),
                unfilled,
            });
        }
        self.executions.push(execution);
        Ok(())
    }

    pub(crate) fn amend(&mut self, amendment: &OrderAmendment) -> Result<(), OrderError> {
        let reject = |reason: &str| OrderError::InvalidAmendment { order_id: self.id, reason: reason.to_string() };

        if !self.is_open() {
            return Err(reject("order is not open"));
        }
        let mut kind = self.kind;
        if let Some(limit) = amendment.limit_price {
            match &mut kind {
                OrderKind::Limit { limit_price } | OrderKind::StopLimit { limit_price, .. } => *limit_price = limit,
                OrderKind::Market | OrderKind::Stop { .. } => return Err(reject("order has no limit price")),
            }
        }
        if let Some(stop) = amendment.stop_price {
            if self.state() != OrderState::TriggerPending {
                return Err(reject("stop price can only change before the trigger"));
            }
            match &mut kind {
                OrderKind::Stop { stop_price } | OrderKind::StopLimit { stop_price, .. } => *stop_price = stop,
                OrderKind::Market | OrderKind::Limit { .. } => return Err(reject("order has no stop price")),
            }
        }
        kind.validate()?;

        let quantity = amendment.quantity.unwrap_or(self.quantity);
        if quantity <= self.filled_quantity() {
            return Err(reject("quantity must exceed the filled quantity"));
        }

        self.kind = kind;
        self.quantity = quantity;
        Ok(())
    }
}
