//! Order registry — every order a broker ever accepted, in submission order.
//!
//! The registry is the broker's single store of order state. It:
//! - Stores and looks up orders (open and finished)
//! - Applies life-cycle actions through each order's state machine
//! - Records fills against their parent order
//! - Keeps an audit trail of every state transition
//!
//! The registry does NOT decide prices or quantities; the broker's matching
//! pipeline does. The registry tracks order state only.

use super::OrderUpdate;
use crate::domain::{Execution, Order, OrderAction, OrderAmendment, OrderError, OrderId, OrderState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {0} already exists")]
    DuplicateOrder(OrderId),

    #[error("order {0} is not open (state: {1:?})")]
    OrderNotOpen(OrderId, OrderState),

    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Audit trail entry for an order state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAuditEntry {
    pub order_id: OrderId,
    pub timestamp: Option<DateTime<Utc>>,
    pub action: OrderAction,
    pub from_state: OrderState,
    pub to_state: OrderState,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct OrderRegistry {
    orders: HashMap<OrderId, Order>,
    /// Submission order; drives matching priority.
    sequence: Vec<OrderId>,
    audit_trail: Vec<OrderAuditEntry>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Public API ─────────────────────────────────────────────────────

    pub fn insert(&mut self, order: Order) -> Result<(), RegistryError> {
        if self.orders.contains_key(&order.id()) {
            return Err(RegistryError::DuplicateOrder(order.id()));
        }
        self.sequence.push(order.id());
        self.orders.insert(order.id(), order);
        Ok(())
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Apply an action. Returns the update to publish if the state changed.
    pub fn apply(
        &mut self,
        id: OrderId,
        action: OrderAction,
        timestamp: Option<DateTime<Utc>>,
        reason: &str,
    ) -> Result<Option<OrderUpdate>, RegistryError> {
        let order = self.orders.get_mut(&id).ok_or(RegistryError::OrderNotFound(id))?;
        let from = order.change_state(action)?;
        let to = order.state();
        let symbol = order.symbol().to_string();
        self.audit_trail.push(OrderAuditEntry {
            order_id: id,
            timestamp,
            action,
            from_state: from,
            to_state: to,
            reason: reason.to_string(),
        });
        if from == to {
            return Ok(None);
        }
        Ok(Some(OrderUpdate {
            order_id: id,
            symbol,
            action,
            from,
            to,
            timestamp,
            reason: (!reason.is_empty()).then(|| reason.to_string()),
        }))
    }

    /// Attach a fill to its parent order.
    pub fn record_execution(&mut self, execution: Execution) -> Result<(), RegistryError> {
        let id = execution.order_id();
        let order = self.open_order_mut(id)?;
        order.add_execution(execution)?;
        Ok(())
    }

    pub fn amend(&mut self, id: OrderId, amendment: &OrderAmendment) -> Result<(), RegistryError> {
        let order = self.open_order_mut(id)?;
        order.amend(amendment)?;
        Ok(())
    }

    /// All orders in submission order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.sequence.iter().filter_map(|id| self.orders.get(id))
    }

    /// Open orders in submission order.
    pub fn active_orders(&self) -> Vec<&Order> {
        self.orders().filter(|o| o.is_open()).collect()
    }

    /// Ids of open orders for `symbol`, in submission order.
    pub fn open_ids_for_symbol(&self, symbol: &str) -> Vec<OrderId> {
        self.orders()
            .filter(|o| o.is_open() && o.symbol() == symbol)
            .map(Order::id)
            .collect()
    }

    pub fn audit_trail(&self) -> &[OrderAuditEntry] {
        &self.audit_trail
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    // ── Internal helpers ───────────────────────────────────────────────

    fn open_order_mut(&mut self, id: OrderId) -> Result<&mut Order, RegistryError> {
        let order = self.orders.get_mut(&id).ok_or(RegistryError::OrderNotFound(id))?;
        if !order.is_open() {
            return Err(RegistryError::OrderNotOpen(id, order.state()));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderSide;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap())
    }

    fn accepted(registry: &mut OrderRegistry, order: Order) -> OrderId {
        let id = order.id();
        registry.insert(order).unwrap();
        registry.apply(id, OrderAction::Submit, ts(), "").unwrap();
        registry.apply(id, OrderAction::Acknowledge, ts(), "").unwrap();
        registry.apply(id, OrderAction::Activate, ts(), "").unwrap();
        id
    }

    // ── Submit and retrieve ────────────────────────────────────────────

    #[test]
    fn insert_and_get() {
        let mut registry = OrderRegistry::new();
        let order = Order::market("SPY", OrderSide::Buy, dec!(100)).unwrap();
        let id = order.id();
        registry.insert(order.clone()).unwrap();
        assert_eq!(registry.get(id).unwrap().quantity(), dec!(100));
        assert!(matches!(registry.insert(order), Err(RegistryError::DuplicateOrder(_))));
    }

    #[test]
    fn keeps_submission_order() {
        let mut registry = OrderRegistry::new();
        let ids: Vec<OrderId> = (0..5)
            .map(|i| accepted(&mut registry, Order::market("SPY", OrderSide::Buy, dec!(1)).unwrap().with_id(OrderId::from_u128(100 - i))))
            .collect();
        assert_eq!(registry.open_ids_for_symbol("SPY"), ids);
        assert!(registry.open_ids_for_symbol("QQQ").is_empty());
    }

    // ── Transitions and audit ──────────────────────────────────────────

    #[test]
    fn apply_reports_only_real_changes() {
        let mut registry = OrderRegistry::new();
        let id = accepted(&mut registry, Order::market("SPY", OrderSide::Buy, dec!(10)).unwrap());
        let first = registry.apply(id, OrderAction::PartialFill, ts(), "").unwrap();
        assert_eq!(first.map(|u| u.to), Some(OrderState::PartiallyFilled));
        let repeat = registry.apply(id, OrderAction::PartialFill, ts(), "").unwrap();
        assert!(repeat.is_none());
        // Both transitions are audited, including the self-loop.
        assert_eq!(registry.audit_trail().len(), 5);
    }

    #[test]
    fn invalid_action_is_an_error() {
        let mut registry = OrderRegistry::new();
        let id = accepted(&mut registry, Order::market("SPY", OrderSide::Buy, dec!(10)).unwrap());
        registry.apply(id, OrderAction::Cancel, ts(), "user").unwrap();
        let err = registry.apply(id, OrderAction::Fill, ts(), "").unwrap_err();
        assert!(matches!(err, RegistryError::Order(OrderError::Transition(_))));
        assert!(registry.active_orders().is_empty());
    }

    #[test]
    fn executions_only_attach_to_open_orders() {
        let mut registry = OrderRegistry::new();
        let id = accepted(&mut registry, Order::market("SPY", OrderSide::Sell, dec!(2)).unwrap());
        let exec = Execution::new(registry.get(id).unwrap(), dec!(2), dec!(10), ts().unwrap(), None).unwrap();
        registry.record_execution(exec.clone()).unwrap();
        registry.apply(id, OrderAction::Fill, ts(), "").unwrap();
        assert!(matches!(
            registry.record_execution(exec),
            Err(RegistryError::OrderNotOpen(_, OrderState::Filled))
        ));
    }

    #[test]
    fn unknown_order_is_not_found() {
        let mut registry = OrderRegistry::new();
        let err = registry.apply(OrderId::new(), OrderAction::Cancel, ts(), "").unwrap_err();
        assert!(matches!(err, RegistryError::OrderNotFound(_)));
    }
}
