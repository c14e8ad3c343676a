//! Strategy trait and the context it trades through.

use super::EngineError;
use crate::broker::{Broker, OrderUpdate};
use crate::domain::{Event, Execution, Order, OrderAmendment, OrderId};
use crate::feed::EventFeed;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Event-driven trading logic.
///
/// Callbacks run on the engine's thread, one at a time. Returning an error
/// aborts the run.
pub trait Strategy {
    fn name(&self) -> &str;

    fn on_start(&mut self, _ctx: &mut StrategyContext<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    /// An event from the strategy's feed named `feed`.
    fn on_event(&mut self, ctx: &mut StrategyContext<'_>, feed: &str, event: &Event) -> Result<(), EngineError>;

    fn on_execution(&mut self, _ctx: &mut StrategyContext<'_>, _execution: &Execution) -> Result<(), EngineError> {
        Ok(())
    }

    fn on_order_updated(&mut self, _ctx: &mut StrategyContext<'_>, _update: &OrderUpdate) -> Result<(), EngineError> {
        Ok(())
    }

    fn on_stop(&mut self, _ctx: &mut StrategyContext<'_>) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Cross-thread stop flag for live runs.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Feed changes a strategy asked for; applied once its callback returns.
pub(crate) enum FeedRequest {
    Add { name: String, feed: Box<dyn EventFeed> },
    Remove(String),
}

/// A strategy's view of the engine during one callback.
pub struct StrategyContext<'a> {
    strategy: usize,
    now: Option<DateTime<Utc>>,
    brokers: &'a mut Vec<(String, Box<dyn Broker>)>,
    owners: &'a mut HashMap<OrderId, usize>,
    feed_requests: &'a mut Vec<FeedRequest>,
    stop: &'a StopHandle,
}

impl<'a> StrategyContext<'a> {
    pub(crate) fn new(
        strategy: usize,
        now: Option<DateTime<Utc>>,
        brokers: &'a mut Vec<(String, Box<dyn Broker>)>,
        owners: &'a mut HashMap<OrderId, usize>,
        feed_requests: &'a mut Vec<FeedRequest>,
        stop: &'a StopHandle,
    ) -> Self {
        Self { strategy, now, brokers, owners, feed_requests, stop }
    }

    /// The delivery cursor; `None` before the first event.
    pub fn now(&self) -> Option<DateTime<Utc>> {
        self.now
    }

    pub fn broker(&self, name: &str) -> Result<&dyn Broker, EngineError> {
        self.brokers
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, broker)| broker.as_ref())
            .ok_or_else(|| EngineError::UnknownBroker(name.to_string()))
    }

    fn broker_mut(&mut self, name: &str) -> Result<&mut Box<dyn Broker>, EngineError> {
        self.brokers
            .iter_mut()
            .find(|(existing, _)| existing == name)
            .map(|(_, broker)| broker)
            .ok_or_else(|| EngineError::UnknownBroker(name.to_string()))
    }

    fn check_owner(&self, order_id: OrderId) -> Result<(), EngineError> {
        match self.owners.get(&order_id) {
            Some(&owner) if owner == self.strategy => Ok(()),
            _ => Err(EngineError::ForeignOrder(order_id)),
        }
    }

    /// Submit through `broker`. Notifications for the order come back to this
    /// strategy, including a rejection.
    pub fn submit_order(&mut self, broker: &str, order: Order) -> Result<OrderId, EngineError> {
        let id = order.id();
        if self.owners.get(&id).is_some_and(|&owner| owner != self.strategy) {
            return Err(EngineError::ForeignOrder(id));
        }
        if !self.brokers.iter().any(|(name, _)| name == broker) {
            return Err(EngineError::UnknownBroker(broker.to_string()));
        }
        self.owners.entry(id).or_insert(self.strategy);
        Ok(self.broker_mut(broker)?.submit_order(order)?)
    }

    pub fn cancel_order(&mut self, broker: &str, order_id: OrderId) -> Result<(), EngineError> {
        self.check_owner(order_id)?;
        Ok(self.broker_mut(broker)?.cancel_order(order_id)?)
    }

    pub fn modify_order(
        &mut self,
        broker: &str,
        order_id: OrderId,
        amendment: OrderAmendment,
    ) -> Result<(), EngineError> {
        self.check_owner(order_id)?;
        Ok(self.broker_mut(broker)?.modify_order(order_id, amendment)?)
    }

    /// Open orders this strategy placed with `broker`, in submission order.
    pub fn get_active_orders(&self, broker: &str) -> Result<Vec<&Order>, EngineError> {
        let owners = &*self.owners;
        let strategy = self.strategy;
        let orders = self.broker(broker)?.list_active_orders();
        Ok(orders.into_iter().filter(|order| owners.get(&order.id()) == Some(&strategy)).collect())
    }

    /// Registered once the current callback returns.
    pub fn add_event_feed(&mut self, name: impl Into<String>, feed: Box<dyn EventFeed>) {
        self.feed_requests.push(FeedRequest::Add { name: name.into(), feed });
    }

    pub fn remove_event_feed(&mut self, name: impl Into<String>) {
        self.feed_requests.push(FeedRequest::Remove(name.into()));
    }

    /// End the run after the current batch.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }
}
