//! Brokers: the seam between strategies and order execution.
//!
//! `Broker` is what a strategy trades through. `SimBroker` implements it by
//! matching against books synthesized from the price samples it is fed; a
//! live adapter would implement the same trait against a venue.

pub mod order_registry;
pub mod sim_broker;

use crate::domain::{
    AccountError, AccountInfo, Event, Execution, Instrument, InstrumentError, Order, OrderAction, OrderAmendment,
    OrderError, OrderId, OrderState, Position,
};
use crate::execution::{MarginError, MatchingError};
use crate::market::BookError;
use crate::money::MoneyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use order_registry::{OrderAuditEntry, OrderRegistry, RegistryError};
pub use sim_broker::SimBroker;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    #[error("broker {0} is not connected")]
    NotConnected(String),

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error(transparent)]
    Book(#[from] BookError),

    #[error(transparent)]
    Matching(#[from] MatchingError),

    #[error(transparent)]
    Margin(#[from] MarginError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Published whenever an order's state actually changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub symbol: String,
    pub action: OrderAction,
    pub from: OrderState,
    pub to: OrderState,
    pub timestamp: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// Hooks a broker calls as executions happen and orders move.
pub struct BrokerCallbacks {
    pub on_execution: Box<dyn FnMut(&Execution)>,
    pub on_order_updated: Box<dyn FnMut(&OrderUpdate)>,
}

impl BrokerCallbacks {
    pub fn new(
        on_execution: impl FnMut(&Execution) + 'static,
        on_order_updated: impl FnMut(&OrderUpdate) + 'static,
    ) -> Self {
        Self { on_execution: Box::new(on_execution), on_order_updated: Box::new(on_order_updated) }
    }
}

pub trait Broker {
    fn name(&self) -> &str;

    fn connect(&mut self) -> Result<(), BrokerError>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn set_callbacks(&mut self, callbacks: BrokerCallbacks);

    /// Advance the broker's clock; used to stamp order transitions.
    fn set_current_time(&mut self, now: DateTime<Utc>);

    fn register_instrument(&mut self, instrument: Instrument) -> Result<(), BrokerError>;

    fn instrument(&self, symbol: &str) -> Option<&Instrument>;

    fn submit_order(&mut self, order: Order) -> Result<OrderId, BrokerError>;

    fn cancel_order(&mut self, order_id: OrderId) -> Result<(), BrokerError>;

    fn modify_order(&mut self, order_id: OrderId, amendment: OrderAmendment) -> Result<(), BrokerError>;

    fn get_order(&self, order_id: OrderId) -> Option<&Order>;

    fn list_active_orders(&self) -> Vec<&Order>;

    fn list_open_positions(&self) -> Vec<&Position>;

    fn get_position(&self, symbol: &str) -> Option<&Position>;

    fn get_account_info(&self) -> AccountInfo;

    fn executions(&self) -> &[Execution];

    /// Feed a market event. Events without a price are ignored.
    fn process_price_sample(&mut self, event: &Event) -> Result<(), BrokerError>;
}
