//! Domain types: instruments, bars, events, orders, executions, positions, accounts.

pub mod account;
pub mod bar;
pub mod event;
pub mod fill;
pub mod ids;
pub mod instrument;
pub mod order;
pub mod position;

pub use account::{Account, AccountError, AccountInfo, FeeRecord, MarginEntry};
pub use bar::{Bar, BarError, BarPeriod, BarType, BarUnit, Ohlcv, PriceType};
pub use event::{BarEvent, Event, EventKind, PriceSample, QuoteTick, TradeTick};
pub use fill::Execution;
pub use ids::{ExecutionId, OrderId};
pub use instrument::{AssetClass, Instrument, InstrumentError, TickPolicy};
pub use order::{
    order_transitions, Order, OrderAction, OrderAmendment, OrderError, OrderKind, OrderSide, OrderState,
    TimeInForce,
};
pub use position::Position;

/// Symbol type alias
pub type Symbol = String;
