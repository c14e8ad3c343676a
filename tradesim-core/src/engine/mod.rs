//! Trading engine — chronological event delivery to strategies and brokers.
//!
//! Each strategy owns an `EventFeedManager`. Every loop iteration the engine
//! takes the earliest next event across all strategies, pops every feed
//! positioned at that instant, and dispatches the batch in `(time, sequence)`
//! order:
//!
//! 1. Price samples go to every broker (matching runs before strategies look)
//! 2. The owning strategy's `on_event` runs
//! 3. Queued broker notifications reach the strategy that placed the order
//! 4. Feed additions and removals requested by the strategy are applied

pub mod event_loop;
pub mod strategy;

use crate::broker::BrokerError;
use crate::domain::OrderId;
use crate::feed::FeedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use event_loop::TradingEngine;
pub use strategy::{StopHandle, Strategy, StrategyContext};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("unknown broker: {0}")]
    UnknownBroker(String),

    #[error("broker {0} already registered")]
    DuplicateBroker(String),

    #[error("order {0} belongs to another strategy")]
    ForeignOrder(OrderId),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("strategy error: {0}")]
    Strategy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Run until every feed is exhausted.
    #[default]
    Historical,
    /// Keep polling idle feeds until a stop is requested.
    Live,
}

/// What one `start` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub events_dispatched: u64,
    /// Events older than the delivery cursor, dropped unseen.
    pub stale_events_skipped: u64,
    pub feeds_pruned: usize,
    pub notifications_delivered: u64,
    pub final_cursor: Option<DateTime<Utc>>,
}
