//! Event feeds — chronological sources of market and timer events.
//!
//! Every feed is a one-event-lookahead queue: `peek` shows the next event
//! without consuming it, `pop` consumes it and forwards it to the feed's
//! listeners. Listeners are how feeds chain (a bar aggregator listens to the
//! feed producing its input bars).
//!
//! Feeds:
//! - `InMemoryFeed`: a fixed sequence
//! - `IterFeed`: any iterator of events (see `generator`)
//! - `CsvBarFeed`: bars streamed from CSV
//! - `TimeTickFeed`, `SchedulerFeed`: timer events
//! - `BarAggregatorFeed`: time-bar resampling of another feed

pub mod aggregator;
pub mod csv_bars;
pub mod generator;
pub mod manager;
pub mod source;
pub mod timer;

use crate::domain::{BarError, Event};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

pub use aggregator::{AggregationPolicy, BarAggregatorFeed};
pub use csv_bars::{CsvBarFeed, CsvBarSource};
pub use generator::{random_walk_bars, random_walk_feed, RandomWalkConfig};
pub use manager::EventFeedManager;
pub use source::{EventSource, InMemoryFeed, IterFeed, IterSource, SourceFeed, VecSource};
pub use timer::{SchedulerFeed, TimeTickFeed, TimeTickSource};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("source error: {0}")]
    Source(String),

    #[error("csv line {line}: {reason}")]
    Csv { line: u64, reason: String },

    #[error("events out of order: {next} arrived after {previous}")]
    Unsorted { previous: DateTime<Utc>, next: DateTime<Utc> },

    #[error("listener {0} already registered")]
    DuplicateListener(String),

    #[error("feed {0} already registered")]
    DuplicateFeed(String),

    #[error("interval must be positive")]
    NonPositiveInterval,

    #[error("unsupported aggregation: {0}")]
    UnsupportedAggregation(String),

    #[error("aggregation failed: {0}")]
    Aggregation(String),

    #[error(transparent)]
    Bar(#[from] BarError),
}

pub trait EventFeed {
    /// Next event without consuming it. Repeated calls return the same event.
    fn peek(&mut self) -> Result<Option<&Event>, FeedError>;

    /// Consume and return what `peek` would have returned.
    fn pop(&mut self) -> Result<Option<Event>, FeedError>;

    /// No lookahead left and the source is exhausted or closed.
    fn is_finished(&mut self) -> bool;

    /// Idempotent; listeners are told the feed finished.
    fn close(&mut self);

    fn add_listener(&mut self, key: &str, listener: Box<dyn FeedListener>) -> Result<(), FeedError>;

    fn remove_listener(&mut self, key: &str) -> bool;

    /// Drop events with `dt_event < cutoff`. Dropped events do not reach listeners.
    fn remove_events_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, FeedError>;
}

pub trait FeedListener {
    fn on_event(&mut self, event: &Event) -> Result<(), FeedError>;

    /// The observed feed will produce nothing more.
    fn on_finished(&mut self) {}
}

/// Ordered listener subscriptions with per-listener error isolation.
#[derive(Default)]
pub struct Listeners {
    entries: Vec<(String, Box<dyn FeedListener>)>,
    finished: bool,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, listener: Box<dyn FeedListener>) -> Result<(), FeedError> {
        if self.entries.iter().any(|(k, _)| k == key) {
            return Err(FeedError::DuplicateListener(key.to_string()));
        }
        self.entries.push((key.to_string(), listener));
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        self.entries.len() != before
    }

    pub fn notify(&mut self, event: &Event) {
        for (key, listener) in &mut self.entries {
            if let Err(err) = listener.on_event(event) {
                warn!(listener = %key, error = %err, "feed listener failed");
            }
        }
    }

    /// Tell every listener the feed is done; only the first call counts.
    pub fn notify_finished(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        for (_, listener) in &mut self.entries {
            listener.on_finished();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
