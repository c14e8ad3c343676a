//! Timer feeds: evenly spaced time ticks and named one-off / periodic alarms.

use super::source::{EventSource, SourceFeed};
use super::{EventFeed, FeedError, FeedListener, Listeners};
use crate::domain::{Event, EventKind};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

// ── Time ticks ─────────────────────────────────────────────────────────

/// `TimeTick` at `start`, `start + interval`, ... up to and including `end`.
pub struct TimeTickSource {
    next: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Duration,
}

impl EventSource for TimeTickSource {
    fn next_event(&mut self) -> Result<Option<Event>, FeedError> {
        if self.next > self.end {
            return Ok(None);
        }
        let event = Event::new(self.next, EventKind::TimeTick);
        self.next += self.interval;
        Ok(Some(event))
    }
}

pub type TimeTickFeed = SourceFeed<TimeTickSource>;

impl TimeTickFeed {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, interval: Duration) -> Result<Self, FeedError> {
        if interval <= Duration::zero() {
            return Err(FeedError::NonPositiveInterval);
        }
        Ok(Self::from_source(TimeTickSource { next: start, end, interval }))
    }
}

// ── Scheduler ──────────────────────────────────────────────────────────

struct Repeat {
    name: String,
    interval: Duration,
    until: DateTime<Utc>,
    sequence: u64,
}

struct Scheduled {
    event: Event,
    repeat: Option<Repeat>,
}

/// Named alarms. Alarms at the same instant fire in scheduling order.
#[derive(Default)]
pub struct SchedulerFeed {
    queue: BTreeMap<(DateTime<Utc>, u64), Scheduled>,
    next_seq: u64,
    closed: bool,
    listeners: Listeners,
}

impl SchedulerFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `OneTime { name }` event at `at`.
    pub fn schedule_once(&mut self, name: impl Into<String>, at: DateTime<Utc>) {
        let event = Event::new(at, EventKind::OneTime { name: name.into() });
        self.push(event, None);
    }

    /// `Periodic { name, sequence }` events from `first` every `interval`
    /// while not after `until`.
    pub fn schedule_every(
        &mut self,
        name: impl Into<String>,
        first: DateTime<Utc>,
        interval: Duration,
        until: DateTime<Utc>,
    ) -> Result<(), FeedError> {
        if interval <= Duration::zero() {
            return Err(FeedError::NonPositiveInterval);
        }
        if first > until {
            return Ok(());
        }
        let name = name.into();
        let event = Event::new(first, EventKind::Periodic { name: name.clone(), sequence: 0 });
        self.push(event, Some(Repeat { name, interval, until, sequence: 0 }));
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn push(&mut self, event: Event, repeat: Option<Repeat>) {
        if self.closed {
            return;
        }
        let key = (event.dt_event(), self.next_seq);
        self.next_seq += 1;
        self.queue.insert(key, Scheduled { event, repeat });
    }

    fn pop_next(&mut self) -> Option<Event> {
        let (_, Scheduled { event, repeat }) = self.queue.pop_first()?;
        if let Some(repeat) = repeat {
            let at = event.dt_event() + repeat.interval;
            if at <= repeat.until {
                let sequence = repeat.sequence + 1;
                let next = Event::new(at, EventKind::Periodic { name: repeat.name.clone(), sequence });
                self.push(next, Some(Repeat { sequence, ..repeat }));
            }
        }
        Some(event)
    }

    fn notify_if_drained(&mut self) {
        if self.queue.is_empty() {
            self.listeners.notify_finished();
        }
    }
}

impl EventFeed for SchedulerFeed {
    fn peek(&mut self) -> Result<Option<&Event>, FeedError> {
        Ok(self.queue.first_key_value().map(|(_, scheduled)| &scheduled.event))
    }

    fn pop(&mut self) -> Result<Option<Event>, FeedError> {
        let event = self.pop_next();
        if let Some(event) = &event {
            self.listeners.notify(event);
        }
        self.notify_if_drained();
        Ok(event)
    }

    fn is_finished(&mut self) -> bool {
        self.closed || self.queue.is_empty()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.queue.clear();
        self.listeners.notify_finished();
    }

    fn add_listener(&mut self, key: &str, listener: Box<dyn FeedListener>) -> Result<(), FeedError> {
        self.listeners.add(key, listener)
    }

    fn remove_listener(&mut self, key: &str) -> bool {
        self.listeners.remove(key)
    }

    fn remove_events_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, FeedError> {
        let mut removed = 0;
        while self.queue.first_key_value().is_some_and(|((at, _), _)| *at < cutoff) {
            self.pop_next();
            removed += 1;
        }
        self.notify_if_drained();
        Ok(removed)
    }
}
