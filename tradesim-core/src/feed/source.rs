//! Lookahead feed over a pull-based event source.

use super::{EventFeed, FeedError, FeedListener, Listeners};
use crate::domain::Event;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Pull-based producer behind a `SourceFeed`.
pub trait EventSource {
    /// Next event, or `None` once exhausted.
    fn next_event(&mut self) -> Result<Option<Event>, FeedError>;

    /// Release resources; no event is requested afterwards.
    fn close(&mut self) {}
}

/// Buffers one event ahead of its source so it can be peeked.
pub struct SourceFeed<S> {
    source: S,
    lookahead: Option<Event>,
    exhausted: bool,
    closed: bool,
    listeners: Listeners,
}

impl<S: EventSource> SourceFeed<S> {
    pub fn from_source(source: S) -> Self {
        Self { source, lookahead: None, exhausted: false, closed: false, listeners: Listeners::new() }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn fill(&mut self) -> Result<(), FeedError> {
        if self.lookahead.is_some() || self.exhausted || self.closed {
            return Ok(());
        }
        match self.source.next_event()? {
            Some(event) => self.lookahead = Some(event),
            None => {
                self.exhausted = true;
                self.listeners.notify_finished();
            }
        }
        Ok(())
    }
}

impl<S: EventSource> EventFeed for SourceFeed<S> {
    fn peek(&mut self) -> Result<Option<&Event>, FeedError> {
        self.fill()?;
        Ok(self.lookahead.as_ref())
    }

    fn pop(&mut self) -> Result<Option<Event>, FeedError> {
        self.fill()?;
        let event = self.lookahead.take();
        if let Some(event) = &event {
            self.listeners.notify(event);
        }
        Ok(event)
    }

    fn is_finished(&mut self) -> bool {
        // A failing source is not finished: the next peek reports the failure.
        if self.fill().is_err() {
            return false;
        }
        self.lookahead.is_none() && (self.exhausted || self.closed)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.lookahead = None;
        self.source.close();
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
        loop {
            self.fill()?;
            match &self.lookahead {
                Some(event) if event.dt_event() < cutoff => {
                    self.lookahead = None;
                    removed += 1;
                }
                _ => return Ok(removed),
            }
        }
    }
}

// ── In-memory ──────────────────────────────────────────────────────────

pub struct VecSource {
    events: VecDeque<Event>,
}

impl EventSource for VecSource {
    fn next_event(&mut self) -> Result<Option<Event>, FeedError> {
        Ok(self.events.pop_front())
    }

    fn close(&mut self) {
        self.events.clear();
    }
}

/// A fixed sequence of events, delivered as given.
pub type InMemoryFeed = SourceFeed<VecSource>;

impl InMemoryFeed {
    pub fn new(events: Vec<Event>) -> Self {
        Self::from_source(VecSource { events: events.into() })
    }

    /// Sort by `(dt_event, dt_received)` first; ties keep their input order.
    pub fn sorted(mut events: Vec<Event>) -> Self {
        events.sort_by_key(Event::sort_key);
        Self::new(events)
    }

    /// Events not yet pulled into the lookahead.
    pub fn remaining(&self) -> usize {
        self.source().events.len() + usize::from(self.lookahead.is_some())
    }
}

// ── Iterator ───────────────────────────────────────────────────────────

pub struct IterSource<I> {
    iter: I,
}

impl<I: Iterator<Item = Event>> EventSource for IterSource<I> {
    fn next_event(&mut self) -> Result<Option<Event>, FeedError> {
        Ok(self.iter.next())
    }
}

/// Lazily generated events.
pub type IterFeed<I> = SourceFeed<IterSource<I>>;

impl<I: Iterator<Item = Event>> IterFeed<I> {
    pub fn new(iter: I) -> Self {
        Self::from_source(IterSource { iter })
    }
}
