//! Named feed collection with earliest-next-event selection.

use super::{EventFeed, FeedError};
use crate::domain::Event;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Feeds in registration order; ties on the next event time resolve to the
/// earliest registered feed.
#[derive(Default)]
pub struct EventFeedManager {
    feeds: Vec<(String, Box<dyn EventFeed>)>,
}

impl EventFeedManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_feed(&mut self, name: impl Into<String>, feed: Box<dyn EventFeed>) -> Result<(), FeedError> {
        let name = name.into();
        if self.feeds.iter().any(|(existing, _)| *existing == name) {
            return Err(FeedError::DuplicateFeed(name));
        }
        debug!(feed = %name, "feed added");
        self.feeds.push((name, feed));
        Ok(())
    }

    /// Close and drop a feed. False when no feed has that name.
    pub fn remove_feed(&mut self, name: &str) -> bool {
        let Some(index) = self.feeds.iter().position(|(existing, _)| existing == name) else {
            return false;
        };
        let (_, mut feed) = self.feeds.remove(index);
        feed.close();
        debug!(feed = %name, "feed removed");
        true
    }

    pub fn get_feed_mut(&mut self, name: &str) -> Option<&mut (dyn EventFeed + 'static)> {
        self.feeds.iter_mut().find(|(existing, _)| existing == name).map(|(_, feed)| feed.as_mut())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.feeds.iter().map(|(name, _)| name.as_str())
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.feeds.get(index).map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Index and time of the feed whose next event is earliest.
    pub fn find_feed_with_next_event(&mut self) -> Result<Option<(usize, DateTime<Utc>)>, FeedError> {
        let mut best: Option<(usize, DateTime<Utc>)> = None;
        for (index, (_, feed)) in self.feeds.iter_mut().enumerate() {
            if let Some(event) = feed.peek()? {
                let at = event.dt_event();
                if best.map_or(true, |(_, current)| at < current) {
                    best = Some((index, at));
                }
            }
        }
        Ok(best)
    }

    /// Indices of every feed whose next event is at `at`, in registration order.
    pub fn feeds_with_next_event_at(&mut self, at: DateTime<Utc>) -> Result<Vec<usize>, FeedError> {
        let mut found = Vec::new();
        for (index, (_, feed)) in self.feeds.iter_mut().enumerate() {
            if feed.peek()?.is_some_and(|event| event.dt_event() == at) {
                found.push(index);
            }
        }
        Ok(found)
    }

    pub fn pop(&mut self, index: usize) -> Result<Option<Event>, FeedError> {
        match self.feeds.get_mut(index) {
            Some((_, feed)) => feed.pop(),
            None => Ok(None),
        }
    }

    /// Drop finished feeds; returns their names.
    pub fn prune_finished(&mut self) -> Vec<String> {
        let mut pruned = Vec::new();
        self.feeds.retain_mut(|(name, feed)| {
            if feed.is_finished() {
                feed.close();
                pruned.push(name.clone());
                false
            } else {
                true
            }
        });
        for name in &pruned {
            debug!(feed = %name, "finished feed pruned");
        }
        pruned
    }

    pub fn close_all(&mut self) {
        for (_, feed) in &mut self.feeds {
            feed.close();
        }
    }

    /// True when every feed is finished (or there are none).
    pub fn all_finished(&mut self) -> bool {
        self.feeds.iter_mut().all(|(_, feed)| feed.is_finished())
    }
}
