//! Events — the unit of delivery between feeds, brokers and strategies.

use super::bar::Bar;
use super::order::OrderSide;
use crate::market::OrderBook;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarEvent {
    pub bar: Bar,
    /// Replayed history rather than live data.
    pub historical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub bid_size: Decimal,
    pub ask_size: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    pub symbol: String,
    pub price: Decimal,
    pub size: Decimal,
    pub aggressor: Option<OrderSide>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Bar(BarEvent),
    QuoteTick(QuoteTick),
    TradeTick(TradeTick),
    OrderBook(OrderBook),
    TimeTick,
    OneTime { name: String },
    Periodic { name: String, sequence: u64 },
}

/// A price-bearing event as the broker sees it.
#[derive(Debug, Clone, Copy)]
pub enum PriceSample<'a> {
    Bar(&'a Bar),
    Quote(&'a QuoteTick),
    Trade(&'a TradeTick),
    Book(&'a OrderBook),
}

impl<'a> PriceSample<'a> {
    pub fn symbol(&self) -> &'a str {
        match *self {
            PriceSample::Bar(bar) => bar.symbol(),
            PriceSample::Quote(quote) => &quote.symbol,
            PriceSample::Trade(trade) => &trade.symbol,
            PriceSample::Book(book) => book.symbol(),
        }
    }
}

/// Immutable timestamped event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    dt_event: DateTime<Utc>,
    dt_received: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
    kind: EventKind,
}

impl Event {
    /// Event received at the instant it happened.
    pub fn new(dt_event: DateTime<Utc>, kind: EventKind) -> Self {
        Self::received(dt_event, dt_event, kind)
    }

    pub fn received(dt_event: DateTime<Utc>, dt_received: DateTime<Utc>, kind: EventKind) -> Self {
        Self { dt_event, dt_received, metadata: BTreeMap::new(), kind }
    }

    /// A bar event stamped at the bar's close.
    pub fn bar(bar: Bar, historical: bool) -> Self {
        let end = bar.end_dt();
        Self::new(end, EventKind::Bar(BarEvent { bar, historical }))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn dt_event(&self) -> DateTime<Utc> {
        self.dt_event
    }

    pub fn dt_received(&self) -> DateTime<Utc> {
        self.dt_received
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Chronological ordering key.
    pub fn sort_key(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.dt_event, self.dt_received)
    }

    pub fn as_bar(&self) -> Option<&BarEvent> {
        match &self.kind {
            EventKind::Bar(bar) => Some(bar),
            _ => None,
        }
    }

    pub fn price_sample(&self) -> Option<PriceSample<'_>> {
        match &self.kind {
            EventKind::Bar(event) => Some(PriceSample::Bar(&event.bar)),
            EventKind::QuoteTick(quote) => Some(PriceSample::Quote(quote)),
            EventKind::TradeTick(trade) => Some(PriceSample::Trade(trade)),
            EventKind::OrderBook(book) => Some(PriceSample::Book(book)),
            EventKind::TimeTick | EventKind::OneTime { .. } | EventKind::Periodic { .. } => None,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        self.price_sample().map(|sample| sample.symbol())
    }
}
