//! Bar aggregation — resample a bar feed into longer time bars.
//!
//! The aggregator subscribes to its source feed as a listener and builds
//! output bars as input bars are consumed from that feed. Windows are
//! right-closed `(start, end]` and aligned to UTC midnight, so 5-minute
//! windows end at :00, :05, :10, ... and the window a bar belongs to is
//! decided by the bar's end time.
//!
//! Flushing:
//! - A bar in a new window flushes the pending window first
//! - A bar ending exactly on its window end flushes that window, bar included
//! - Nothing is flushed when the source ends
//!
//! A window with fewer bars than `window / input_period` is partial;
//! `AggregationPolicy` decides whether partial windows are emitted.

use super::{EventFeed, FeedError, FeedListener, Listeners};
use crate::domain::{Bar, BarEvent, BarPeriod, BarType, Event, EventKind, Ohlcv};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;

const DAY_SECONDS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationPolicy {
    /// Emit the first flushed window even when it is partial.
    pub emit_first_partial: bool,
    /// Emit later partial windows.
    pub emit_partial: bool,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self { emit_first_partial: false, emit_partial: true }
    }
}

/// Right-closed, midnight-aligned window containing `end_dt`.
pub fn window_bounds(end_dt: DateTime<Utc>, window: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = end_dt.date_naive().and_hms_opt(0, 0, 0).map_or(end_dt, |m| m.and_utc());
    let offset = (end_dt - midnight).num_milliseconds();
    let len = window.num_milliseconds().max(1);
    let steps = (offset + len - 1) / len;
    let end = midnight + Duration::milliseconds(steps * len);
    (end - window, end)
}

struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    values: Ohlcv,
    bars: u32,
}

impl Window {
    fn open(start: DateTime<Utc>, end: DateTime<Utc>, bar: &Bar) -> Self {
        Self { start, end, values: *bar.values(), bars: 1 }
    }

    fn add(&mut self, bar: &Bar) {
        self.values.high = self.values.high.max(bar.high());
        self.values.low = self.values.low.min(bar.low());
        self.values.close = bar.close();
        self.values.volume += bar.volume();
        self.bars += 1;
    }
}

struct AggregatorState {
    input: BarType,
    output: BarType,
    window: Duration,
    bars_per_window: u32,
    policy: AggregationPolicy,
    current: Option<Window>,
    last_input_end: Option<DateTime<Utc>>,
    flushed_any: bool,
    ready: VecDeque<Event>,
    error: Option<FeedError>,
    source_finished: bool,
}

impl AggregatorState {
    fn ingest(&mut self, event: &Event) -> Result<(), FeedError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let result = self.try_ingest(event);
        if let Err(err) = &result {
            self.error = Some(err.clone());
        }
        result
    }

    fn try_ingest(&mut self, event: &Event) -> Result<(), FeedError> {
        let Some(BarEvent { bar, .. }) = event.as_bar() else {
            return Err(FeedError::Aggregation(format!("expected a bar event at {}", event.dt_event())));
        };
        if bar.bar_type() != &self.input {
            return Err(FeedError::Aggregation(format!("expected {} bars, got {}", self.input, bar.bar_type())));
        }
        if let Some(previous) = self.last_input_end {
            if bar.end_dt() <= previous {
                return Err(FeedError::Unsorted { previous, next: bar.end_dt() });
            }
        }
        self.last_input_end = Some(bar.end_dt());

        let (start, end) = window_bounds(bar.end_dt(), self.window);
        if self.current.as_ref().is_some_and(|w| w.end != end) {
            self.flush(event)?;
        }
        match &mut self.current {
            Some(window) => window.add(bar),
            slot @ None => *slot = Some(Window::open(start, end, bar)),
        }
        if bar.end_dt() == end {
            self.flush(event)?;
        }
        Ok(())
    }

    /// Close the pending window, stamping the output with `trigger`'s times.
    fn flush(&mut self, trigger: &Event) -> Result<(), FeedError> {
        let Some(window) = self.current.take() else {
            return Ok(());
        };
        let partial = window.bars < self.bars_per_window;
        let first = !self.flushed_any;
        self.flushed_any = true;

        let emit = !partial || if first { self.policy.emit_first_partial } else { self.policy.emit_partial };
        if !emit {
            debug!(bar_type = %self.output, start = %window.start, bars = window.bars, "partial window dropped");
            return Ok(());
        }

        let bar = if partial {
            Bar::new_partial(self.output.clone(), window.start, window.end, window.values)?
        } else {
            Bar::new(self.output.clone(), window.start, window.end, window.values)?
        };
        let historical = trigger.as_bar().is_some_and(|b| b.historical);
        let kind = EventKind::Bar(BarEvent { bar, historical });
        self.ready.push_back(Event::received(trigger.dt_event(), trigger.dt_received(), kind));
        Ok(())
    }
}

/// Listener half: registered on the source feed.
struct AggregatorInput {
    state: Rc<RefCell<AggregatorState>>,
}

impl FeedListener for AggregatorInput {
    fn on_event(&mut self, event: &Event) -> Result<(), FeedError> {
        self.state.borrow_mut().ingest(event)
    }

    fn on_finished(&mut self) {
        self.state.borrow_mut().source_finished = true;
    }
}

/// Feed of aggregated bars.
pub struct BarAggregatorFeed {
    state: Rc<RefCell<AggregatorState>>,
    pending: VecDeque<Event>,
    listeners: Listeners,
    closed: bool,
}

impl BarAggregatorFeed {
    /// Aggregate `input` bars from `source` into `output`-period bars.
    ///
    /// `output` must divide a day and be a whole multiple of the input period.
    pub fn new(
        source: &mut dyn EventFeed,
        input: BarType,
        output: BarPeriod,
        policy: AggregationPolicy,
    ) -> Result<Self, FeedError> {
        let input_secs = input.period.duration().num_seconds();
        let output_secs = output.duration().num_seconds();
        if DAY_SECONDS % output_secs != 0 {
            return Err(FeedError::UnsupportedAggregation(format!("{output} does not divide a day")));
        }
        if output_secs % input_secs != 0 {
            return Err(FeedError::UnsupportedAggregation(format!(
                "{output} is not a multiple of {}",
                input.period
            )));
        }
        let bars_per_window = u32::try_from(output_secs / input_secs)
            .map_err(|_| FeedError::UnsupportedAggregation(format!("{output} is too long")))?;

        let output_type = BarType { symbol: input.symbol.clone(), period: output, price_type: input.price_type };
        let key = format!("aggregate:{output_type}");
        let state = Rc::new(RefCell::new(AggregatorState {
            input,
            output: output_type,
            window: output.duration(),
            bars_per_window,
            policy,
            current: None,
            last_input_end: None,
            flushed_any: false,
            ready: VecDeque::new(),
            error: None,
            source_finished: false,
        }));
        source.add_listener(&key, Box::new(AggregatorInput { state: Rc::clone(&state) }))?;
        Ok(Self { state, pending: VecDeque::new(), listeners: Listeners::new(), closed: false })
    }

    /// Minute bars into `minutes`-minute bars.
    pub fn minutes(
        source: &mut dyn EventFeed,
        input: BarType,
        minutes: u32,
        policy: AggregationPolicy,
    ) -> Result<Self, FeedError> {
        let output = BarPeriod::minutes(minutes)?;
        Self::new(source, input, output, policy)
    }

    pub fn output_type(&self) -> BarType {
        self.state.borrow().output.clone()
    }

    /// Move finished bars out of the shared state; surfaces a recorded failure.
    fn collect(&mut self) -> Result<(), FeedError> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = &state.error {
            return Err(err.clone());
        }
        if !self.closed {
            self.pending.extend(state.ready.drain(..));
        }
        Ok(())
    }
}

impl EventFeed for BarAggregatorFeed {
    fn peek(&mut self) -> Result<Option<&Event>, FeedError> {
        self.collect()?;
        Ok(self.pending.front())
    }

    fn pop(&mut self) -> Result<Option<Event>, FeedError> {
        self.collect()?;
        let event = self.pending.pop_front();
        if let Some(event) = &event {
            self.listeners.notify(event);
        }
        if self.is_finished() {
            self.listeners.notify_finished();
        }
        Ok(event)
    }

    fn is_finished(&mut self) -> bool {
        if self.collect().is_err() {
            return false;
        }
        self.closed || (self.pending.is_empty() && self.state.borrow().source_finished)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.clear();
        let mut state = self.state.borrow_mut();
        state.ready.clear();
        state.current = None;
        drop(state);
        self.listeners.notify_finished();
    }

    fn add_listener(&mut self, key: &str, listener: Box<dyn FeedListener>) -> Result<(), FeedError> {
        self.listeners.add(key, listener)
    }

    fn remove_listener(&mut self, key: &str) -> bool {
        self.listeners.remove(key)
    }

    fn remove_events_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, FeedError> {
        self.collect()?;
        let before = self.pending.len();
        self.pending.retain(|event| event.dt_event() >= cutoff);
        Ok(before - self.pending.len())
    }
}

/// OHLCV of a constituent list, for callers checking an aggregate.
pub fn combine(bars: &[Bar]) -> Option<Ohlcv> {
    let (first, rest) = bars.split_first()?;
    let mut values = *first.values();
    for bar in rest {
        values.high = values.high.max(bar.high());
        values.low = values.low.min(bar.low());
        values.close = bar.close();
        values.volume += bar.volume();
    }
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::InMemoryFeed;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn t(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, hour, minute, 0).unwrap()
    }

    fn minute_type() -> BarType {
        BarType::new("SPY", BarPeriod::minutes(1).unwrap())
    }

    fn minute_bar(end: DateTime<Utc>, close: Decimal) -> Event {
        let values = Ohlcv { open: close, high: close + dec!(1), low: close - dec!(1), close, volume: dec!(10) };
        Event::bar(Bar::new(minute_type(), end - Duration::minutes(1), end, values).unwrap(), true)
    }

    fn drain(feed: &mut dyn EventFeed) -> Vec<Event> {
        std::iter::from_fn(|| feed.pop().unwrap()).collect()
    }

    /// Pump every source event, collecting aggregator output in delivery order.
    fn run(events: Vec<Event>, minutes: u32, policy: AggregationPolicy) -> Vec<Event> {
        let mut source = InMemoryFeed::new(events);
        let mut agg = BarAggregatorFeed::minutes(&mut source, minute_type(), minutes, policy).unwrap();
        let mut out = Vec::new();
        while source.pop().unwrap().is_some() {
            out.extend(drain(&mut agg));
        }
        out
    }

    #[test]
    fn windows_are_right_closed_and_midnight_aligned() {
        let five = Duration::minutes(5);
        assert_eq!(window_bounds(t(9, 31), five), (t(9, 30), t(9, 35)));
        assert_eq!(window_bounds(t(9, 35), five), (t(9, 30), t(9, 35)));
        assert_eq!(window_bounds(t(9, 36), five), (t(9, 35), t(9, 40)));
        assert_eq!(window_bounds(t(0, 0), five), (t(0, 0) - five, t(0, 0)));
    }

    #[test]
    fn bar_on_window_end_flushes_immediately() {
        let events = (1..=10).map(|m| minute_bar(t(9, 30 + m), Decimal::from(100 + m))).collect();
        let out = run(events, 5, AggregationPolicy::default());
        assert_eq!(out.len(), 2);
        let first = &out[0].as_bar().unwrap().bar;
        assert_eq!((first.start_dt(), first.end_dt()), (t(9, 30), t(9, 35)));
        assert_eq!(first.open(), dec!(101));
        assert_eq!(first.close(), dec!(105));
        assert_eq!(first.high(), dec!(106));
        assert_eq!(first.low(), dec!(100));
        assert_eq!(first.volume(), dec!(50));
        assert!(!first.is_partial());
        // Stamped with the triggering input bar's times.
        assert_eq!(out[0].dt_event(), t(9, 35));
        assert_eq!(out[1].dt_event(), t(9, 40));
    }

    #[test]
    fn first_partial_window_is_dropped_by_default() {
        // 09:33..09:37: window (09:30, 09:35] holds three bars.
        let events: Vec<Event> = (33..=37).map(|m| minute_bar(t(9, m), dec!(100))).collect();
        assert!(run(events.clone(), 5, AggregationPolicy::default()).is_empty());

        let keep = AggregationPolicy { emit_first_partial: true, emit_partial: true };
        let out = run(events, 5, keep);
        assert_eq!(out.len(), 1);
        assert!(out[0].as_bar().unwrap().bar.is_partial());
    }

    #[test]
    fn gap_flushes_pending_partial_window() {
        let mut events: Vec<Event> = (31..=35).map(|m| minute_bar(t(9, m), dec!(100))).collect();
        events.push(minute_bar(t(9, 37), dec!(101)));
        events.push(minute_bar(t(9, 42), dec!(102)));
        let out = run(events, 5, AggregationPolicy::default());
        assert_eq!(out.len(), 2);
        let partial = &out[1].as_bar().unwrap().bar;
        assert!(partial.is_partial());
        assert_eq!(partial.end_dt(), t(9, 40));
        // Flushed when the 09:42 bar arrived.
        assert_eq!(out[1].dt_event(), t(9, 42));

        let strict = AggregationPolicy { emit_first_partial: false, emit_partial: false };
        let mut events: Vec<Event> = (31..=35).map(|m| minute_bar(t(9, m), dec!(100))).collect();
        events.push(minute_bar(t(9, 37), dec!(101)));
        events.push(minute_bar(t(9, 42), dec!(102)));
        assert_eq!(run(events, 5, strict).len(), 1);
    }

    #[test]
    fn source_end_does_not_force_flush() {
        let events: Vec<Event> = (31..=33).map(|m| minute_bar(t(9, m), dec!(100))).collect();
        let mut source = InMemoryFeed::new(events);
        let keep = AggregationPolicy { emit_first_partial: true, emit_partial: true };
        let mut agg = BarAggregatorFeed::minutes(&mut source, minute_type(), 5, keep).unwrap();
        while source.pop().unwrap().is_some() {}
        assert!(source.is_finished());
        assert!(agg.peek().unwrap().is_none());
        assert!(agg.is_finished());
    }

    #[test]
    fn wrong_input_poisons_the_feed() {
        let mut source = InMemoryFeed::new(vec![
            minute_bar(t(9, 31), dec!(100)),
            Event::new(t(9, 32), EventKind::TimeTick),
            minute_bar(t(9, 33), dec!(100)),
        ]);
        let mut agg = BarAggregatorFeed::minutes(&mut source, minute_type(), 5, AggregationPolicy::default()).unwrap();
        while source.pop().unwrap().is_some() {}
        assert!(matches!(agg.peek(), Err(FeedError::Aggregation(_))));
        assert!(matches!(agg.pop(), Err(FeedError::Aggregation(_))));
        assert!(!agg.is_finished());
    }

    #[test]
    fn out_of_order_input_is_fatal() {
        let mut source = InMemoryFeed::new(vec![minute_bar(t(9, 32), dec!(100)), minute_bar(t(9, 31), dec!(100))]);
        let mut agg = BarAggregatorFeed::minutes(&mut source, minute_type(), 5, AggregationPolicy::default()).unwrap();
        while source.pop().unwrap().is_some() {}
        assert!(matches!(agg.peek(), Err(FeedError::Unsorted { .. })));
    }

    #[test]
    fn repeated_bar_does_not_reopen_its_window() {
        let mut source = InMemoryFeed::new(vec![minute_bar(t(9, 35), dec!(100)), minute_bar(t(9, 35), dec!(101))]);
        let mut agg = BarAggregatorFeed::minutes(&mut source, minute_type(), 5, AggregationPolicy::default()).unwrap();
        while source.pop().unwrap().is_some() {}
        assert!(matches!(agg.pop(), Err(FeedError::Unsorted { .. })));
    }

    #[test]
    fn rejects_unaligned_periods() {
        let mut source = InMemoryFeed::new(Vec::new());
        assert!(BarAggregatorFeed::minutes(&mut source, minute_type(), 7, AggregationPolicy::default()).is_err());
        let five = BarType::new("SPY", BarPeriod::minutes(5).unwrap());
        assert!(BarAggregatorFeed::minutes(&mut source, five, 12, AggregationPolicy::default()).is_err());
        assert!(BarAggregatorFeed::minutes(&mut source, minute_type(), 15, AggregationPolicy::default()).is_ok());
    }

    #[test]
    fn combine_matches_aggregate() {
        let bars: Vec<Bar> =
            (1..=5).map(|m| minute_bar(t(9, 30 + m), Decimal::from(m)).as_bar().unwrap().bar.clone()).collect();
        let values = combine(&bars).unwrap();
        assert_eq!(values.open, dec!(1));
        assert_eq!(values.close, dec!(5));
        assert_eq!(values.low, dec!(0));
        assert!(combine(&[]).is_none());
    }
}
