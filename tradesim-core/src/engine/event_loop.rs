//! The engine loop: batch by instant, dispatch by sequence.

use super::strategy::{FeedRequest, StopHandle, Strategy, StrategyContext};
use super::{EngineError, EngineMode, RunSummary};
use crate::broker::{Broker, BrokerCallbacks, OrderUpdate};
use crate::domain::{Event, Execution, OrderId};
use crate::feed::EventFeedManager;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

enum Notification {
    Execution(Execution),
    OrderUpdated(OrderUpdate),
}

impl Notification {
    fn order_id(&self) -> OrderId {
        match self {
            Notification::Execution(execution) => execution.order_id(),
            Notification::OrderUpdated(update) => update.order_id,
        }
    }
}

type NotificationQueue = Rc<RefCell<VecDeque<Notification>>>;

struct StrategySlot {
    strategy: Box<dyn Strategy>,
    feeds: EventFeedManager,
}

/// A popped event waiting in the dispatch heap.
struct Pending {
    at: DateTime<Utc>,
    sequence: u64,
    strategy: usize,
    feed: String,
    event: Event,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.sequence) == (other.at, other.sequence)
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.sequence).cmp(&(other.at, other.sequence))
    }
}

pub struct TradingEngine {
    mode: EngineMode,
    idle_wait: StdDuration,
    brokers: Vec<(String, Box<dyn Broker>)>,
    strategies: Vec<StrategySlot>,
    /// Which strategy placed each order.
    owners: HashMap<OrderId, usize>,
    notifications: NotificationQueue,
    stop: StopHandle,
    cursor: Option<DateTime<Utc>>,
    sequence: u64,
    running: bool,
    summary: RunSummary,
}

impl Default for TradingEngine {
    fn default() -> Self {
        Self::new(EngineMode::Historical)
    }
}

impl TradingEngine {
    pub fn new(mode: EngineMode) -> Self {
        Self {
            mode,
            idle_wait: StdDuration::from_millis(10),
            brokers: Vec::new(),
            strategies: Vec::new(),
            owners: HashMap::new(),
            notifications: Rc::new(RefCell::new(VecDeque::new())),
            stop: StopHandle::new(),
            cursor: None,
            sequence: 0,
            running: false,
            summary: RunSummary::default(),
        }
    }

    /// How long a live run sleeps when no feed has an event ready.
    pub fn with_idle_wait(mut self, idle_wait: StdDuration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Shareable flag; setting it ends the run after the current batch.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn add_broker(&mut self, broker: Box<dyn Broker>) -> Result<(), EngineError> {
        let name = broker.name().to_string();
        if self.brokers.iter().any(|(existing, _)| *existing == name) {
            return Err(EngineError::DuplicateBroker(name));
        }
        self.brokers.push((name, broker));
        Ok(())
    }

    pub fn broker(&self, name: &str) -> Option<&dyn Broker> {
        self.brokers.iter().find(|(existing, _)| existing == name).map(|(_, broker)| broker.as_ref())
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>, feeds: EventFeedManager) {
        debug!(strategy = strategy.name(), feeds = feeds.len(), "strategy added");
        self.strategies.push(StrategySlot { strategy, feeds });
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Connect brokers, start strategies, run the loop, then `stop`.
    pub fn start(&mut self) -> Result<RunSummary, EngineError> {
        if self.running {
            return Err(EngineError::AlreadyRunning);
        }
        self.running = true;
        self.stop.reset();
        self.summary = RunSummary::default();
        info!(
            mode = ?self.mode,
            brokers = self.brokers.len(),
            strategies = self.strategies.len(),
            "engine starting"
        );

        let result = self.connect_brokers().and_then(|()| self.start_strategies()).and_then(|()| self.run_loop());
        let stopped = self.stop();
        result.and(stopped)?;

        self.summary.final_cursor = self.cursor;
        info!(
            events = self.summary.events_dispatched,
            stale = self.summary.stale_events_skipped,
            cursor = ?self.cursor,
            "engine finished"
        );
        Ok(self.summary.clone())
    }

    /// Close feeds, call every `on_stop`, disconnect brokers. Idempotent.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        for slot in &mut self.strategies {
            slot.feeds.close_all();
        }
        let mut first_error = None;
        for index in 0..self.strategies.len() {
            let result = self.call_strategy(index, |strategy, ctx| strategy.on_stop(ctx));
            let result = result.and_then(|()| self.deliver_notifications());
            if let Err(err) = result {
                warn!(error = %err, "strategy stop failed");
                first_error.get_or_insert(err);
            }
        }
        for (name, broker) in &mut self.brokers {
            broker.disconnect();
            debug!(broker = %name, "broker stopped");
        }
        first_error.map_or(Ok(()), Err)
    }

    // ── Startup ────────────────────────────────────────────────────────

    fn connect_brokers(&mut self) -> Result<(), EngineError> {
        for (_, broker) in &mut self.brokers {
            broker.connect()?;
            let executions = Rc::clone(&self.notifications);
            let updates = Rc::clone(&self.notifications);
            broker.set_callbacks(BrokerCallbacks::new(
                move |execution: &Execution| {
                    executions.borrow_mut().push_back(Notification::Execution(execution.clone()));
                },
                move |update: &OrderUpdate| {
                    updates.borrow_mut().push_back(Notification::OrderUpdated(update.clone()));
                },
            ));
        }
        Ok(())
    }

    fn start_strategies(&mut self) -> Result<(), EngineError> {
        for index in 0..self.strategies.len() {
            self.call_strategy(index, |strategy, ctx| strategy.on_start(ctx))?;
            self.deliver_notifications()?;
        }
        Ok(())
    }

    // ── Loop ───────────────────────────────────────────────────────────

    fn run_loop(&mut self) -> Result<(), EngineError> {
        let mut heap = BinaryHeap::new();
        loop {
            if self.stop.is_stop_requested() {
                info!(cursor = ?self.cursor, "stop requested");
                return Ok(());
            }
            let pruned = self.prune_finished();

            let Some(at) = self.earliest_next_event()? else {
                if self.mode == EngineMode::Live {
                    std::thread::sleep(self.idle_wait);
                    continue;
                }
                if self.strategies.iter().all(|slot| slot.feeds.is_empty()) {
                    return Ok(());
                }
                if pruned == 0 {
                    warn!(cursor = ?self.cursor, "feeds stalled with no event ready");
                    return Ok(());
                }
                continue;
            };

            self.collect_batch(at, &mut heap)?;
            while let Some(Reverse(pending)) = heap.pop() {
                self.dispatch(pending)?;
            }
        }
    }

    fn prune_finished(&mut self) -> usize {
        let mut pruned = 0;
        for slot in &mut self.strategies {
            let names = slot.feeds.prune_finished();
            for name in &names {
                debug!(strategy = slot.strategy.name(), feed = %name, "feed finished");
            }
            pruned += names.len();
        }
        self.summary.feeds_pruned += pruned;
        pruned
    }

    fn earliest_next_event(&mut self) -> Result<Option<DateTime<Utc>>, EngineError> {
        let mut earliest: Option<DateTime<Utc>> = None;
        for slot in &mut self.strategies {
            if let Some((_, at)) = slot.feeds.find_feed_with_next_event()? {
                earliest = Some(earliest.map_or(at, |current| current.min(at)));
            }
        }
        Ok(earliest)
    }

    /// Pop every feed positioned at `at`, strategies then feeds in registration order.
    fn collect_batch(&mut self, at: DateTime<Utc>, heap: &mut BinaryHeap<Reverse<Pending>>) -> Result<(), EngineError> {
        for (strategy, slot) in self.strategies.iter_mut().enumerate() {
            for index in slot.feeds.feeds_with_next_event_at(at)? {
                let feed = slot.feeds.name_at(index).map(str::to_string).unwrap_or_default();
                if let Some(event) = slot.feeds.pop(index)? {
                    heap.push(Reverse(Pending { at: event.dt_event(), sequence: self.sequence, strategy, feed, event }));
                    self.sequence += 1;
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, pending: Pending) -> Result<(), EngineError> {
        if self.cursor.is_some_and(|cursor| pending.at < cursor) {
            warn!(feed = %pending.feed, at = %pending.at, cursor = ?self.cursor, "stale event skipped");
            self.summary.stale_events_skipped += 1;
            return Ok(());
        }
        self.cursor = Some(pending.at);

        let is_price = pending.event.price_sample().is_some();
        for (_, broker) in &mut self.brokers {
            broker.set_current_time(pending.at);
            if is_price {
                broker.process_price_sample(&pending.event)?;
            }
        }
        self.summary.events_dispatched += 1;

        let Pending { strategy, feed, event, .. } = pending;
        self.call_strategy(strategy, |s, ctx| s.on_event(ctx, &feed, &event))?;
        self.deliver_notifications()
    }

    /// Route queued broker notifications to the strategies owning the orders.
    fn deliver_notifications(&mut self) -> Result<(), EngineError> {
        loop {
            let next = self.notifications.borrow_mut().pop_front();
            let Some(notification) = next else {
                return Ok(());
            };
            let order_id = notification.order_id();
            let Some(&owner) = self.owners.get(&order_id) else {
                debug!(order_id = %order_id, "notification for an order no strategy placed");
                continue;
            };
            self.summary.notifications_delivered += 1;
            match notification {
                Notification::Execution(execution) => {
                    self.call_strategy(owner, |s, ctx| s.on_execution(ctx, &execution))?;
                }
                Notification::OrderUpdated(update) => {
                    self.call_strategy(owner, |s, ctx| s.on_order_updated(ctx, &update))?;
                }
            }
        }
    }

    /// Run one strategy callback, then apply the feed changes it requested.
    fn call_strategy(
        &mut self,
        index: usize,
        callback: impl FnOnce(&mut dyn Strategy, &mut StrategyContext<'_>) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let Some(slot) = self.strategies.get_mut(index) else {
            return Ok(());
        };
        let mut requests = Vec::new();
        let mut ctx =
            StrategyContext::new(index, self.cursor, &mut self.brokers, &mut self.owners, &mut requests, &self.stop);
        let result = callback(slot.strategy.as_mut(), &mut ctx);

        for request in requests {
            match request {
                FeedRequest::Add { name, feed } => {
                    debug!(strategy = slot.strategy.name(), feed = %name, "feed added at runtime");
                    slot.feeds.add_feed(name, feed)?;
                }
                FeedRequest::Remove(name) => {
                    if !slot.feeds.remove_feed(&name) {
                        warn!(strategy = slot.strategy.name(), feed = %name, "no such feed to remove");
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::SimBroker;
    use crate::domain::{Bar, BarPeriod, BarType, EventKind, Instrument, Ohlcv, Order, OrderSide};
    use crate::feed::{AggregationPolicy, BarAggregatorFeed, InMemoryFeed};
    use crate::market::LadderDepth;
    use crate::money::{Currency, CurrencyKind, Money};
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    type Log = Rc<RefCell<Vec<String>>>;

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap() + Duration::minutes(minute)
    }

    fn bar_at(minute: i64, close: Decimal) -> Event {
        let values = Ohlcv { open: close, high: close, low: close, close, volume: dec!(1000) };
        let bar_type = BarType::new("SPY", BarPeriod::minutes(1).unwrap());
        Event::bar(Bar::new(bar_type, t(minute - 1), t(minute), values).unwrap(), true)
    }

    fn alarm(minute: i64, name: &str) -> Event {
        Event::new(t(minute), EventKind::OneTime { name: name.to_string() })
    }

    fn sim_broker() -> Box<dyn Broker> {
        let usd = Currency::new("USD", 2, CurrencyKind::Fiat).unwrap();
        let mut broker = SimBroker::new("sim");
        broker.register_instrument(Instrument::equity("SPY", usd.clone()).unwrap()).unwrap();
        broker.deposit(&Money::new(dec!(100000), usd).unwrap()).unwrap();
        Box::new(broker)
    }

    fn feeds(named: Vec<(&str, Vec<Event>)>) -> EventFeedManager {
        let mut manager = EventFeedManager::new();
        for (name, events) in named {
            manager.add_feed(name, Box::new(InMemoryFeed::new(events))).unwrap();
        }
        manager
    }

    /// Logs callbacks; optionally buys on the first bar or acts on alarms.
    struct Recorder {
        name: String,
        log: Log,
        buy_on_first_bar: bool,
        bought: bool,
    }

    impl Recorder {
        fn new(name: &str, log: &Log) -> Self {
            Self { name: name.to_string(), log: Rc::clone(log), buy_on_first_bar: false, bought: false }
        }

        fn buyer(name: &str, log: &Log) -> Self {
            Self { buy_on_first_bar: true, ..Self::new(name, log) }
        }
    }

    impl Strategy for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_event(&mut self, ctx: &mut StrategyContext<'_>, feed: &str, event: &Event) -> Result<(), EngineError> {
            self.log.borrow_mut().push(format!("{}:{feed}@{}", self.name, event.dt_event().format("%H:%M")));
            if self.buy_on_first_bar && !self.bought && event.as_bar().is_some() {
                self.bought = true;
                ctx.submit_order("sim", Order::market("SPY", OrderSide::Buy, dec!(10)).unwrap())?;
            }
            match event.kind() {
                EventKind::OneTime { name } if name == "stop" => ctx.request_stop(),
                EventKind::OneTime { name } if name == "late" => {
                    let stale = vec![alarm(-5, "old"), alarm(20, "new")];
                    ctx.add_event_feed("late", Box::new(InMemoryFeed::new(stale)));
                }
                _ => {}
            }
            Ok(())
        }

        fn on_execution(&mut self, _ctx: &mut StrategyContext<'_>, execution: &Execution) -> Result<(), EngineError> {
            self.log.borrow_mut().push(format!("{}:exec {} @ {}", self.name, execution.quantity(), execution.price()));
            Ok(())
        }

        fn on_order_updated(&mut self, _ctx: &mut StrategyContext<'_>, update: &OrderUpdate) -> Result<(), EngineError> {
            self.log.borrow_mut().push(format!("{}:{:?}", self.name, update.to));
            Ok(())
        }

        fn on_stop(&mut self, _ctx: &mut StrategyContext<'_>) -> Result<(), EngineError> {
            self.log.borrow_mut().push(format!("{}:stop", self.name));
            Ok(())
        }
    }

    #[test]
    fn merges_feeds_chronologically_with_registration_ties() {
        let log: Log = Rc::default();
        let mut engine = TradingEngine::default();
        engine.add_strategy(
            Box::new(Recorder::new("a", &log)),
            feeds(vec![("x", vec![alarm(1, "x"), alarm(3, "x")]), ("y", vec![alarm(1, "y"), alarm(2, "y")])]),
        );
        engine.add_strategy(Box::new(Recorder::new("b", &log)), feeds(vec![("z", vec![alarm(1, "z")])]));

        let summary = engine.start().unwrap();
        assert_eq!(
            *log.borrow(),
            ["a:x@14:31", "a:y@14:31", "b:z@14:31", "a:y@14:32", "a:x@14:33", "a:stop", "b:stop"]
        );
        assert_eq!(summary.events_dispatched, 5);
        assert_eq!(summary.final_cursor, Some(t(3)));
        assert_eq!(summary.feeds_pruned, 3);
    }

    #[test]
    fn broker_sees_prices_before_the_strategy() {
        let log: Log = Rc::default();
        let mut engine = TradingEngine::default();
        engine.add_broker(sim_broker()).unwrap();
        engine.add_strategy(
            Box::new(Recorder::buyer("s", &log)),
            feeds(vec![("bars", vec![bar_at(1, dec!(100)), bar_at(2, dec!(101))])]),
        );
        engine.start().unwrap();

        assert_eq!(
            *log.borrow(),
            [
                "s:bars@14:31",
                "s:PendingSubmit",
                "s:Submitted",
                "s:Working",
                "s:bars@14:32",
                "s:exec 10 @ 101",
                "s:Filled",
                "s:stop",
            ]
        );
        let broker = engine.broker("sim").unwrap();
        assert_eq!(broker.get_position("SPY").unwrap().quantity(), dec!(10));
        assert!(!broker.is_connected());
    }

    #[test]
    fn aggregated_bars_follow_their_trigger() {
        let log: Log = Rc::default();
        let minute = BarType::new("SPY", BarPeriod::minutes(1).unwrap());
        let mut source = InMemoryFeed::new((1..=10).map(|m| bar_at(m, dec!(100))).collect());
        let agg = BarAggregatorFeed::minutes(&mut source, minute, 5, AggregationPolicy::default()).unwrap();
        let mut manager = EventFeedManager::new();
        manager.add_feed("1m", Box::new(source)).unwrap();
        manager.add_feed("5m", Box::new(agg)).unwrap();

        let mut engine = TradingEngine::default();
        engine.add_strategy(Box::new(Recorder::new("s", &log)), manager);
        let summary = engine.start().unwrap();

        let events: Vec<String> = log.borrow().iter().filter(|l| l.contains("5m")).cloned().collect();
        assert_eq!(events, ["s:5m@14:35", "s:5m@14:40"]);
        let position = log.borrow().iter().position(|l| l == "s:5m@14:35").unwrap();
        assert_eq!(log.borrow()[position - 1], "s:1m@14:35");
        assert_eq!(summary.stale_events_skipped, 0);
        assert_eq!(summary.events_dispatched, 12);
    }

    /// Sends one oversized market buy before the first event.
    struct Sweeper {
        fills: Rc<RefCell<Vec<(DateTime<Utc>, Decimal)>>>,
    }

    impl Strategy for Sweeper {
        fn name(&self) -> &str {
            "sweeper"
        }

        fn on_start(&mut self, ctx: &mut StrategyContext<'_>) -> Result<(), EngineError> {
            ctx.submit_order("sim", Order::market("SPY", OrderSide::Buy, dec!(100)).unwrap())?;
            Ok(())
        }

        fn on_event(&mut self, _ctx: &mut StrategyContext<'_>, _feed: &str, _event: &Event) -> Result<(), EngineError> {
            Ok(())
        }

        fn on_execution(&mut self, _ctx: &mut StrategyContext<'_>, execution: &Execution) -> Result<(), EngineError> {
            self.fills.borrow_mut().push((execution.timestamp(), execution.quantity()));
            Ok(())
        }
    }

    #[test]
    fn aggregated_bar_does_not_refill_its_trigger_instant() {
        let usd = Currency::new("USD", 2, CurrencyKind::Fiat).unwrap();
        let mut broker = SimBroker::new("sim").with_depth_model(LadderDepth::new(1, 0, dec!(1)));
        broker.register_instrument(Instrument::equity("SPY", usd.clone()).unwrap()).unwrap();
        broker.deposit(&Money::new(dec!(100000), usd).unwrap()).unwrap();

        let minute = BarType::new("SPY", BarPeriod::minutes(1).unwrap());
        let mut source = InMemoryFeed::new((1..=5).map(|m| bar_at(m, dec!(100))).collect());
        let agg = BarAggregatorFeed::minutes(&mut source, minute, 5, AggregationPolicy::default()).unwrap();
        let mut manager = EventFeedManager::new();
        manager.add_feed("1m", Box::new(source)).unwrap();
        manager.add_feed("5m", Box::new(agg)).unwrap();

        let fills = Rc::new(RefCell::new(Vec::new()));
        let mut engine = TradingEngine::default();
        engine.add_broker(Box::new(broker)).unwrap();
        engine.add_strategy(Box::new(Sweeper { fills: Rc::clone(&fills) }), manager);
        let summary = engine.start().unwrap();

        assert_eq!(summary.events_dispatched, 6);
        let at_close: Decimal = fills.borrow().iter().filter(|(at, _)| *at == t(5)).map(|(_, q)| *q).sum();
        assert_eq!(at_close, dec!(1));
        let total: Decimal = fills.borrow().iter().map(|(_, q)| *q).sum();
        assert_eq!(total, dec!(5));
    }

    #[test]
    fn aggregation_failure_fails_the_run() {
        let log: Log = Rc::default();
        let minute = BarType::new("SPY", BarPeriod::minutes(1).unwrap());
        let mut source = InMemoryFeed::new(vec![bar_at(1, dec!(100)), alarm(2, "noise"), bar_at(3, dec!(100))]);
        let agg = BarAggregatorFeed::minutes(&mut source, minute, 5, AggregationPolicy::default()).unwrap();
        let mut manager = EventFeedManager::new();
        manager.add_feed("1m", Box::new(source)).unwrap();
        manager.add_feed("5m", Box::new(agg)).unwrap();

        let mut engine = TradingEngine::default();
        engine.add_strategy(Box::new(Recorder::new("s", &log)), manager);
        assert!(matches!(engine.start(), Err(EngineError::Feed(_))));
        assert!(!engine.is_running());
        assert_eq!(log.borrow().last().map(String::as_str), Some("s:stop"));
    }

    #[test]
    fn request_stop_ends_the_run() {
        let log: Log = Rc::default();
        let mut engine = TradingEngine::new(EngineMode::Live).with_idle_wait(StdDuration::from_millis(1));
        engine.add_strategy(
            Box::new(Recorder::new("s", &log)),
            feeds(vec![("alarms", vec![alarm(1, "tick"), alarm(2, "stop"), alarm(3, "never")])]),
        );
        let summary = engine.start().unwrap();
        assert_eq!(summary.events_dispatched, 2);
        assert_eq!(log.borrow().last().map(String::as_str), Some("s:stop"));
        // Stopping again is a no-op.
        engine.stop().unwrap();
    }

    #[test]
    fn events_behind_the_cursor_are_skipped() {
        let log: Log = Rc::default();
        let mut engine = TradingEngine::default();
        engine.add_strategy(
            Box::new(Recorder::new("s", &log)),
            feeds(vec![("alarms", vec![alarm(1, "late"), alarm(10, "tick")])]),
        );
        let summary = engine.start().unwrap();
        assert_eq!(summary.stale_events_skipped, 1);
        assert_eq!(*log.borrow(), ["s:alarms@14:31", "s:alarms@14:40", "s:late@14:50", "s:stop"]);
    }

    struct Meddler;

    impl Strategy for Meddler {
        fn name(&self) -> &str {
            "meddler"
        }

        fn on_event(&mut self, ctx: &mut StrategyContext<'_>, _feed: &str, _event: &Event) -> Result<(), EngineError> {
            let broker = ctx.broker("sim")?;
            let foreign: Vec<OrderId> = broker.list_active_orders().iter().map(|o| o.id()).collect();
            assert!(ctx.get_active_orders("sim")?.is_empty());
            for id in foreign {
                assert_eq!(ctx.cancel_order("sim", id), Err(EngineError::ForeignOrder(id)));
            }
            assert!(matches!(ctx.broker("nope"), Err(EngineError::UnknownBroker(_))));
            Ok(())
        }
    }

    #[test]
    fn strategies_only_touch_their_own_orders() {
        let log: Log = Rc::default();
        let mut engine = TradingEngine::default();
        engine.add_broker(sim_broker()).unwrap();
        assert!(matches!(engine.add_broker(sim_broker()), Err(EngineError::DuplicateBroker(_))));
        engine.add_strategy(Box::new(Recorder::buyer("s", &log)), feeds(vec![("bars", vec![bar_at(1, dec!(100))])]));
        engine.add_strategy(Box::new(Meddler), feeds(vec![("alarms", vec![alarm(1, "poke")])]));
        engine.start().unwrap();
    }
}
