//! Integration tests for the simulated broker's matching pipeline.
//!
//! Scenarios:
//! 1. Resting liquidity: a limit order takes what the book offers and rests
//! 2. Three-level walk: levels beyond the limit are excluded
//! 3. Stop trigger: pending on the first quote, filled on the second
//! 4. Stop-limit: triggered through its limit, rests, then fills as a limit
//! 5. Same-instant samples share one book's liquidity
//! 6. Margin: blocked and released without leaking value

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cell::RefCell;
use std::rc::Rc;
use tradesim_core::broker::{Broker, BrokerCallbacks, OrderUpdate, SimBroker};
use tradesim_core::domain::{
    Event, EventKind, Execution, Instrument, Order, OrderSide, OrderState, QuoteTick,
};
use tradesim_core::execution::{DistributionFillModel, FixedRatioMarginModel, TickDistribution};
use tradesim_core::market::{BookLevel, OrderBook};
use tradesim_core::money::{Currency, CurrencyKind, Money};

// ── Helpers ──────────────────────────────────────────────────────────

fn usd() -> Currency {
    Currency::new("USD", 2, CurrencyKind::Fiat).unwrap()
}

fn t(second: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap() + Duration::seconds(second)
}

/// Connected broker that always fills on touch and never slips.
fn broker(cash: Decimal) -> SimBroker {
    let fills = DistributionFillModel::new(TickDistribution::constant(0), 1.0, 7).unwrap();
    let mut broker = SimBroker::new("sim").with_fill_model(fills);
    broker.register_instrument(Instrument::equity("SPY", usd()).unwrap()).unwrap();
    broker.deposit(&Money::new(cash, usd()).unwrap()).unwrap();
    broker.connect().unwrap();
    broker
}

fn book(second: i64, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) -> Event {
    let levels = |side: &[(Decimal, Decimal)]| -> Vec<BookLevel> {
        side.iter().map(|&(p, q)| BookLevel::new(p, q)).collect()
    };
    let book = OrderBook::new("SPY", t(second), levels(bids), levels(asks)).unwrap();
    Event::new(t(second), EventKind::OrderBook(book))
}

fn quote(second: i64, bid: Decimal, ask: Decimal) -> Event {
    let quote = QuoteTick { symbol: "SPY".into(), bid, ask, bid_size: dec!(100), ask_size: dec!(100) };
    Event::new(t(second), EventKind::QuoteTick(quote))
}

fn fills_of(broker: &SimBroker) -> Vec<(Decimal, Decimal)> {
    broker.executions().iter().map(|e| (e.quantity(), e.price())).collect()
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn limit_takes_resting_liquidity_then_rests() {
    let mut broker = broker(dec!(100000));
    let id = broker.submit_order(Order::limit("SPY", OrderSide::Buy, dec!(10), dec!(101)).unwrap()).unwrap();

    broker
        .process_price_sample(&book(1, &[(dec!(99), dec!(10))], &[(dec!(101), dec!(5)), (dec!(102), dec!(5))]))
        .unwrap();

    assert_eq!(fills_of(&broker), [(dec!(5), dec!(101))]);
    let order = broker.get_order(id).unwrap();
    assert_eq!(order.state(), OrderState::PartiallyFilled);
    assert_eq!(order.unfilled_quantity(), dec!(5));
    assert_eq!(broker.list_active_orders().len(), 1);
}

#[test]
fn limit_walks_levels_up_to_its_price() {
    let mut broker = broker(dec!(100000));
    let id = broker.submit_order(Order::limit("SPY", OrderSide::Buy, dec!(10), dec!(101)).unwrap()).unwrap();

    let asks = [(dec!(100), dec!(3)), (dec!(101), dec!(5)), (dec!(102), dec!(5))];
    broker.process_price_sample(&book(1, &[(dec!(99), dec!(10))], &asks)).unwrap();

    assert_eq!(fills_of(&broker), [(dec!(3), dec!(100)), (dec!(5), dec!(101))]);
    let order = broker.get_order(id).unwrap();
    assert_eq!(order.filled_quantity(), dec!(8));
    assert_eq!(order.state(), OrderState::PartiallyFilled);
    // VWAP of the two slices.
    assert_eq!(broker.get_position("SPY").unwrap().average_price(), dec!(805) / dec!(8));
}

#[test]
fn stop_triggers_on_touch_and_fills() {
    let mut broker = broker(dec!(100000));
    let states = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&states);
    broker.set_callbacks(BrokerCallbacks::new(|_: &Execution| {}, move |u: &OrderUpdate| sink.borrow_mut().push(u.to)));

    let id = broker.submit_order(Order::stop("SPY", OrderSide::Buy, dec!(1), dec!(100.00)).unwrap()).unwrap();
    broker.process_price_sample(&quote(1, dec!(99.98), dec!(99.99))).unwrap();
    assert_eq!(broker.get_order(id).unwrap().state(), OrderState::TriggerPending);

    broker.process_price_sample(&quote(2, dec!(99.99), dec!(100.00))).unwrap();
    assert_eq!(
        *states.borrow(),
        [
            OrderState::PendingSubmit,
            OrderState::Submitted,
            OrderState::TriggerPending,
            OrderState::Triggered,
            OrderState::Working,
            OrderState::Filled,
        ]
    );
    assert_eq!(fills_of(&broker), [(dec!(1), dec!(100.00))]);
    assert_eq!(broker.executions()[0].timestamp(), t(2));
}

#[test]
fn stop_limit_rests_after_gapping_through_its_limit() {
    let mut broker = broker(dec!(100000));
    let id = broker
        .submit_order(Order::stop_limit("SPY", OrderSide::Buy, dec!(2), dec!(100.5), dec!(100.5)).unwrap())
        .unwrap();
    assert_eq!(broker.get_order(id).unwrap().state(), OrderState::TriggerPending);

    // Ask gaps above both prices: triggered, but the limit is not marketable.
    broker.process_price_sample(&quote(1, dec!(100.9), dec!(101))).unwrap();
    assert_eq!(broker.get_order(id).unwrap().state(), OrderState::Working);
    assert!(broker.executions().is_empty());

    broker.process_price_sample(&quote(2, dec!(100.3), dec!(100.4))).unwrap();
    let order = broker.get_order(id).unwrap();
    assert_eq!(order.state(), OrderState::Filled);
    assert_eq!(fills_of(&broker), [(dec!(2), dec!(100.4))]);
}

#[test]
fn samples_at_one_instant_share_the_book() {
    let mut broker = broker(dec!(100000));
    let id = broker.submit_order(Order::market("SPY", OrderSide::Buy, dec!(10)).unwrap()).unwrap();

    broker.process_price_sample(&book(1, &[(dec!(99), dec!(10))], &[(dec!(100), dec!(4))])).unwrap();
    // A second snapshot at the same instant does not refill the ask.
    broker.process_price_sample(&book(1, &[(dec!(99), dec!(10))], &[(dec!(100), dec!(4))])).unwrap();
    assert_eq!(fills_of(&broker), [(dec!(4), dec!(100))]);
    assert_eq!(broker.get_order(id).unwrap().filled_quantity(), dec!(4));

    broker.process_price_sample(&book(2, &[(dec!(99), dec!(10))], &[(dec!(100), dec!(4))])).unwrap();
    assert_eq!(broker.get_order(id).unwrap().filled_quantity(), dec!(8));
}

#[test]
fn margin_round_trip_conserves_value() {
    let margin = FixedRatioMarginModel::new(dec!(0.1), dec!(0.05)).unwrap();
    let mut broker = SimBroker::new("sim").with_margin_model(margin);
    broker.register_instrument(Instrument::equity("SPY", usd()).unwrap()).unwrap();
    broker.deposit(&Money::new(dec!(10000), usd()).unwrap()).unwrap();
    broker.connect().unwrap();

    broker.submit_order(Order::market("SPY", OrderSide::Buy, dec!(10)).unwrap()).unwrap();
    broker.process_price_sample(&quote(1, dec!(100), dec!(100))).unwrap();
    assert!(broker.account().margin("SPY").is_some());
    assert_eq!(broker.account().total(&usd()), dec!(10000));

    broker.submit_order(Order::market("SPY", OrderSide::Sell, dec!(10)).unwrap()).unwrap();
    broker.process_price_sample(&quote(2, dec!(110), dec!(110))).unwrap();

    assert!(broker.get_position("SPY").is_none());
    assert!(broker.account().margin("SPY").is_none());
    // Realized P&L of 10 x 10 lands in available cash.
    assert_eq!(broker.account().available(&usd()).amount(), dec!(10100));
}
