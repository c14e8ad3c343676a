//! Matching dispatch: decide whether an order can trade against a book and
//! propose the fill slices it would take.
//!
//! Dispatch is an exhaustive match over `OrderKind`. A triggered stop behaves
//! as a market order and a triggered stop-limit as a limit order.

use crate::domain::{Order, OrderId, OrderKind, OrderSide, OrderState};
use crate::market::{BookLevel, FillSlice, OrderBook};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result of checking a price condition against a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Ok,
    NotOk,
    /// The side needed for the check is missing; retry on the next sample.
    CannotEvaluate,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchingError {
    #[error("order {order_id} cannot match in state {state:?}")]
    NotMatchable { order_id: OrderId, state: OrderState },
}

/// Proposed outcome for one order against one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Eligible; these slices are on offer (possibly empty if the band is dry).
    Fill(Vec<FillSlice>),
    NotEligible,
    CannotEvaluate,
}

/// BUY is marketable iff `best_ask <= limit`, SELL iff `best_bid >= limit`.
pub fn limit_eligibility(side: OrderSide, limit_price: Decimal, book: &OrderBook) -> Eligibility {
    match side {
        OrderSide::Buy => compare(book.best_ask(), |ask| ask <= limit_price),
        OrderSide::Sell => compare(book.best_bid(), |bid| bid >= limit_price),
    }
}

/// BUY stops trigger on `best_ask >= stop`, SELL stops on `best_bid <= stop`.
pub fn stop_triggered(side: OrderSide, stop_price: Decimal, book: &OrderBook) -> Eligibility {
    match side {
        OrderSide::Buy => compare(book.best_ask(), |ask| ask >= stop_price),
        OrderSide::Sell => compare(book.best_bid(), |bid| bid <= stop_price),
    }
}

fn compare(level: Option<&BookLevel>, condition: impl Fn(Decimal) -> bool) -> Eligibility {
    match level {
        None => Eligibility::CannotEvaluate,
        Some(level) if condition(level.price) => Eligibility::Ok,
        Some(_) => Eligibility::NotOk,
    }
}

/// Trigger check for an order waiting on its stop. Orders without a stop
/// price are never waiting.
pub fn check_trigger(order: &Order, book: &OrderBook) -> Eligibility {
    match *order.kind() {
        OrderKind::Stop { stop_price } | OrderKind::StopLimit { stop_price, .. } => {
            stop_triggered(order.side(), stop_price, book)
        }
        OrderKind::Market | OrderKind::Limit { .. } => Eligibility::Ok,
    }
}

/// Market-like orders take any price: market orders and triggered stops.
pub fn is_market_like(kind: &OrderKind) -> bool {
    matches!(kind, OrderKind::Market | OrderKind::Stop { .. })
}

/// Propose fills for a working order's unfilled quantity.
pub fn propose_fills(order: &Order, book: &OrderBook) -> Result<MatchOutcome, MatchingError> {
    if !matches!(order.state(), OrderState::Working | OrderState::PartiallyFilled) {
        return Err(MatchingError::NotMatchable { order_id: order.id(), state: order.state() });
    }
    let side = order.side();
    let quantity = order.unfilled_quantity();

    let outcome = match *order.kind() {
        OrderKind::Market | OrderKind::Stop { .. } => {
            MatchOutcome::Fill(book.simulate_fills(side, quantity, None, None))
        }
        OrderKind::Limit { limit_price } | OrderKind::StopLimit { limit_price, .. } => {
            match limit_eligibility(side, limit_price, book) {
                Eligibility::Ok => {
                    let (min, max) = match side {
                        OrderSide::Buy => (None, Some(limit_price)),
                        OrderSide::Sell => (Some(limit_price), None),
                    };
                    MatchOutcome::Fill(book.simulate_fills(side, quantity, min, max))
                }
                Eligibility::NotOk => MatchOutcome::NotEligible,
                Eligibility::CannotEvaluate => MatchOutcome::CannotEvaluate,
            }
        }
    };
    Ok(outcome)
}
