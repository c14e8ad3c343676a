//! Read-only order book snapshot and the fill walk over it.

use crate::domain::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookError {
    #[error("{side} level {index} has non-positive volume {volume}")]
    NonPositiveVolume { side: &'static str, index: usize, volume: Decimal },

    #[error("{side} level {index} at {price} is not worse than the level before it")]
    NotBestFirst { side: &'static str, index: usize, price: Decimal },

    #[error("cannot build a book for {symbol}: {reason}")]
    Synthesis { symbol: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub volume: Decimal,
}

impl BookLevel {
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

/// A proposed or accepted piece of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillSlice {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Bid/ask ladders for one symbol at one instant, best level first.
///
/// Prices may be negative (spreads, some energy contracts); volumes may not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    symbol: String,
    timestamp: DateTime<Utc>,
    bids: Vec<BookLevel>,
    asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
    ) -> Result<Self, BookError> {
        validate_ladder("bid", &bids, |prev, next| next < prev)?;
        validate_ladder("ask", &asks, |prev, next| next > prev)?;
        Ok(Self { symbol: symbol.into(), timestamp, bids, asks })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn bids(&self) -> &[BookLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[BookLevel] {
        &self.asks
    }

    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        Some((self.best_ask()?.price + self.best_bid()?.price) / Decimal::TWO)
    }

    /// Walk the ladder an order on `side` would take from (asks for a buy,
    /// bids for a sell), best price first, until `target_quantity` is met.
    /// Levels priced outside `[min_price, max_price]` are skipped.
    pub fn simulate_fills(
        &self,
        side: OrderSide,
        target_quantity: Decimal,
        min_price: Option<Decimal>,
        max_price: Option<Decimal>,
    ) -> Vec<FillSlice> {
        let ladder = match side {
            OrderSide::Buy => &self.asks,
            OrderSide::Sell => &self.bids,
        };
        let mut remaining = target_quantity;
        let mut slices = Vec::new();
        for level in ladder {
            if remaining <= Decimal::ZERO {
                break;
            }
            let below = min_price.is_some_and(|min| level.price < min);
            let above = max_price.is_some_and(|max| level.price > max);
            if below || above {
                continue;
            }
            let quantity = remaining.min(level.volume);
            slices.push(FillSlice { price: level.price, quantity });
            remaining -= quantity;
        }
        slices
    }

    /// Remove `quantity` from the ladder an order on `side` takes from, best
    /// level first. Emptied levels are dropped.
    pub fn take(&mut self, side: OrderSide, quantity: Decimal) {
        let ladder = match side {
            OrderSide::Buy => &mut self.asks,
            OrderSide::Sell => &mut self.bids,
        };
        let mut remaining = quantity;
        while remaining > Decimal::ZERO {
            let Some(level) = ladder.first_mut() else {
                break;
            };
            if level.volume > remaining {
                level.volume -= remaining;
                break;
            }
            remaining -= level.volume;
            ladder.remove(0);
        }
    }
}

fn validate_ladder(
    side: &'static str,
    levels: &[BookLevel],
    worse: impl Fn(Decimal, Decimal) -> bool,
) -> Result<(), BookError> {
    for (index, level) in levels.iter().enumerate() {
        if level.volume <= Decimal::ZERO {
            return Err(BookError::NonPositiveVolume { side, index, volume: level.volume });
        }
        if index > 0 && !worse(levels[index - 1].price, level.price) {
            return Err(BookError::NotBestFirst { side, index, price: level.price });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
    }

    fn book() -> OrderBook {
        OrderBook::new(
            "SPY",
            ts(),
            vec![BookLevel::new(dec!(99), dec!(10)), BookLevel::new(dec!(98), dec!(20))],
            vec![
                BookLevel::new(dec!(100), dec!(5)),
                BookLevel::new(dec!(101), dec!(3)),
                BookLevel::new(dec!(102), dec!(10)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn top_of_book() {
        let b = book();
        assert_eq!(b.best_bid().unwrap().price, dec!(99));
        assert_eq!(b.best_ask().unwrap().price, dec!(100));
        assert_eq!(b.spread(), Some(dec!(1)));
        assert_eq!(b.mid_price(), Some(dec!(99.5)));
    }

    #[test]
    fn walk_consumes_levels_in_order() {
        let slices = book().simulate_fills(OrderSide::Buy, dec!(10), None, None);
        assert_eq!(
            slices,
            vec![
                FillSlice { price: dec!(100), quantity: dec!(5) },
                FillSlice { price: dec!(101), quantity: dec!(3) },
                FillSlice { price: dec!(102), quantity: dec!(2) },
            ]
        );
    }

    #[test]
    fn take_depletes_best_levels_first() {
        let mut b = book();
        b.take(OrderSide::Buy, dec!(6));
        assert_eq!(b.asks(), [BookLevel::new(dec!(101), dec!(2)), BookLevel::new(dec!(102), dec!(10))]);
        b.take(OrderSide::Sell, dec!(30));
        assert!(b.bids().is_empty());
        assert_eq!(b.best_ask().unwrap().price, dec!(101));
    }

    #[test]
    fn walk_respects_price_band() {
        let slices = book().simulate_fills(OrderSide::Buy, dec!(10), None, Some(dec!(101)));
        let total: Decimal = slices.iter().map(|s| s.quantity).sum();
        assert_eq!(total, dec!(8));

        let slices = book().simulate_fills(OrderSide::Sell, dec!(25), Some(dec!(98.5)), None);
        assert_eq!(slices, vec![FillSlice { price: dec!(99), quantity: dec!(10) }]);
    }

    #[test]
    fn walk_is_pure() {
        let b = book();
        let first = b.simulate_fills(OrderSide::Sell, dec!(12), None, None);
        let second = b.simulate_fills(OrderSide::Sell, dec!(12), None, None);
        assert_eq!(first, second);
        assert_eq!(b, book());
    }

    #[test]
    fn rejects_bad_ladders() {
        let err = OrderBook::new("X", ts(), vec![BookLevel::new(dec!(1), dec!(0))], vec![]).unwrap_err();
        assert!(matches!(err, BookError::NonPositiveVolume { side: "bid", .. }));
        let err = OrderBook::new(
            "X",
            ts(),
            vec![],
            vec![BookLevel::new(dec!(2), dec!(1)), BookLevel::new(dec!(1), dec!(1))],
        )
        .unwrap_err();
        assert!(matches!(err, BookError::NotBestFirst { side: "ask", index: 1, .. }));
    }

    #[test]
    fn negative_prices_are_valid() {
        let b = OrderBook::new(
            "CL-SPREAD",
            ts(),
            vec![BookLevel::new(dec!(-1.5), dec!(1))],
            vec![BookLevel::new(dec!(-1.25), dec!(1))],
        )
        .unwrap();
        assert_eq!(b.mid_price(), Some(dec!(-1.375)));
    }

    #[test]
    fn one_sided_book_has_no_mid() {
        let b = OrderBook::new("X", ts(), vec![], vec![BookLevel::new(dec!(5), dec!(1))]).unwrap();
        assert!(b.mid_price().is_none());
        assert!(b.simulate_fills(OrderSide::Sell, dec!(1), None, None).is_empty());
    }
}
