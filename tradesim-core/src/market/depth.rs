//! Depth models: synthesize an order book from whatever price sample arrived.
//!
//! Bars, quotes and trades carry at most a top of book, so the broker asks a
//! `DepthModel` to turn them into ladders it can match against. Order book
//! samples pass through unchanged.

use super::order_book::{BookError, BookLevel, OrderBook};
use crate::domain::{Instrument, PriceSample, TickPolicy};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub trait DepthModel: Send + Sync {
    fn synthesize(
        &self,
        sample: &PriceSample<'_>,
        instrument: &Instrument,
        ts: DateTime<Utc>,
    ) -> Result<OrderBook, BookError>;

    /// Name of this model
    fn name(&self) -> &str;
}

/// Reference price of a sample without quoted sides: bar close or trade price.
fn reference_price(sample: &PriceSample<'_>) -> Option<Decimal> {
    match sample {
        PriceSample::Bar(bar) => Some(bar.close()),
        PriceSample::Trade(trade) => Some(trade.price),
        PriceSample::Quote(quote) => Some((quote.bid + quote.ask) / Decimal::TWO),
        PriceSample::Book(book) => book.mid_price(),
    }
}

/// One level per side at the sample price.
///
/// Quotes keep their own bid/ask and sizes (falling back to `volume` for a
/// zero size); bars and trades put both sides at the single observed price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroSpreadDepth {
    pub volume: Decimal,
}

impl ZeroSpreadDepth {
    pub fn new(volume: Decimal) -> Self {
        Self { volume }
    }

    /// Unlimited liquidity at the sample price.
    pub fn unlimited() -> Self {
        Self { volume: Decimal::MAX }
    }

    fn size_or_default(&self, size: Decimal) -> Decimal {
        if size > Decimal::ZERO {
            size
        } else {
            self.volume
        }
    }
}

impl Default for ZeroSpreadDepth {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl DepthModel for ZeroSpreadDepth {
    fn synthesize(
        &self,
        sample: &PriceSample<'_>,
        _instrument: &Instrument,
        ts: DateTime<Utc>,
    ) -> Result<OrderBook, BookError> {
        match sample {
            PriceSample::Book(book) => Ok((*book).clone()),
            PriceSample::Quote(quote) => OrderBook::new(
                quote.symbol.clone(),
                ts,
                vec![BookLevel::new(quote.bid, self.size_or_default(quote.bid_size))],
                vec![BookLevel::new(quote.ask, self.size_or_default(quote.ask_size))],
            ),
            PriceSample::Bar(_) | PriceSample::Trade(_) => {
                let price = reference_price(sample).ok_or_else(|| BookError::Synthesis {
                    symbol: sample.symbol().to_string(),
                    reason: "sample has no price".into(),
                })?;
                OrderBook::new(
                    sample.symbol(),
                    ts,
                    vec![BookLevel::new(price, self.volume)],
                    vec![BookLevel::new(price, self.volume)],
                )
            }
        }
    }

    fn name(&self) -> &str {
        "zero_spread"
    }
}

/// `levels` levels per side, one tick apart, starting `half_spread_ticks`
/// away from the reference price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderDepth {
    pub levels: usize,
    pub half_spread_ticks: u32,
    pub volume_per_level: Decimal,
}

impl LadderDepth {
    pub fn new(levels: usize, half_spread_ticks: u32, volume_per_level: Decimal) -> Self {
        Self { levels, half_spread_ticks, volume_per_level }
    }
}

impl DepthModel for LadderDepth {
    fn synthesize(
        &self,
        sample: &PriceSample<'_>,
        instrument: &Instrument,
        ts: DateTime<Utc>,
    ) -> Result<OrderBook, BookError> {
        if let PriceSample::Book(book) = sample {
            return Ok((*book).clone());
        }
        let symbol = sample.symbol().to_string();
        if self.levels == 0 {
            return Err(BookError::Synthesis { symbol, reason: "ladder needs at least one level".into() });
        }
        let reference = reference_price(sample).ok_or_else(|| BookError::Synthesis {
            symbol: symbol.clone(),
            reason: "sample has no price".into(),
        })?;
        let reference = instrument.round_price(reference, TickPolicy::RoundNearest);
        let tick = instrument.tick_size();
        let mut bids = Vec::with_capacity(self.levels);
        let mut asks = Vec::with_capacity(self.levels);
        for i in 0..self.levels {
            let offset = tick * Decimal::from(u64::from(self.half_spread_ticks) + i as u64);
            bids.push(BookLevel::new(reference - offset, self.volume_per_level));
            asks.push(BookLevel::new(reference + offset, self.volume_per_level));
        }
        OrderBook::new(symbol, ts, bids, asks)
    }

    fn name(&self) -> &str {
        "ladder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, BarPeriod, BarType, Ohlcv, QuoteTick};
    use crate::money::{Currency, CurrencyKind};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn spy() -> Instrument {
        Instrument::equity("SPY", Currency::new("USD", 2, CurrencyKind::Fiat).unwrap()).unwrap()
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
    }

    fn bar(close: Decimal) -> Bar {
        let values = Ohlcv { open: close, high: close, low: close, close, volume: dec!(1) };
        Bar::new(
            BarType::new("SPY", BarPeriod::minutes(1).unwrap()),
            ts() - chrono::Duration::minutes(1),
            ts(),
            values,
        )
        .unwrap()
    }

    #[test]
    fn zero_spread_bar_puts_both_sides_at_close() {
        let b = bar(dec!(100.50));
        let book = ZeroSpreadDepth::new(dec!(7)).synthesize(&PriceSample::Bar(&b), &spy(), ts()).unwrap();
        assert_eq!(book.best_bid(), Some(&BookLevel::new(dec!(100.50), dec!(7))));
        assert_eq!(book.best_ask(), Some(&BookLevel::new(dec!(100.50), dec!(7))));
        assert_eq!(book.spread(), Some(dec!(0)));
    }

    #[test]
    fn zero_spread_quote_keeps_quoted_sides() {
        let quote = QuoteTick {
            symbol: "SPY".into(),
            bid: dec!(99.99),
            ask: dec!(100.01),
            bid_size: dec!(3),
            ask_size: dec!(0),
        };
        let book = ZeroSpreadDepth::unlimited()
            .synthesize(&PriceSample::Quote(&quote), &spy(), ts())
            .unwrap();
        assert_eq!(book.best_bid().unwrap().volume, dec!(3));
        assert_eq!(book.best_ask().unwrap().volume, Decimal::MAX);
    }

    #[test]
    fn ladder_spaces_levels_by_tick() {
        let b = bar(dec!(100));
        let book = LadderDepth::new(3, 1, dec!(10)).synthesize(&PriceSample::Bar(&b), &spy(), ts()).unwrap();
        let asks: Vec<Decimal> = book.asks().iter().map(|l| l.price).collect();
        let bids: Vec<Decimal> = book.bids().iter().map(|l| l.price).collect();
        assert_eq!(asks, vec![dec!(100.01), dec!(100.02), dec!(100.03)]);
        assert_eq!(bids, vec![dec!(99.99), dec!(99.98), dec!(99.97)]);
    }

    #[test]
    fn book_samples_pass_through() {
        let book = OrderBook::new("SPY", ts(), vec![BookLevel::new(dec!(1), dec!(1))], vec![]).unwrap();
        let out = LadderDepth::new(2, 0, dec!(1)).synthesize(&PriceSample::Book(&book), &spy(), ts()).unwrap();
        assert_eq!(out, book);
    }
}
