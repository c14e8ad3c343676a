//! Seeded random-walk bar series for demos, benches and tests.

use super::source::IterFeed;
use super::FeedError;
use crate::domain::{Bar, BarPeriod, BarType, Event, Ohlcv};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct RandomWalkConfig {
    pub symbol: String,
    pub period: BarPeriod,
    /// Start of the first bar.
    pub start: DateTime<Utc>,
    pub count: usize,
    pub start_price: Decimal,
    /// Maximum per-bar return, e.g. 0.01 for ±1%.
    pub volatility: f64,
    pub volume: Decimal,
    pub seed: u64,
}

impl RandomWalkConfig {
    pub fn new(symbol: impl Into<String>, period: BarPeriod, start: DateTime<Utc>, count: usize) -> Self {
        Self {
            symbol: symbol.into(),
            period,
            start,
            count,
            start_price: Decimal::ONE_HUNDRED,
            volatility: 0.01,
            volume: Decimal::from(1_000),
            seed: 42,
        }
    }
}

struct RandomWalk {
    bar_type: BarType,
    config: RandomWalkConfig,
    rng: StdRng,
    index: usize,
    price: Decimal,
}

impl RandomWalk {
    fn draw(&mut self, bound: f64) -> Decimal {
        if bound <= 0.0 {
            return Decimal::ZERO;
        }
        let value: f64 = self.rng.gen_range(-bound..=bound);
        Decimal::from_f64(value).unwrap_or_default()
    }
}

impl Iterator for RandomWalk {
    type Item = Bar;

    fn next(&mut self) -> Option<Bar> {
        if self.index >= self.config.count {
            return None;
        }
        let floor = Decimal::new(1, 2);
        let open = self.price;
        let ret = self.draw(self.config.volatility);
        let close = (open * (Decimal::ONE + ret)).round_dp(2).max(floor);
        let wick = |this: &mut Self| (this.draw(this.config.volatility / 2.0).abs() * open).round_dp(2);
        let high = open.max(close) + wick(self);
        let low = (open.min(close) - wick(self)).max(floor).min(open.min(close));

        let period = self.config.period.duration();
        let start = self.config.start + period * i32::try_from(self.index).ok()?;
        let values = Ohlcv { open, high, low, close, volume: self.config.volume };
        let bar = Bar::new(self.bar_type.clone(), start, start + period, values).ok()?;

        self.index += 1;
        self.price = close;
        Some(bar)
    }
}

/// Deterministic bars: the same config always yields the same series.
pub fn random_walk_bars(config: RandomWalkConfig) -> Result<impl Iterator<Item = Bar>, FeedError> {
    if !config.volatility.is_finite() || config.volatility < 0.0 {
        return Err(FeedError::Source(format!("volatility must be finite and non-negative, got {}", config.volatility)));
    }
    if config.start_price <= Decimal::ZERO {
        return Err(FeedError::Source(format!("start price must be positive, got {}", config.start_price)));
    }
    Ok(RandomWalk {
        bar_type: BarType::new(config.symbol.clone(), config.period),
        rng: StdRng::seed_from_u64(config.seed),
        price: config.start_price,
        index: 0,
        config,
    })
}

/// The random walk as a feed of historical bar events.
pub fn random_walk_feed(config: RandomWalkConfig) -> Result<IterFeed<impl Iterator<Item = Event>>, FeedError> {
    let bars = random_walk_bars(config)?;
    Ok(IterFeed::new(bars.map(|bar| Event::bar(bar, true))))
}
