//! Bar — OHLCV over a closed time interval.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("bar end {end} must be after start {start}")]
    EmptyInterval { start: DateTime<Utc>, end: DateTime<Utc> },

    #[error("bar high {high} is below {field} {value}")]
    HighTooLow { high: Decimal, field: &'static str, value: Decimal },

    #[error("bar low {low} is above {field} {value}")]
    LowTooHigh { low: Decimal, field: &'static str, value: Decimal },

    #[error("bar volume must be non-negative, got {0}")]
    NegativeVolume(Decimal),

    #[error("bar period value must be positive")]
    ZeroPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl BarUnit {
    fn seconds(self) -> i64 {
        match self {
            BarUnit::Second => 1,
            BarUnit::Minute => 60,
            BarUnit::Hour => 3_600,
            BarUnit::Day => 86_400,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            BarUnit::Second => "s",
            BarUnit::Minute => "m",
            BarUnit::Hour => "h",
            BarUnit::Day => "d",
        }
    }
}

/// Bar length, e.g. 5 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarPeriod {
    value: u32,
    unit: BarUnit,
}

impl BarPeriod {
    pub fn new(value: u32, unit: BarUnit) -> Result<Self, BarError> {
        if value == 0 {
            return Err(BarError::ZeroPeriod);
        }
        Ok(Self { value, unit })
    }

    pub fn minutes(value: u32) -> Result<Self, BarError> {
        Self::new(value, BarUnit::Minute)
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn unit(&self) -> BarUnit {
        self.unit
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(i64::from(self.value) * self.unit.seconds())
    }
}

impl fmt::Display for BarPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

/// Which price a bar samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    #[default]
    Last,
    Bid,
    Ask,
    Mid,
}

/// Identifies a bar series: symbol, period and sampled price.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarType {
    pub symbol: String,
    pub period: BarPeriod,
    pub price_type: PriceType,
}

impl BarType {
    pub fn new(symbol: impl Into<String>, period: BarPeriod) -> Self {
        Self { symbol: symbol.into(), period, price_type: PriceType::Last }
    }
}

impl fmt::Display for BarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{:?}", self.symbol, self.period, self.price_type)
    }
}

/// Raw OHLCV values, validated when turned into a `Bar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// OHLCV bar over `[start_dt, end_dt]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    bar_type: BarType,
    start_dt: DateTime<Utc>,
    end_dt: DateTime<Utc>,
    values: Ohlcv,
    is_partial: bool,
}

impl Bar {
    pub fn new(
        bar_type: BarType,
        start_dt: DateTime<Utc>,
        end_dt: DateTime<Utc>,
        values: Ohlcv,
    ) -> Result<Self, BarError> {
        Self::build(bar_type, start_dt, end_dt, values, false)
    }

    /// A bar built from fewer constituents than its period calls for.
    pub fn new_partial(
        bar_type: BarType,
        start_dt: DateTime<Utc>,
        end_dt: DateTime<Utc>,
        values: Ohlcv,
    ) -> Result<Self, BarError> {
        Self::build(bar_type, start_dt, end_dt, values, true)
    }

    fn build(
        bar_type: BarType,
        start_dt: DateTime<Utc>,
        end_dt: DateTime<Utc>,
        values: Ohlcv,
        is_partial: bool,
    ) -> Result<Self, BarError> {
        if end_dt <= start_dt {
            return Err(BarError::EmptyInterval { start: start_dt, end: end_dt });
        }
        let Ohlcv { open, high, low, close, volume } = values;
        for (field, value) in [("open", open), ("low", low), ("close", close)] {
            if high < value {
                return Err(BarError::HighTooLow { high, field, value });
            }
        }
        for (field, value) in [("open", open), ("close", close)] {
            if low > value {
                return Err(BarError::LowTooHigh { low, field, value });
            }
        }
        if volume < Decimal::ZERO {
            return Err(BarError::NegativeVolume(volume));
        }
        Ok(Self { bar_type, start_dt, end_dt, values, is_partial })
    }

    pub fn bar_type(&self) -> &BarType {
        &self.bar_type
    }

    pub fn symbol(&self) -> &str {
        &self.bar_type.symbol
    }

    pub fn start_dt(&self) -> DateTime<Utc> {
        self.start_dt
    }

    pub fn end_dt(&self) -> DateTime<Utc> {
        self.end_dt
    }

    pub fn open(&self) -> Decimal {
        self.values.open
    }

    pub fn high(&self) -> Decimal {
        self.values.high
    }

    pub fn low(&self) -> Decimal {
        self.values.low
    }

    pub fn close(&self) -> Decimal {
        self.values.close
    }

    pub fn volume(&self) -> Decimal {
        self.values.volume
    }

    pub fn values(&self) -> &Ohlcv {
        &self.values
    }

    pub fn is_partial(&self) -> bool {
        self.is_partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar_type() -> BarType {
        BarType::new("SPY", BarPeriod::minutes(1).unwrap())
    }

    fn t(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 14, min, 0).unwrap()
    }

    fn values(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Ohlcv {
        Ohlcv { open, high, low, close, volume: dec!(100) }
    }

    #[test]
    fn valid_bar_builds() {
        let bar = Bar::new(bar_type(), t(0), t(1), values(dec!(100), dec!(105), dec!(98), dec!(103))).unwrap();
        assert_eq!(bar.close(), dec!(103));
        assert_eq!(bar.symbol(), "SPY");
        assert!(!bar.is_partial());
    }

    #[test]
    fn rejects_inverted_interval() {
        let err = Bar::new(bar_type(), t(1), t(1), values(dec!(1), dec!(1), dec!(1), dec!(1))).unwrap_err();
        assert!(matches!(err, BarError::EmptyInterval { .. }));
    }

    #[test]
    fn rejects_high_below_close() {
        let err = Bar::new(bar_type(), t(0), t(1), values(dec!(100), dec!(101), dec!(98), dec!(102))).unwrap_err();
        assert!(matches!(err, BarError::HighTooLow { field: "close", .. }));
    }

    #[test]
    fn rejects_low_above_open() {
        let err = Bar::new(bar_type(), t(0), t(1), values(dec!(97), dec!(101), dec!(98), dec!(99))).unwrap_err();
        assert!(matches!(err, BarError::LowTooHigh { field: "open", .. }));
    }

    #[test]
    fn rejects_negative_volume() {
        let mut v = values(dec!(1), dec!(1), dec!(1), dec!(1));
        v.volume = dec!(-1);
        assert!(matches!(Bar::new(bar_type(), t(0), t(1), v), Err(BarError::NegativeVolume(_))));
    }

    #[test]
    fn period_duration_and_display() {
        let p = BarPeriod::new(5, BarUnit::Minute).unwrap();
        assert_eq!(p.duration(), Duration::minutes(5));
        assert_eq!(p.to_string(), "5m");
        assert!(BarPeriod::minutes(0).is_err());
    }
}
