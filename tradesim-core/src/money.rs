//! Money and currency value objects.
//!
//! `Money` is a decimal amount tagged with a `Currency`. Amounts are quantized
//! to the currency precision on construction and bounded to `±MONEY_MAX`.
//! Arithmetic between two amounts requires the same currency.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Largest absolute amount a `Money` may hold.
pub fn money_max() -> Decimal {
    Decimal::new(9_223_372_036, 0)
}

/// Highest supported currency precision (decimal places).
pub const MAX_PRECISION: u32 = 18;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },

    #[error("amount {amount} exceeds the allowed magnitude {max}")]
    OutOfRange { amount: Decimal, max: Decimal },

    #[error("currency {code}: precision {precision} is outside 0..={MAX_PRECISION}")]
    InvalidPrecision { code: String, precision: u32 },

    #[error("currency code must not be empty")]
    EmptyCode,

    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("currency {0} is already registered with a different definition")]
    ConflictingCurrency(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyKind {
    Fiat,
    Crypto,
    Commodity,
}

/// A currency definition: ISO-like code, precision and kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    code: String,
    precision: u32,
    kind: CurrencyKind,
}

impl Currency {
    pub fn new(code: impl Into<String>, precision: u32, kind: CurrencyKind) -> Result<Self, MoneyError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(MoneyError::EmptyCode);
        }
        if precision > MAX_PRECISION {
            return Err(MoneyError::InvalidPrecision { code, precision });
        }
        Ok(Self { code, precision, kind })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn kind(&self) -> CurrencyKind {
        self.kind
    }

    /// Round an amount to this currency's precision (banker's rounding).
    pub fn quantize(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.precision, RoundingStrategy::MidpointNearestEven)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Explicitly constructed currency registry.
///
/// Built once at startup and handed to whatever needs to resolve currency
/// codes (config loading, instrument setup). Lookups are read-only.
#[derive(Debug, Clone, Default)]
pub struct CurrencyRegistry {
    currencies: HashMap<String, Currency>,
}

impl CurrencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with a handful of common currencies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults = [
            ("USD", 2, CurrencyKind::Fiat),
            ("EUR", 2, CurrencyKind::Fiat),
            ("GBP", 2, CurrencyKind::Fiat),
            ("JPY", 0, CurrencyKind::Fiat),
            ("USDT", 8, CurrencyKind::Crypto),
            ("BTC", 8, CurrencyKind::Crypto),
            ("ETH", 8, CurrencyKind::Crypto),
        ];
        for (code, precision, kind) in defaults {
            if let Ok(currency) = Currency::new(code, precision, kind) {
                registry.currencies.insert(code.to_string(), currency);
            }
        }
        registry
    }

    /// Register a currency. Re-registering an identical definition is a no-op.
    pub fn register(&mut self, currency: Currency) -> Result<(), MoneyError> {
        match self.currencies.get(currency.code()) {
            Some(existing) if *existing != currency => {
                Err(MoneyError::ConflictingCurrency(currency.code().to_string()))
            }
            Some(_) => Ok(()),
            None => {
                self.currencies.insert(currency.code().to_string(), currency);
                Ok(())
            }
        }
    }

    pub fn get(&self, code: &str) -> Result<&Currency, MoneyError> {
        self.currencies
            .get(code)
            .ok_or_else(|| MoneyError::UnknownCurrency(code.to_string()))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.currencies.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

/// A currency-tagged decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        let amount = currency.quantize(amount);
        let max = money_max();
        if amount.abs() > max {
            return Err(MoneyError::OutOfRange { amount, max });
        }
        Ok(Self { amount, currency })
    }

    pub fn zero(currency: Currency) -> Self {
        Self { amount: Decimal::ZERO, currency }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn abs(&self) -> Self {
        Self { amount: self.amount.abs(), currency: self.currency.clone() }
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.same_currency(other)?;
        Money::new(self.amount + other.amount, self.currency.clone())
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.same_currency(other)?;
        Money::new(self.amount - other.amount, self.currency.clone())
    }

    /// Scale by a plain decimal factor, re-quantizing the result.
    pub fn scale(&self, factor: Decimal) -> Result<Money, MoneyError> {
        let amount = self.amount.checked_mul(factor).ok_or_else(|| MoneyError::OutOfRange {
            amount: self.amount,
            max: money_max(),
        })?;
        Money::new(amount, self.currency.clone())
    }

    fn same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency.code() != other.currency.code() {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.code().to_string(),
                right: other.currency.code().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.*} {}",
            self.currency.precision() as usize,
            self.amount,
            self.currency.code()
        )
    }
}
