//! Margin models: initial margin for new exposure, maintenance margin for the
//! net position. Amounts are in the instrument's quote currency.

use crate::domain::Instrument;
use crate::market::OrderBook;
use crate::money::{Money, MoneyError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarginError {
    #[error("{field} must be within [0, 1], got {value}")]
    InvalidRatio { field: &'static str, value: Decimal },

    #[error("book for {0} has no prices to margin against")]
    EmptyBook(String),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

pub trait MarginModel: Send + Sync {
    fn initial_margin(
        &self,
        book: &OrderBook,
        instrument: &Instrument,
        trade_quantity: Decimal,
        is_buy: bool,
        ts: DateTime<Utc>,
    ) -> Result<Money, MarginError>;

    fn maintenance_margin(
        &self,
        book: &OrderBook,
        instrument: &Instrument,
        net_position: Decimal,
        ts: DateTime<Utc>,
    ) -> Result<Money, MarginError>;

    /// Name of this model
    fn name(&self) -> &str;
}

/// Margin as a fixed fraction of notional at the book's reference price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRatioMarginModel {
    initial_ratio: Decimal,
    maintenance_ratio: Decimal,
}

impl FixedRatioMarginModel {
    pub fn new(initial_ratio: Decimal, maintenance_ratio: Decimal) -> Result<Self, MarginError> {
        for (field, value) in [("initial_ratio", initial_ratio), ("maintenance_ratio", maintenance_ratio)] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(MarginError::InvalidRatio { field, value });
            }
        }
        Ok(Self { initial_ratio, maintenance_ratio })
    }

    pub fn initial_ratio(&self) -> Decimal {
        self.initial_ratio
    }

    pub fn maintenance_ratio(&self) -> Decimal {
        self.maintenance_ratio
    }

    fn requirement(
        &self,
        ratio: Decimal,
        book: &OrderBook,
        instrument: &Instrument,
        quantity: Decimal,
    ) -> Result<Money, MarginError> {
        let price = reference_price(book)?;
        let amount = (instrument.notional(quantity, price) * ratio).abs();
        Ok(Money::new(amount, instrument.quote_currency().clone())?)
    }
}

/// Mid when both sides exist, else whichever side is present.
fn reference_price(book: &OrderBook) -> Result<Decimal, MarginError> {
    match (book.best_bid(), book.best_ask()) {
        (Some(bid), Some(ask)) => Ok((bid.price + ask.price) / Decimal::TWO),
        (Some(only), None) | (None, Some(only)) => Ok(only.price),
        (None, None) => Err(MarginError::EmptyBook(book.symbol().to_string())),
    }
}

impl MarginModel for FixedRatioMarginModel {
    fn initial_margin(
        &self,
        book: &OrderBook,
        instrument: &Instrument,
        trade_quantity: Decimal,
        _is_buy: bool,
        _ts: DateTime<Utc>,
    ) -> Result<Money, MarginError> {
        self.requirement(self.initial_ratio, book, instrument, trade_quantity)
    }

    fn maintenance_margin(
        &self,
        book: &OrderBook,
        instrument: &Instrument,
        net_position: Decimal,
        _ts: DateTime<Utc>,
    ) -> Result<Money, MarginError> {
        self.requirement(self.maintenance_ratio, book, instrument, net_position)
    }

    fn name(&self) -> &str {
        "fixed_ratio"
    }
}
