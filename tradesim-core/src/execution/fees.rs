//! Fee model — commission charged per execution.
//!
//! Commission is symmetric per side and computed on absolute notional in the
//! instrument's quote currency. A minimum fee, when set, floors every charge.

use crate::domain::{Instrument, OrderSide};
use crate::money::{Money, MoneyError};
use rust_decimal::Decimal;

pub trait FeeModel: Send + Sync {
    /// Fee for one execution, or `None` when nothing is charged.
    fn fee(
        &self,
        instrument: &Instrument,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Option<Money>, MoneyError>;

    /// Name of this model
    fn name(&self) -> &str;
}

/// Frictionless: never charges.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFee;

impl FeeModel for NoFee {
    fn fee(&self, _: &Instrument, _: OrderSide, _: Decimal, _: Decimal) -> Result<Option<Money>, MoneyError> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "no_fee"
    }
}

/// `percent` of notional (0.1 means 0.1%), floored at `min_fee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PercentageFee {
    pub percent: Decimal,
    pub min_fee: Option<Decimal>,
}

impl PercentageFee {
    pub fn new(percent: Decimal, min_fee: Option<Decimal>) -> Self {
        Self { percent, min_fee }
    }

    /// Commission in basis points per side (5 bps == 0.05%).
    pub fn from_bps(bps: Decimal) -> Self {
        Self::new(bps / Decimal::ONE_HUNDRED, None)
    }

    /// `commission = |notional| * percent / 100`, before the minimum.
    pub fn compute_commission(&self, instrument: &Instrument, quantity: Decimal, price: Decimal) -> Decimal {
        let raw = instrument.notional(quantity, price).abs() * self.percent / Decimal::ONE_HUNDRED;
        match self.min_fee {
            Some(min) => raw.max(min),
            None => raw,
        }
    }
}

impl FeeModel for PercentageFee {
    fn fee(
        &self,
        instrument: &Instrument,
        _side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Option<Money>, MoneyError> {
        let amount = self.compute_commission(instrument, quantity, price);
        if amount.is_zero() {
            return Ok(None);
        }
        Money::new(amount, instrument.quote_currency().clone()).map(Some)
    }

    fn name(&self) -> &str {
        "percentage"
    }
}
