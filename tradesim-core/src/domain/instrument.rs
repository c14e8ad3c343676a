use super::order::OrderSide;
use crate::money::Currency;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tick/lot rounding policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    /// Reject values that aren't already aligned
    Reject,
    /// Round to nearest tick (midpoint away from zero)
    RoundNearest,
    /// Round down (more conservative for buys)
    RoundDown,
    /// Round up (more conservative for sells)
    RoundUp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Future,
    Forex,
    Crypto,
}

/// Instrument metadata: settlement currency, tick size, lot size, contract size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instrument {
    symbol: String,
    quote_currency: Currency,
    tick_size: Decimal,
    lot_size: Decimal,
    contract_size: Decimal,
    asset_class: AssetClass,
}

impl Instrument {
    pub fn new(
        symbol: impl Into<String>,
        quote_currency: Currency,
        tick_size: Decimal,
        lot_size: Decimal,
        contract_size: Decimal,
        asset_class: AssetClass,
    ) -> Result<Self, InstrumentError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(InstrumentError::EmptySymbol);
        }
        for (field, value) in [
            ("tick_size", tick_size),
            ("lot_size", lot_size),
            ("contract_size", contract_size),
        ] {
            if value <= Decimal::ZERO {
                return Err(InstrumentError::NonPositive { field, value });
            }
        }
        Ok(Self { symbol, quote_currency, tick_size, lot_size, contract_size, asset_class })
    }

    /// Cash equity: one-cent ticks, whole-share lots, contract size one.
    pub fn equity(symbol: impl Into<String>, quote_currency: Currency) -> Result<Self, InstrumentError> {
        Self::new(
            symbol,
            quote_currency,
            Decimal::new(1, 2),
            Decimal::ONE,
            Decimal::ONE,
            AssetClass::Equity,
        )
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn quote_currency(&self) -> &Currency {
        &self.quote_currency
    }

    pub fn tick_size(&self) -> Decimal {
        self.tick_size
    }

    pub fn lot_size(&self) -> Decimal {
        self.lot_size
    }

    pub fn contract_size(&self) -> Decimal {
        self.contract_size
    }

    pub fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    /// Notional value of `quantity` at `price`, in the quote currency.
    pub fn notional(&self, quantity: Decimal, price: Decimal) -> Decimal {
        quantity * price * self.contract_size
    }

    /// Round price according to policy. `Reject` leaves the price untouched.
    pub fn round_price(&self, price: Decimal, policy: TickPolicy) -> Decimal {
        snap(price, self.tick_size, policy)
    }

    /// Apply side-aware rounding (buy limits round down, sell limits round up)
    pub fn round_price_side_aware(&self, price: Decimal, side: OrderSide) -> Decimal {
        let policy = match side {
            OrderSide::Buy => TickPolicy::RoundDown,
            OrderSide::Sell => TickPolicy::RoundUp,
        };
        self.round_price(price, policy)
    }

    /// Validate price respects tick size
    pub fn validate_price(&self, price: Decimal, policy: TickPolicy) -> Result<Decimal, InstrumentError> {
        if policy == TickPolicy::Reject && !(price / self.tick_size).fract().is_zero() {
            return Err(InstrumentError::InvalidTickSize { price, tick_size: self.tick_size });
        }
        Ok(self.round_price(price, policy))
    }

    /// Validate quantity respects lot size
    pub fn validate_quantity(&self, quantity: Decimal, policy: TickPolicy) -> Result<Decimal, InstrumentError> {
        if policy == TickPolicy::Reject && !(quantity / self.lot_size).fract().is_zero() {
            return Err(InstrumentError::InvalidLotSize { quantity, lot_size: self.lot_size });
        }
        Ok(snap(quantity, self.lot_size, policy))
    }
}

fn snap(value: Decimal, step: Decimal, policy: TickPolicy) -> Decimal {
    let steps = value / step;
    let rounded = match policy {
        TickPolicy::RoundNearest => steps.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        TickPolicy::RoundDown => steps.floor(),
        TickPolicy::RoundUp => steps.ceil(),
        TickPolicy::Reject => return value,
    };
    (rounded * step).normalize()
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstrumentError {
    #[error("instrument symbol must not be empty")]
    EmptySymbol,

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: Decimal },

    #[error("Price {price} does not respect tick_size {tick_size}")]
    InvalidTickSize { price: Decimal, tick_size: Decimal },

    #[error("Quantity {quantity} does not respect lot_size {lot_size}")]
    InvalidLotSize { quantity: Decimal, lot_size: Decimal },
}
