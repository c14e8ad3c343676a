//! Account ledger: available money per currency, margin per symbol, fee log.
//!
//! Every mutation is a paired move between available money and a margin
//! bucket, except deposits, fees, notional settlement and realized P&L, which
//! enter or leave the ledger. `available + Σ margins` per currency is therefore
//! conserved by margin blocking, releasing and re-sizing.

use super::ids::{ExecutionId, OrderId};
use crate::money::{Currency, Money, MoneyError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccountError {
    #[error("insufficient {currency}: required {required}, available {available}")]
    InsufficientFunds { currency: String, required: Decimal, available: Decimal },

    #[error("ledger amounts must be non-negative, got {0}")]
    NegativeAmount(Decimal),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Margin held against one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginEntry {
    pub initial: Money,
    pub maintenance: Money,
}

impl MarginEntry {
    fn zero(currency: &Currency) -> Self {
        Self { initial: Money::zero(currency.clone()), maintenance: Money::zero(currency.clone()) }
    }

    fn is_zero(&self) -> bool {
        self.initial.is_zero() && self.maintenance.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub order_id: OrderId,
    pub execution_id: ExecutionId,
    pub amount: Money,
}

#[derive(Debug, Clone, Default)]
pub struct Account {
    available: BTreeMap<String, Money>,
    margins: BTreeMap<String, MarginEntry>,
    fees: Vec<FeeRecord>,
}

impl Account {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&mut self, amount: &Money) -> Result<(), AccountError> {
        self.add_available_money(amount)
    }

    /// Available money in `currency` (zero if never funded).
    pub fn available(&self, currency: &Currency) -> Money {
        self.available
            .get(currency.code())
            .cloned()
            .unwrap_or_else(|| Money::zero(currency.clone()))
    }

    pub fn margin(&self, symbol: &str) -> Option<&MarginEntry> {
        self.margins.get(symbol)
    }

    pub fn fees(&self) -> &[FeeRecord] {
        &self.fees
    }

    pub fn add_available_money(&mut self, amount: &Money) -> Result<(), AccountError> {
        non_negative(amount)?;
        let updated = self.available(amount.currency()).checked_add(amount)?;
        self.available.insert(amount.currency().code().to_string(), updated);
        Ok(())
    }

    /// Take money out of the available balance; never lets it go negative.
    pub fn subtract_available_money(&mut self, amount: &Money) -> Result<(), AccountError> {
        non_negative(amount)?;
        let current = self.available(amount.currency());
        if current.amount() < amount.amount() {
            return Err(AccountError::InsufficientFunds {
                currency: amount.currency().code().to_string(),
                required: amount.amount(),
                available: current.amount(),
            });
        }
        let updated = current.checked_sub(amount)?;
        self.available.insert(amount.currency().code().to_string(), updated);
        Ok(())
    }

    /// Move `amount` from available into the symbol's initial margin.
    pub fn block_initial_margin(&mut self, symbol: &str, amount: &Money) -> Result<(), AccountError> {
        self.subtract_available_money(amount)?;
        let entry = self
            .margins
            .entry(symbol.to_string())
            .or_insert_with(|| MarginEntry::zero(amount.currency()));
        entry.initial = entry.initial.checked_add(amount)?;
        Ok(())
    }

    /// Return the symbol's whole initial margin to available.
    pub fn release_initial_margin(&mut self, symbol: &str) -> Result<(), AccountError> {
        let Some(entry) = self.margins.get_mut(symbol) else {
            return Ok(());
        };
        let released = entry.initial.clone();
        entry.initial = Money::zero(released.currency().clone());
        self.add_available_money(&released)?;
        self.drop_empty_margin(symbol);
        Ok(())
    }

    /// Re-size the symbol's maintenance margin, moving the difference between
    /// available and margin.
    pub fn set_maintenance_margin(&mut self, symbol: &str, amount: &Money) -> Result<(), AccountError> {
        non_negative(amount)?;
        let current = self
            .margins
            .get(symbol)
            .map(|m| m.maintenance.clone())
            .unwrap_or_else(|| Money::zero(amount.currency().clone()));
        let delta = amount.checked_sub(&current)?;
        if delta.is_negative() {
            self.add_available_money(&delta.abs())?;
        } else if !delta.is_zero() {
            self.subtract_available_money(&delta)?;
        }
        let entry = self
            .margins
            .entry(symbol.to_string())
            .or_insert_with(|| MarginEntry::zero(amount.currency()));
        entry.maintenance = amount.clone();
        self.drop_empty_margin(symbol);
        Ok(())
    }

    /// Charge a fee against available money and log it.
    pub fn pay_fee(&mut self, record: FeeRecord) -> Result<(), AccountError> {
        self.subtract_available_money(&record.amount)?;
        self.fees.push(record);
        Ok(())
    }

    /// Available plus every margin bucket held in `currency`.
    pub fn total(&self, currency: &Currency) -> Decimal {
        let margins: Decimal = self
            .margins
            .values()
            .filter(|m| m.initial.currency().code() == currency.code())
            .map(|m| m.initial.amount() + m.maintenance.amount())
            .sum();
        self.available(currency).amount() + margins
    }

    pub fn snapshot(&self) -> AccountInfo {
        let mut total_fees: BTreeMap<String, Money> = BTreeMap::new();
        for fee in &self.fees {
            let code = fee.amount.currency().code().to_string();
            let running = total_fees
                .get(&code)
                .cloned()
                .unwrap_or_else(|| Money::zero(fee.amount.currency().clone()));
            // Fees were validated when paid; a sum that overflows is dropped from the summary.
            if let Ok(sum) = running.checked_add(&fee.amount) {
                total_fees.insert(code, sum);
            }
        }
        AccountInfo {
            available: self.available.clone(),
            margins: self.margins.clone(),
            total_fees,
            fee_count: self.fees.len(),
        }
    }

    fn drop_empty_margin(&mut self, symbol: &str) {
        if self.margins.get(symbol).is_some_and(MarginEntry::is_zero) {
            self.margins.remove(symbol);
        }
    }
}

fn non_negative(amount: &Money) -> Result<(), AccountError> {
    if amount.is_negative() {
        return Err(AccountError::NegativeAmount(amount.amount()));
    }
    Ok(())
}

/// Read-only account snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub available: BTreeMap<String, Money>,
    pub margins: BTreeMap<String, MarginEntry>,
    pub total_fees: BTreeMap<String, Money>,
    pub fee_count: usize,
}
