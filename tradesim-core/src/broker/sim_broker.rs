//! Simulated broker — matches open orders against books synthesized from
//! incoming price samples.
//!
//! Per sample, for the sample's symbol:
//! 1. Drop the sample if it is older than the last one seen for the symbol
//! 2. Synthesize a book with the depth model, or reuse what is left of the
//!    book already matched at this instant
//! 3. Walk open orders in submission order: expiry, trigger, matching,
//!    fill policy, then settle each accepted slice
//!
//! Settlement of a slice is staged on copies of the position and account and
//! committed only when every ledger move succeeded.

use super::order_registry::{OrderRegistry, RegistryError};
use super::{Broker, BrokerCallbacks, BrokerError, OrderUpdate};
use crate::domain::{
    Account, AccountError, AccountInfo, Event, Execution, FeeRecord, Instrument, Order, OrderAction, OrderAmendment,
    OrderId, OrderState, Position, TickPolicy, TimeInForce,
};
use crate::execution::{
    check_trigger, propose_fills, Eligibility, FeeModel, FillModel, MarginModel, MatchOutcome, NoFee,
    PassThroughFillModel,
};
use crate::market::{DepthModel, FillSlice, OrderBook, ZeroSpreadDepth};
use crate::money::{Currency, Money};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

pub struct SimBroker {
    name: String,
    connected: bool,
    callbacks: Option<BrokerCallbacks>,
    current_time: Option<DateTime<Utc>>,
    instruments: HashMap<String, Instrument>,
    registry: OrderRegistry,
    positions: BTreeMap<String, Position>,
    account: Account,
    last_sample_at: HashMap<String, DateTime<Utc>>,
    last_books: HashMap<String, OrderBook>,
    /// Liquidity left in each symbol's book at its latest instant.
    remaining: HashMap<String, (DateTime<Utc>, OrderBook)>,
    executions: Vec<Execution>,
    depth_model: Box<dyn DepthModel>,
    fill_model: Box<dyn FillModel>,
    margin_model: Option<Box<dyn MarginModel>>,
    fee_model: Box<dyn FeeModel>,
}

impl fmt::Debug for SimBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimBroker")
            .field("name", &self.name)
            .field("connected", &self.connected)
            .field("current_time", &self.current_time)
            .field("depth_model", &self.depth_model.name())
            .field("fill_model", &self.fill_model.name())
            .field("fee_model", &self.fee_model.name())
            .field("margin_model", &self.margin_model.as_ref().map(|m| m.name()))
            .field("open_orders", &self.registry.active_orders().len())
            .finish_non_exhaustive()
    }
}

impl SimBroker {
    /// Frictionless broker: unlimited zero-spread depth, pass-through fills,
    /// cash settlement, no fees.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: false,
            callbacks: None,
            current_time: None,
            instruments: HashMap::new(),
            registry: OrderRegistry::new(),
            positions: BTreeMap::new(),
            account: Account::new(),
            last_sample_at: HashMap::new(),
            last_books: HashMap::new(),
            remaining: HashMap::new(),
            executions: Vec::new(),
            depth_model: Box::new(ZeroSpreadDepth::unlimited()),
            fill_model: Box::new(PassThroughFillModel),
            margin_model: None,
            fee_model: Box::new(NoFee),
        }
    }

    pub fn with_depth_model(mut self, model: impl DepthModel + 'static) -> Self {
        self.depth_model = Box::new(model);
        self
    }

    pub fn with_fill_model(mut self, model: impl FillModel + 'static) -> Self {
        self.fill_model = Box::new(model);
        self
    }

    /// Settle fills against margin instead of cash.
    pub fn with_margin_model(mut self, model: impl MarginModel + 'static) -> Self {
        self.margin_model = Some(Box::new(model));
        self
    }

    pub fn with_fee_model(mut self, model: impl FeeModel + 'static) -> Self {
        self.fee_model = Box::new(model);
        self
    }

    pub fn deposit(&mut self, amount: &Money) -> Result<(), BrokerError> {
        self.account.deposit(amount)?;
        Ok(())
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn registry(&self) -> &OrderRegistry {
        &self.registry
    }

    /// The book synthesized from the last accepted sample for `symbol`.
    pub fn last_book(&self, symbol: &str) -> Option<&OrderBook> {
        self.last_books.get(symbol)
    }

    /// Open P&L of `symbol` marked at the last book's mid (or its only side).
    pub fn unrealized_pnl(&self, symbol: &str) -> Option<Decimal> {
        let position = self.positions.get(symbol)?;
        let instrument = self.instruments.get(symbol)?;
        let book = self.last_books.get(symbol)?;
        let mark = book
            .mid_price()
            .or_else(|| book.best_bid().or(book.best_ask()).map(|level| level.price))?;
        Some(position.unrealized_pnl(mark, instrument.contract_size()))
    }

    // ── Internal helpers ───────────────────────────────────────────────

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::NotConnected(self.name.clone()))
        }
    }

    fn validate_order(&self, order: &Order) -> Result<(), BrokerError> {
        let instrument = self
            .instruments
            .get(order.symbol())
            .ok_or_else(|| BrokerError::UnknownInstrument(order.symbol().to_string()))?;
        validate_against(instrument, order.quantity(), order.kind().limit_price(), order.kind().stop_price())
    }

    fn apply(
        &mut self,
        id: OrderId,
        action: OrderAction,
        ts: Option<DateTime<Utc>>,
        reason: &str,
    ) -> Result<Option<OrderUpdate>, BrokerError> {
        let update = self.registry.apply(id, action, ts, reason)?;
        if let Some(update) = &update {
            debug!(order_id = %id, from = ?update.from, to = ?update.to, "order transition");
        }
        Ok(update)
    }

    /// Apply an action and publish the update if the state changed.
    fn transition(
        &mut self,
        id: OrderId,
        action: OrderAction,
        ts: Option<DateTime<Utc>>,
        reason: &str,
    ) -> Result<(), BrokerError> {
        if let Some(update) = self.apply(id, action, ts, reason)? {
            self.publish_update(&update);
        }
        Ok(())
    }

    fn publish_update(&mut self, update: &OrderUpdate) {
        if let Some(callbacks) = self.callbacks.as_mut() {
            (callbacks.on_order_updated)(update);
        }
    }

    fn publish_execution(&mut self, execution: &Execution) {
        if let Some(callbacks) = self.callbacks.as_mut() {
            (callbacks.on_execution)(execution);
        }
    }

    fn process_order(
        &mut self,
        id: OrderId,
        instrument: &Instrument,
        book: &mut OrderBook,
        ts: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        let Some(order) = self.registry.get(id) else {
            return Ok(());
        };
        let side = order.side();
        let filled_before = order.filled_quantity();

        if let TimeInForce::GoodTillDate(expiry) = order.time_in_force() {
            if ts >= expiry {
                return self.transition(id, OrderAction::Expire, Some(ts), "good-till-date reached");
            }
        }

        if order.state() == OrderState::TriggerPending {
            match check_trigger(order, book) {
                Eligibility::Ok => {
                    self.transition(id, OrderAction::Trigger, Some(ts), "stop price reached")?;
                    self.transition(id, OrderAction::Activate, Some(ts), "")?;
                }
                Eligibility::NotOk | Eligibility::CannotEvaluate => return Ok(()),
            }
        }

        let Some(order) = self.registry.get(id) else {
            return Ok(());
        };
        let proposed = match propose_fills(order, book)? {
            MatchOutcome::Fill(slices) => slices,
            MatchOutcome::NotEligible => Vec::new(),
            MatchOutcome::CannotEvaluate => {
                debug!(order_id = %id, "book side missing, retrying on next sample");
                return Ok(());
            }
        };
        let accepted = self.fill_model.apply_fill_policy(order, instrument, book, proposed);
        let settled = self.settle_slices(id, instrument, book, accepted, ts);
        let filled_now = self.registry.get(id).map_or(filled_before, Order::filled_quantity) - filled_before;
        book.take(side, filled_now);
        settled?;

        let ioc_remainder = self
            .registry
            .get(id)
            .is_some_and(|o| o.is_open() && o.time_in_force() == TimeInForce::ImmediateOrCancel);
        if ioc_remainder {
            self.transition(id, OrderAction::Cancel, Some(ts), "immediate-or-cancel remainder")?;
        }
        Ok(())
    }

    /// Settle accepted slices in order until the order closes or the ledger
    /// refuses one.
    fn settle_slices(
        &mut self,
        id: OrderId,
        instrument: &Instrument,
        book: &OrderBook,
        accepted: Vec<FillSlice>,
        ts: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        for slice in accepted {
            let unfilled = match self.registry.get(id) {
                Some(order) if order.is_open() => order.unfilled_quantity(),
                _ => break,
            };
            let quantity = slice.quantity.min(unfilled);
            if quantity <= Decimal::ZERO {
                break;
            }
            match self.settle_fill(id, instrument, book, slice.price, quantity, ts) {
                Ok(()) => {}
                Err(BrokerError::Account(err @ AccountError::InsufficientFunds { .. })) => {
                    warn!(order_id = %id, error = %err, "fill rejected by the ledger, cancelling order");
                    return self.transition(id, OrderAction::Cancel, Some(ts), &err.to_string());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Settle one slice. Nothing is committed unless every step succeeds.
    fn settle_fill(
        &mut self,
        id: OrderId,
        instrument: &Instrument,
        book: &OrderBook,
        price: Decimal,
        quantity: Decimal,
        ts: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        let order = self.registry.get(id).ok_or(RegistryError::OrderNotFound(id))?;
        let side = order.side();
        let symbol = instrument.symbol();
        let currency = instrument.quote_currency();
        let commission = self.fee_model.fee(instrument, side, quantity, price)?;
        let execution = Execution::new(order, quantity, price, ts, commission.clone())?;

        // Stage
        let mut position = self.positions.get(symbol).cloned().unwrap_or_else(|| Position::flat(symbol, ts));
        let mut account = self.account.clone();
        let increasing = position.increasing_quantity(side, quantity);
        let realized = position.apply_fill(side, quantity, price, instrument.contract_size(), ts);

        match &self.margin_model {
            Some(margin) => {
                if increasing > Decimal::ZERO {
                    let initial = margin.initial_margin(book, instrument, increasing, side.is_buy(), ts)?;
                    account.block_initial_margin(symbol, &initial)?;
                }
                settle_cash(&mut account, realized, currency)?;
                account.release_initial_margin(symbol)?;
                let maintenance = margin.maintenance_margin(book, instrument, position.quantity(), ts)?;
                account.set_maintenance_margin(symbol, &maintenance)?;
            }
            None => {
                let cash = -side.sign() * instrument.notional(quantity, price);
                settle_cash(&mut account, cash, currency)?;
            }
        }
        if let Some(fee) = &commission {
            account.pay_fee(FeeRecord {
                timestamp: ts,
                symbol: symbol.to_string(),
                order_id: id,
                execution_id: execution.id(),
                amount: fee.clone(),
            })?;
        }
        self.registry.record_execution(execution.clone())?;

        // Commit
        self.account = account;
        if position.is_flat() {
            self.positions.remove(symbol);
        } else {
            self.positions.insert(symbol.to_string(), position);
        }
        self.executions.push(execution.clone());

        let action = match self.registry.get(id) {
            Some(order) if order.is_fully_filled() => OrderAction::Fill,
            _ => OrderAction::PartialFill,
        };
        let update = self.apply(id, action, Some(ts), "")?;
        debug!(order_id = %id, %quantity, %price, "execution");
        self.publish_execution(&execution);
        if let Some(update) = update {
            self.publish_update(&update);
        }
        Ok(())
    }
}

/// Check quantity and prices sit on the instrument's lot and tick grid.
fn validate_against(
    instrument: &Instrument,
    quantity: Decimal,
    limit_price: Option<Decimal>,
    stop_price: Option<Decimal>,
) -> Result<(), BrokerError> {
    instrument.validate_quantity(quantity, TickPolicy::Reject)?;
    for price in [limit_price, stop_price].into_iter().flatten() {
        instrument.validate_price(price, TickPolicy::Reject)?;
    }
    Ok(())
}

/// Credit a positive amount, debit a negative one.
fn settle_cash(account: &mut Account, amount: Decimal, currency: &Currency) -> Result<(), BrokerError> {
    let money = Money::new(amount.abs(), currency.clone())?;
    if money.is_zero() {
        return Ok(());
    }
    if amount > Decimal::ZERO {
        account.add_available_money(&money)?;
    } else {
        account.subtract_available_money(&money)?;
    }
    Ok(())
}

impl Broker for SimBroker {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<(), BrokerError> {
        if !self.connected {
            info!(
                broker = %self.name,
                depth = self.depth_model.name(),
                fills = self.fill_model.name(),
                fees = self.fee_model.name(),
                margin = self.margin_model.as_ref().map(|m| m.name()).unwrap_or("cash"),
                "broker connected"
            );
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            info!(broker = %self.name, "broker disconnected");
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_callbacks(&mut self, callbacks: BrokerCallbacks) {
        self.callbacks = Some(callbacks);
    }

    fn set_current_time(&mut self, now: DateTime<Utc>) {
        self.current_time = Some(now);
    }

    fn register_instrument(&mut self, instrument: Instrument) -> Result<(), BrokerError> {
        debug!(broker = %self.name, symbol = instrument.symbol(), "instrument registered");
        self.instruments.insert(instrument.symbol().to_string(), instrument);
        Ok(())
    }

    fn instrument(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments.get(symbol)
    }

    fn submit_order(&mut self, order: Order) -> Result<OrderId, BrokerError> {
        self.ensure_connected()?;
        let id = order.id();
        if self.registry.contains(id) {
            return Err(RegistryError::DuplicateOrder(id).into());
        }
        let validation = self.validate_order(&order);
        let needs_trigger = order.kind().needs_trigger();
        self.registry.insert(order)?;

        let ts = self.current_time;
        if let Err(err) = validation {
            warn!(order_id = %id, error = %err, "order rejected");
            self.transition(id, OrderAction::Reject, ts, &err.to_string())?;
            return Err(err);
        }
        self.transition(id, OrderAction::Submit, ts, "")?;
        self.transition(id, OrderAction::Acknowledge, ts, "")?;
        if needs_trigger {
            self.transition(id, OrderAction::Arm, ts, "")?;
        } else {
            self.transition(id, OrderAction::Activate, ts, "")?;
        }
        Ok(id)
    }

    fn cancel_order(&mut self, order_id: OrderId) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        let order = self.registry.get(order_id).ok_or(RegistryError::OrderNotFound(order_id))?;
        if !order.is_open() {
            return Err(RegistryError::OrderNotOpen(order_id, order.state()).into());
        }
        self.transition(order_id, OrderAction::Cancel, self.current_time, "cancelled on request")
    }

    fn modify_order(&mut self, order_id: OrderId, amendment: OrderAmendment) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        let order = self.registry.get(order_id).ok_or(RegistryError::OrderNotFound(order_id))?;
        if let Some(instrument) = self.instruments.get(order.symbol()) {
            let quantity = amendment.quantity.unwrap_or(order.quantity());
            validate_against(instrument, quantity, amendment.limit_price, amendment.stop_price)?;
        }
        self.registry.amend(order_id, &amendment)?;
        info!(order_id = %order_id, ?amendment, "order modified");
        Ok(())
    }

    fn get_order(&self, order_id: OrderId) -> Option<&Order> {
        self.registry.get(order_id)
    }

    fn list_active_orders(&self) -> Vec<&Order> {
        self.registry.active_orders()
    }

    fn list_open_positions(&self) -> Vec<&Position> {
        self.positions.values().collect()
    }

    fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    fn get_account_info(&self) -> AccountInfo {
        self.account.snapshot()
    }

    fn executions(&self) -> &[Execution] {
        &self.executions
    }

    fn process_price_sample(&mut self, event: &Event) -> Result<(), BrokerError> {
        let Some(sample) = event.price_sample() else {
            return Ok(());
        };
        self.ensure_connected()?;
        let symbol = sample.symbol().to_string();
        let ts = event.dt_event();

        if let Some(&last) = self.last_sample_at.get(&symbol) {
            if ts < last {
                warn!(broker = %self.name, %symbol, %ts, %last, "stale price sample skipped");
                return Ok(());
            }
        }
        self.last_sample_at.insert(symbol.clone(), ts);

        let Some(instrument) = self.instruments.get(&symbol).cloned() else {
            debug!(broker = %self.name, %symbol, "no instrument registered for sample");
            return Ok(());
        };
        let mut book = match self.remaining.remove(&symbol) {
            Some((at, left)) if at == ts => {
                debug!(broker = %self.name, %symbol, %ts, "matching against the book already consumed at this instant");
                left
            }
            _ => {
                let book = self.depth_model.synthesize(&sample, &instrument, ts)?;
                self.last_books.insert(symbol.clone(), book.clone());
                book
            }
        };
        let mut result = Ok(());
        for id in self.registry.open_ids_for_symbol(&symbol) {
            result = self.process_order(id, &instrument, &mut book, ts);
            if result.is_err() {
                break;
            }
        }
        self.remaining.insert(symbol, (ts, book));
        result
    }
}
