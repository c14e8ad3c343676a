//! tradesim core — event feeds, order lifecycle, simulated broker, trading engine.
//!
//! This crate contains the whole simulator:
//! - Value objects (money, currencies) and domain entities (instruments, bars,
//!   events, orders, executions, positions, accounts)
//! - The order state machine, driven by a shared transition table
//! - Order book synthesis and the fill walk
//! - Fill, margin and fee models
//! - `SimBroker`, which matches orders against each price sample
//! - Event feeds, bar aggregation and chronological multi-feed delivery
//! - `TradingEngine`, which drives strategies and brokers from those feeds

pub mod broker;
pub mod config;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod feed;
pub mod market;
pub mod money;
pub mod rng;
pub mod state_machine;
