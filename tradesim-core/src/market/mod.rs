//! Market microstructure: order book snapshots and depth synthesis.

pub mod depth;
pub mod order_book;

pub use depth::{DepthModel, LadderDepth, ZeroSpreadDepth};
pub use order_book::{BookError, BookLevel, FillSlice, OrderBook};
