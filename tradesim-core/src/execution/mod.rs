//! Execution: matching against synthesized books and the policies applied to
//! every fill.
//!
//! Key concepts:
//! - **Matching**: eligibility and the ladder walk per order kind
//! - **Fill model**: reprices or drops proposed slices (seeded, replayable)
//! - **Margin**: initial margin for new exposure, maintenance for the net position
//! - **Fees**: commission per execution

pub mod fees;
pub mod fill_model;
pub mod margin;
pub mod matching;

pub use fees::{FeeModel, NoFee, PercentageFee};
pub use fill_model::{
    DistributionFillModel, FillModel, FillModelError, PassThroughFillModel, TickDistribution, TickOutcome,
};
pub use margin::{FixedRatioMarginModel, MarginError, MarginModel};
pub use matching::{
    check_trigger, is_market_like, limit_eligibility, propose_fills, stop_triggered, Eligibility, MatchOutcome,
    MatchingError,
};
