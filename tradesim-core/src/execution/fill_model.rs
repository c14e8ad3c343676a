//! Fill models: post-process the slices the book walk proposed.
//!
//! Market-like orders can be nudged by a sampled number of ticks; limit-like
//! orders touching exactly at their limit are accepted only with some
//! probability. Randomness comes from a seeded `StdRng`, so a replay with the
//! same seed reproduces every decision.

use super::matching::is_market_like;
use crate::domain::{Instrument, Order, OrderSide};
use crate::market::{FillSlice, OrderBook};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FillModelError {
    #[error("probability must be within [0, 1], got {0}")]
    InvalidProbability(f64),

    #[error("tick distribution needs at least one outcome")]
    EmptyDistribution,

    #[error("outcome {index} has invalid weight {weight}")]
    InvalidWeight { index: usize, weight: f64 },

    #[error("tick distribution weights sum to zero")]
    ZeroTotalWeight,
}

pub trait FillModel: Send {
    /// Accept, reprice or drop proposed slices, best price first.
    fn apply_fill_policy(
        &mut self,
        order: &Order,
        instrument: &Instrument,
        book: &OrderBook,
        proposed: Vec<FillSlice>,
    ) -> Vec<FillSlice>;

    /// Name of this model
    fn name(&self) -> &str;
}

/// Accepts every proposed slice unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughFillModel;

impl FillModel for PassThroughFillModel {
    fn apply_fill_policy(
        &mut self,
        _order: &Order,
        _instrument: &Instrument,
        _book: &OrderBook,
        proposed: Vec<FillSlice>,
    ) -> Vec<FillSlice> {
        proposed
    }

    fn name(&self) -> &str {
        "pass_through"
    }
}

/// One possible price adjustment, in ticks, and its weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub ticks: i64,
    pub weight: f64,
}

/// Discrete distribution over tick adjustments.
#[derive(Debug, Clone, PartialEq)]
pub struct TickDistribution {
    outcomes: Vec<TickOutcome>,
    total_weight: f64,
}

impl TickDistribution {
    pub fn new(outcomes: Vec<TickOutcome>) -> Result<Self, FillModelError> {
        if outcomes.is_empty() {
            return Err(FillModelError::EmptyDistribution);
        }
        for (index, outcome) in outcomes.iter().enumerate() {
            if !outcome.weight.is_finite() || outcome.weight < 0.0 {
                return Err(FillModelError::InvalidWeight { index, weight: outcome.weight });
            }
        }
        let total_weight: f64 = outcomes.iter().map(|o| o.weight).sum();
        if total_weight <= 0.0 {
            return Err(FillModelError::ZeroTotalWeight);
        }
        Ok(Self { outcomes, total_weight })
    }

    /// Always the same adjustment; never consumes randomness.
    pub fn constant(ticks: i64) -> Self {
        Self { outcomes: vec![TickOutcome { ticks, weight: 1.0 }], total_weight: 1.0 }
    }

    pub fn outcomes(&self) -> &[TickOutcome] {
        &self.outcomes
    }

    /// Draw an adjustment. The last outcome absorbs floating-point slack.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        let (last, rest) = match self.outcomes.split_last() {
            Some((last, rest)) if !rest.is_empty() => (last, rest),
            Some((only, _)) => return only.ticks,
            None => return 0,
        };
        let draw: f64 = rng.gen();
        let mut cumulative = 0.0;
        for outcome in rest {
            cumulative += outcome.weight / self.total_weight;
            if draw < cumulative {
                return outcome.ticks;
            }
        }
        last.ticks
    }
}

/// Tick-adjusts market-like fills and gates on-touch limit fills.
#[derive(Debug, Clone)]
pub struct DistributionFillModel {
    distribution: TickDistribution,
    on_touch_probability: f64,
    rng: StdRng,
}

impl DistributionFillModel {
    pub fn new(distribution: TickDistribution, on_touch_probability: f64, seed: u64) -> Result<Self, FillModelError> {
        if !(0.0..=1.0).contains(&on_touch_probability) {
            return Err(FillModelError::InvalidProbability(on_touch_probability));
        }
        Ok(Self { distribution, on_touch_probability, rng: StdRng::seed_from_u64(seed) })
    }

    fn accept_on_touch(&mut self) -> bool {
        if self.on_touch_probability <= 0.0 {
            return false;
        }
        if self.on_touch_probability >= 1.0 {
            return true;
        }
        self.rng.gen::<f64>() < self.on_touch_probability
    }
}

impl FillModel for DistributionFillModel {
    fn apply_fill_policy(
        &mut self,
        order: &Order,
        instrument: &Instrument,
        _book: &OrderBook,
        proposed: Vec<FillSlice>,
    ) -> Vec<FillSlice> {
        let side = order.side();

        if is_market_like(order.kind()) {
            let tick = instrument.tick_size();
            return proposed
                .into_iter()
                .map(|slice| {
                    let shift = Decimal::from(self.distribution.sample(&mut self.rng)) * tick;
                    let price = match side {
                        OrderSide::Buy => slice.price - shift,
                        OrderSide::Sell => slice.price + shift,
                    };
                    FillSlice { price, quantity: slice.quantity }
                })
                .collect();
        }

        let Some(limit) = order.kind().limit_price() else {
            return proposed;
        };
        let mut accepted = Vec::with_capacity(proposed.len());
        for slice in proposed {
            let better = match side {
                OrderSide::Buy => slice.price < limit,
                OrderSide::Sell => slice.price > limit,
            };
            if better || (slice.price == limit && self.accept_on_touch()) {
                accepted.push(slice);
            }
        }
        accepted
    }

    fn name(&self) -> &str {
        "distribution"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderAction;
    use crate::market::BookLevel;
    use crate::money::{Currency, CurrencyKind};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn spy() -> Instrument {
        Instrument::equity("SPY", Currency::new("USD", 2, CurrencyKind::Fiat).unwrap()).unwrap()
    }

    fn book() -> OrderBook {
        OrderBook::new(
            "SPY",
            Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
            vec![BookLevel::new(dec!(99), dec!(10))],
            vec![BookLevel::new(dec!(100), dec!(10))],
        )
        .unwrap()
    }

    fn active(mut order: Order) -> Order {
        order.change_state(OrderAction::Submit).unwrap();
        order.change_state(OrderAction::Acknowledge).unwrap();
        order.change_state(OrderAction::Activate).unwrap();
        order
    }

    fn slices(prices: &[Decimal]) -> Vec<FillSlice> {
        prices.iter().map(|&price| FillSlice { price, quantity: dec!(1) }).collect()
    }

    #[test]
    fn pass_through_keeps_everything() {
        let order = active(Order::market("SPY", OrderSide::Buy, dec!(2)).unwrap());
        let proposed = slices(&[dec!(100), dec!(101)]);
        let out = PassThroughFillModel.apply_fill_policy(&order, &spy(), &book(), proposed.clone());
        assert_eq!(out, proposed);
    }

    #[test]
    fn constant_distribution_shifts_by_side() {
        let mut model = DistributionFillModel::new(TickDistribution::constant(-2), 1.0, 1).unwrap();
        let buy = active(Order::market("SPY", OrderSide::Buy, dec!(1)).unwrap());
        let out = model.apply_fill_policy(&buy, &spy(), &book(), slices(&[dec!(100)]));
        assert_eq!(out[0].price, dec!(100.02));

        let sell = active(Order::market("SPY", OrderSide::Sell, dec!(1)).unwrap());
        let out = model.apply_fill_policy(&sell, &spy(), &book(), slices(&[dec!(99)]));
        assert_eq!(out[0].price, dec!(98.98));
    }

    #[test]
    fn on_touch_boundaries_are_deterministic() {
        let order = active(Order::limit("SPY", OrderSide::Buy, dec!(2), dec!(100)).unwrap());
        let proposed = slices(&[dec!(99.99), dec!(100)]);

        let mut never = DistributionFillModel::new(TickDistribution::constant(0), 0.0, 9).unwrap();
        let out = never.apply_fill_policy(&order, &spy(), &book(), proposed.clone());
        assert_eq!(out, slices(&[dec!(99.99)]));

        let mut always = DistributionFillModel::new(TickDistribution::constant(0), 1.0, 9).unwrap();
        let out = always.apply_fill_policy(&order, &spy(), &book(), proposed.clone());
        assert_eq!(out, proposed);
    }

    #[test]
    fn boundary_probabilities_leave_rng_untouched() {
        let order = active(Order::limit("SPY", OrderSide::Sell, dec!(5), dec!(99)).unwrap());
        let mut model = DistributionFillModel::new(TickDistribution::constant(0), 1.0, 5).unwrap();
        let mut reference = StdRng::seed_from_u64(5);
        model.apply_fill_policy(&order, &spy(), &book(), slices(&[dec!(99); 5]));
        assert_eq!(model.rng.gen::<u64>(), reference.gen::<u64>());
    }

    #[test]
    fn same_seed_same_decisions() {
        let dist = TickDistribution::new(vec![
            TickOutcome { ticks: 0, weight: 0.5 },
            TickOutcome { ticks: -1, weight: 0.3 },
            TickOutcome { ticks: -2, weight: 0.2 },
        ])
        .unwrap();
        let order = active(Order::market("SPY", OrderSide::Buy, dec!(50)).unwrap());
        let proposed = slices(&[dec!(100); 50]);
        let mut a = DistributionFillModel::new(dist.clone(), 0.5, 77).unwrap();
        let mut b = DistributionFillModel::new(dist, 0.5, 77).unwrap();
        assert_eq!(
            a.apply_fill_policy(&order, &spy(), &book(), proposed.clone()),
            b.apply_fill_policy(&order, &spy(), &book(), proposed)
        );
    }

    #[test]
    fn sampling_covers_every_outcome() {
        let dist = TickDistribution::new(vec![
            TickOutcome { ticks: 0, weight: 1.0 },
            TickOutcome { ticks: 1, weight: 1.0 },
            TickOutcome { ticks: 2, weight: 1.0 },
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[dist.sample(&mut rng) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn validates_inputs() {
        assert!(TickDistribution::new(vec![]).is_err());
        assert!(TickDistribution::new(vec![TickOutcome { ticks: 0, weight: -1.0 }]).is_err());
        assert!(TickDistribution::new(vec![TickOutcome { ticks: 0, weight: 0.0 }]).is_err());
        assert!(DistributionFillModel::new(TickDistribution::constant(0), 1.5, 0).is_err());
        assert!(DistributionFillModel::new(TickDistribution::constant(0), f64::NAN, 0).is_err());
    }
}
