//! Simulation configuration, loaded from TOML.
//!
//! ```toml
//! seed = 42
//! broker_name = "sim"
//!
//! [[balances]]
//! currency = "USD"
//! amount = "100000"
//!
//! [[instruments]]
//! symbol = "SPY"
//! currency = "USD"
//! tick_size = "0.01"
//!
//! [depth]
//! type = "ladder"
//! levels = 3
//! half_spread_ticks = 1
//! volume_per_level = "500"
//!
//! [fill_model]
//! type = "distribution"
//! on_touch_probability = 0.5
//! outcomes = [{ ticks = 0, weight = 0.9 }, { ticks = 1, weight = 0.1 }]
//! ```

use crate::broker::{Broker, BrokerError, SimBroker};
use crate::domain::{AssetClass, Instrument, InstrumentError};
use crate::execution::{
    DistributionFillModel, FillModelError, FixedRatioMarginModel, MarginError, PercentageFee, TickDistribution,
    TickOutcome,
};
use crate::market::{LadderDepth, ZeroSpreadDepth};
use crate::money::{Currency, CurrencyKind, CurrencyRegistry, Money, MoneyError};
use crate::rng::SeedHierarchy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error(transparent)]
    FillModel(#[from] FillModelError),

    #[error(transparent)]
    Margin(#[from] MarginError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Everything needed to build a configured `SimBroker`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Master seed; every random component derives its own stream from it.
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_broker_name")]
    pub broker_name: String,

    /// Added to the built-in currencies.
    #[serde(default)]
    pub currencies: Vec<CurrencyConfig>,

    /// Starting cash per currency.
    #[serde(default)]
    pub balances: Vec<BalanceConfig>,

    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,

    #[serde(default)]
    pub depth: DepthConfig,

    #[serde(default)]
    pub fill_model: FillModelConfig,

    /// Cash settlement when absent.
    #[serde(default)]
    pub margin: Option<MarginConfig>,

    #[serde(default)]
    pub fees: Option<FeeConfig>,
}

fn default_seed() -> u64 {
    42
}

fn default_broker_name() -> String {
    "sim".to_string()
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            broker_name: default_broker_name(),
            currencies: Vec::new(),
            balances: Vec::new(),
            instruments: Vec::new(),
            depth: DepthConfig::default(),
            fill_model: FillModelConfig::default(),
            margin: None,
            fees: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrencyConfig {
    pub code: String,
    pub precision: u32,
    #[serde(default = "default_currency_kind")]
    pub kind: CurrencyKind,
}

fn default_currency_kind() -> CurrencyKind {
    CurrencyKind::Fiat
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceConfig {
    pub currency: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// Quote (settlement) currency code.
    pub currency: String,
    #[serde(default = "default_tick_size")]
    pub tick_size: Decimal,
    #[serde(default = "default_one")]
    pub lot_size: Decimal,
    #[serde(default = "default_one")]
    pub contract_size: Decimal,
    #[serde(default = "default_asset_class")]
    pub asset_class: AssetClass,
}

fn default_tick_size() -> Decimal {
    Decimal::new(1, 2)
}

fn default_one() -> Decimal {
    Decimal::ONE
}

fn default_asset_class() -> AssetClass {
    AssetClass::Equity
}

/// How books are synthesized from bars, quotes and trades.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DepthConfig {
    /// One level each side at the sample price; unlimited when `volume` is absent.
    ZeroSpread {
        #[serde(default)]
        volume: Option<Decimal>,
    },
    Ladder { levels: usize, half_spread_ticks: u32, volume_per_level: Decimal },
}

impl Default for DepthConfig {
    fn default() -> Self {
        DepthConfig::ZeroSpread { volume: None }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FillModelConfig {
    #[default]
    PassThrough,
    /// Seeded on-touch fills and tick slippage; no outcomes means no slippage.
    Distribution {
        on_touch_probability: f64,
        #[serde(default)]
        outcomes: Vec<TickOutcome>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarginConfig {
    pub initial_ratio: Decimal,
    pub maintenance_ratio: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeConfig {
    /// Percent of notional: 0.1 charges 0.1%.
    Percentage {
        percent: Decimal,
        #[serde(default)]
        min_fee: Option<Decimal>,
    },
    Bps { bps: Decimal },
}

impl SimulationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.display().to_string(), reason: e.to_string() })?;
        Self::from_toml_str(&text)
    }

    /// Built-in currencies plus the configured ones.
    pub fn currency_registry(&self) -> Result<CurrencyRegistry, ConfigError> {
        let mut registry = CurrencyRegistry::with_defaults();
        for currency in &self.currencies {
            registry.register(Currency::new(currency.code.clone(), currency.precision, currency.kind)?)?;
        }
        Ok(registry)
    }

    pub fn instruments(&self, registry: &CurrencyRegistry) -> Result<Vec<Instrument>, ConfigError> {
        self.instruments
            .iter()
            .map(|i| {
                let currency = registry.get(&i.currency)?.clone();
                Ok(Instrument::new(
                    i.symbol.clone(),
                    currency,
                    i.tick_size,
                    i.lot_size,
                    i.contract_size,
                    i.asset_class,
                )?)
            })
            .collect()
    }

    /// Seed of the broker's fill model, derived from the master seed.
    pub fn fill_seed(&self) -> u64 {
        SeedHierarchy::new(self.seed).sub_seed(&self.broker_name, "fill_model", 0)
    }

    /// A disconnected `SimBroker` with instruments registered and balances deposited.
    pub fn build_broker(&self) -> Result<SimBroker, ConfigError> {
        let registry = self.currency_registry()?;
        let mut broker = SimBroker::new(self.broker_name.clone());

        broker = match &self.depth {
            DepthConfig::ZeroSpread { volume: Some(volume) } => broker.with_depth_model(ZeroSpreadDepth::new(*volume)),
            DepthConfig::ZeroSpread { volume: None } => broker.with_depth_model(ZeroSpreadDepth::unlimited()),
            DepthConfig::Ladder { levels: 0, .. } => {
                return Err(ConfigError::Invalid("ladder depth needs at least one level".to_string()));
            }
            DepthConfig::Ladder { levels, half_spread_ticks, volume_per_level } => {
                broker.with_depth_model(LadderDepth::new(*levels, *half_spread_ticks, *volume_per_level))
            }
        };

        if let FillModelConfig::Distribution { on_touch_probability, outcomes } = &self.fill_model {
            let distribution =
                if outcomes.is_empty() { TickDistribution::constant(0) } else { TickDistribution::new(outcomes.clone())? };
            let model = DistributionFillModel::new(distribution, *on_touch_probability, self.fill_seed())?;
            broker = broker.with_fill_model(model);
        }

        if let Some(margin) = &self.margin {
            broker = broker.with_margin_model(FixedRatioMarginModel::new(margin.initial_ratio, margin.maintenance_ratio)?);
        }

        match &self.fees {
            Some(FeeConfig::Percentage { percent, min_fee }) => {
                broker = broker.with_fee_model(PercentageFee::new(*percent, *min_fee));
            }
            Some(FeeConfig::Bps { bps }) => broker = broker.with_fee_model(PercentageFee::from_bps(*bps)),
            None => {}
        }

        for instrument in self.instruments(&registry)? {
            broker.register_instrument(instrument)?;
        }
        for balance in &self.balances {
            let currency = registry.get(&balance.currency)?.clone();
            broker.deposit(&Money::new(balance.amount, currency)?)?;
        }
        Ok(broker)
    }
}
