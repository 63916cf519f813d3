use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cashflow::{CashflowRow, FieldKeys};
use crate::sampling::ScaleDistribution;
use crate::stats::QuantilePoints;

/// Discount rate used when neither the config nor any row supplies one.
pub const DEFAULT_DISCOUNT_RATE: f64 = 0.12;

pub const DEFAULT_SIMULATIONS: usize = 2000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{name} must be a finite value in [0, 1], got {value}")]
    QuantileOutOfRange { name: &'static str, value: f64 },
    #[error("quantile points must satisfy qLow <= qMid <= qHigh, got {low}, {mid}, {high}")]
    QuantileOrder { low: f64, mid: f64, high: f64 },
    #[error("discount rate must be finite and greater than -1, got {0}")]
    DiscountRate(f64),
    #[error("{name} bounds must be finite, got {dist:?}")]
    ScaleNotFinite { name: &'static str, dist: ScaleDistribution },
}

/// Options for one Monte Carlo run over a set of cashflow rows.
///
/// Deserialises from camelCase JSON (`benefitScale`, `qLow`, ...); every
/// field is optional and falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    pub simulations: usize,
    pub year_key: String,
    pub benefit_key: String,
    pub cost_key: String,
    /// Overrides any per-row `discount_rate`.
    pub discount_rate: Option<f64>,
    pub benefit_scale: ScaleDistribution,
    pub cost_scale: ScaleDistribution,
    pub q_low: f64,
    pub q_mid: f64,
    pub q_high: f64,
    /// Seed for the path RNG. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let keys = FieldKeys::default();
        let points = QuantilePoints::default();
        Self {
            simulations: DEFAULT_SIMULATIONS,
            year_key: keys.year,
            benefit_key: keys.benefit,
            cost_key: keys.cost,
            discount_rate: None,
            benefit_scale: ScaleDistribution::default(),
            cost_scale: ScaleDistribution::default(),
            q_low: points.low,
            q_mid: points.mid,
            q_high: points.high,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Parse and validate a JSON config object.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("qLow", self.q_low), ("qMid", self.q_mid), ("qHigh", self.q_high)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::QuantileOutOfRange { name, value });
            }
        }
        if !(self.q_low <= self.q_mid && self.q_mid <= self.q_high) {
            return Err(ConfigError::QuantileOrder {
                low: self.q_low,
                mid: self.q_mid,
                high: self.q_high,
            });
        }
        if let Some(rate) = self.discount_rate
            && !(rate.is_finite() && rate > -1.0)
        {
            return Err(ConfigError::DiscountRate(rate));
        }
        for (name, dist) in [("benefitScale", self.benefit_scale), ("costScale", self.cost_scale)] {
            if ![dist.low, dist.mode, dist.high].iter().all(|x| x.is_finite()) {
                return Err(ConfigError::ScaleNotFinite { name, dist });
            }
        }
        Ok(())
    }

    pub fn field_keys(&self) -> FieldKeys {
        FieldKeys {
            year: self.year_key.clone(),
            benefit: self.benefit_key.clone(),
            cost: self.cost_key.clone(),
        }
    }

    pub fn quantile_points(&self) -> QuantilePoints {
        QuantilePoints { low: self.q_low, mid: self.q_mid, high: self.q_high }
    }

    /// Config override, else the first row (in the given order) carrying a
    /// finite `discount_rate`, else [`DEFAULT_DISCOUNT_RATE`].
    pub fn resolve_discount_rate(&self, rows: &[CashflowRow]) -> f64 {
        if let Some(rate) = self.discount_rate {
            return rate;
        }
        match rows.iter().find_map(|r| r.discount_rate.filter(|d| d.is_finite())) {
            Some(rate) => {
                debug!(rate, "discount rate taken from cashflow rows");
                rate
            }
            None => DEFAULT_DISCOUNT_RATE,
        }
    }
}
