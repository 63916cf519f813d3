use std::f64::consts::PI;

use rand::Rng;
use rand::distr::Open01;
use rand_distr::{Distribution, Triangular};
use serde::{Deserialize, Serialize};

/// Draw `n` normal deviates with mean 1 and standard deviation `sd`.
///
/// Box–Muller: each pair of uniforms on (0, 1) yields a cosine and a sine
/// deviate. For odd `n` the sine partner of the last pair is discarded, so
/// the output always has exactly `n` values.
pub fn rnorm(rng: &mut impl Rng, n: usize, sd: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let u1: f64 = rng.sample(Open01);
        let u2: f64 = rng.sample(Open01);
        let mag = (-2.0 * u1.ln()).sqrt();
        let angle = 2.0 * PI * u2;
        out.push(1.0 + mag * angle.cos() * sd);
        if out.len() < n {
            out.push(1.0 + mag * angle.sin() * sd);
        }
    }
    out
}

/// Multiplicative perturbation applied to a whole benefit or cost stream
/// for one simulation path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleDistribution {
    pub low: f64,
    pub mode: f64,
    pub high: f64,
}

impl Default for ScaleDistribution {
    fn default() -> Self {
        Self::fixed(1.0)
    }
}

impl ScaleDistribution {
    pub fn new(low: f64, mode: f64, high: f64) -> Self {
        Self { low, mode, high }
    }

    /// A point mass at `value`; sampling always returns it.
    pub fn fixed(value: f64) -> Self {
        Self { low: value, mode: value, high: value }
    }

    /// True when `low <= mode <= high` with all three finite.
    pub fn is_well_formed(&self) -> bool {
        self.low.is_finite()
            && self.mode.is_finite()
            && self.high.is_finite()
            && self.low <= self.mode
            && self.mode <= self.high
    }

    /// Triangular draw. Malformed or zero-width triples return `mode`.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        if !self.is_well_formed() || self.low == self.high {
            return self.mode;
        }
        match Triangular::new(self.low, self.high, self.mode) {
            Ok(dist) => dist.sample(rng),
            Err(_) => self.mode,
        }
    }
}
