use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::sampling::rnorm;
use crate::stats::median;

/// Subsample size for the approximate median.
pub const APPROX_MEDIAN_SAMPLE: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossOptions {
    /// `change` is an absolute CV reduction rather than a proportion.
    pub fixed: bool,
    /// Draws per arm.
    pub reps: usize,
    /// Estimate each arm's median from a shuffled subsample of
    /// [`APPROX_MEDIAN_SAMPLE`] draws instead of the full arm.
    pub approx: bool,
}

impl Default for LossOptions {
    fn default() -> Self {
        Self { fixed: false, reps: 1_000_000, approx: true }
    }
}

/// Standard deviation after the intervention, before the sign check.
fn sd_after_change(cv: f64, change: f64, fixed: bool) -> f64 {
    if fixed {
        (cv - change.min(cv)).max(0.0)
    } else {
        cv * (1.0 - change)
    }
}

fn arm_median(values: &[f64], approx: bool, rng: &mut impl Rng) -> Option<f64> {
    if approx && values.len() > APPROX_MEDIAN_SAMPLE {
        let mut copy = values.to_vec();
        let (sample, _) = copy.partial_shuffle(rng, APPROX_MEDIAN_SAMPLE);
        median(sample)
    } else {
        median(values)
    }
}

fn lower_half_sum(values: &[f64], med: f64) -> f64 {
    values.iter().filter(|&&x| x <= med).sum()
}

/// Average loss reduction from lowering variability, as a proportion of
/// the baseline total.
///
/// Simulates a baseline arm N(1, cv) and an intervention arm N(1, sd_with)
/// and compares how much mass each puts in its lower half. Returns `NaN`
/// when the parameters imply a negative standard deviation or there are no
/// draws; otherwise the result is non-negative.
pub fn avloss(cv: f64, change: f64, opts: &LossOptions, rng: &mut impl Rng) -> f64 {
    let sd_with = sd_after_change(cv, change, opts.fixed);
    if !(sd_with >= 0.0) || opts.reps == 0 {
        return f64::NAN;
    }
    let sd_without = cv;

    let with = rnorm(rng, opts.reps, sd_with);
    let without = rnorm(rng, opts.reps, sd_without);

    let (Some(med_with), Some(med_without)) = (
        arm_median(&with, opts.approx, rng),
        arm_median(&without, opts.approx, rng),
    ) else {
        return f64::NAN;
    };

    let with_lh = lower_half_sum(&with, med_with);
    let without_lh = lower_half_sum(&without, med_without);
    let total_without: f64 = without.iter().sum();

    debug!(cv, change, sd_with, med_with, med_without, reps = opts.reps, "avloss arms drawn");

    ((with_lh - without_lh) / total_without).max(0.0)
}
