//! Discounting and rate-of-return helpers over per-period cashflows.
//!
//! Period `i` of a cashflow slice is discounted by `(1 + r)^i`, so the first
//! element is undiscounted.

/// Secant iterations stop when successive NPVs differ by less than this.
const SECANT_FLAT_EPSILON: f64 = 1e-10;

/// Net present value of `cashflows` at `rate`.
pub fn npv(cashflows: &[f64], rate: f64) -> f64 {
    cashflows
        .iter()
        .enumerate()
        .map(|(t, cf)| cf / (1.0 + rate).powi(t as i32))
        .sum()
}

/// Running discounted sum: element `i` is the NPV of `values[..=i]`.
///
/// Non-finite inputs propagate to every later element.
pub fn npv_discrete_cumulative(values: &[f64], rate: f64) -> Vec<f64> {
    let mut acc = 0.0;
    values
        .iter()
        .enumerate()
        .map(|(t, v)| {
            acc += v / (1.0 + rate).powi(t as i32);
            acc
        })
        .collect()
}

/// Tuning for the secant IRR solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrrOptions {
    pub guess: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for IrrOptions {
    fn default() -> Self {
        Self { guess: 0.1, max_iterations: 100, tolerance: 1e-6 }
    }
}

/// Internal rate of return with default solver options.
pub fn irr(cashflows: &[f64]) -> Option<f64> {
    irr_with(cashflows, &IrrOptions::default())
}

/// Internal rate of return via the secant method, starting from
/// `guess` and `guess + 0.05`.
///
/// Returns `None` when the secant is flat, an iterate leaves the reals,
/// or `max_iterations` pass without two estimates landing within
/// `tolerance` of each other.
pub fn irr_with(cashflows: &[f64], opts: &IrrOptions) -> Option<f64> {
    let mut r0 = opts.guess;
    let mut r1 = opts.guess + 0.05;

    for _ in 0..opts.max_iterations {
        let f0 = npv(cashflows, r0);
        let f1 = npv(cashflows, r1);
        let df = f1 - f0;
        if !df.is_finite() || df.abs() < SECANT_FLAT_EPSILON {
            return None;
        }
        let r2 = r1 - f1 * (r1 - r0) / df;
        if !r2.is_finite() {
            return None;
        }
        if (r2 - r1).abs() < opts.tolerance {
            return Some(r2);
        }
        r0 = r1;
        r1 = r2;
    }
    None
}

/// Modified IRR: positive flows compound forward to the last period at
/// `reinvest_rate`; non-positive flows discount back to period 0 at
/// `finance_rate`.
///
/// `None` for fewer than two periods, no outflows, or no inflows.
pub fn mirr(cashflows: &[f64], finance_rate: f64, reinvest_rate: f64) -> Option<f64> {
    if cashflows.len() < 2 {
        return None;
    }
    let n = cashflows.len() - 1;

    let mut fv_in = 0.0;
    let mut pv_out = 0.0;
    for (t, &cf) in cashflows.iter().enumerate() {
        if cf > 0.0 {
            fv_in += cf * (1.0 + reinvest_rate).powi((n - t) as i32);
        } else {
            pv_out += cf / (1.0 + finance_rate).powi(t as i32);
        }
    }

    if pv_out == 0.0 || !(fv_in > 0.0) {
        return None;
    }
    let rate = (fv_in / pv_out.abs()).powf(1.0 / n as f64) - 1.0;
    rate.is_finite().then_some(rate)
}
