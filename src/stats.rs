use serde::Serialize;

/// Quantile points used when summarising a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantilePoints {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl Default for QuantilePoints {
    fn default() -> Self {
        Self { low: 0.1, mid: 0.5, high: 0.9 }
    }
}

/// Low/mid/high quantiles, mean and count of the finite values in a sample.
///
/// The quantile fields keep their `p10`/`p50`/`p90` names even when the
/// summary was computed at non-default points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantileSummary {
    pub p10: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub mean: Option<f64>,
    pub n: usize,
}

impl QuantileSummary {
    pub fn empty() -> Self {
        Self { p10: None, p50: None, p90: None, mean: None, n: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

/// Interpolated quantile of an ascending slice at index `q·(m−1)`.
///
/// `sorted` must be non-empty; `q` is clamped to [0, 1].
fn interpolate(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    let h = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = h - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn finite_sorted<I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut v: Vec<f64> = values.into_iter().filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Summarise at the default 0.1 / 0.5 / 0.9 points.
pub fn summarize(values: &[f64]) -> QuantileSummary {
    summarize_at(values.iter().copied(), QuantilePoints::default())
}

/// Summarise the finite values of `values` at the given quantile points.
pub fn summarize_at<I>(values: I, points: QuantilePoints) -> QuantileSummary
where
    I: IntoIterator<Item = f64>,
{
    let sorted = finite_sorted(values);
    if sorted.is_empty() {
        return QuantileSummary::empty();
    }
    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    QuantileSummary {
        p10: Some(interpolate(&sorted, points.low)),
        p50: Some(interpolate(&sorted, points.mid)),
        p90: Some(interpolate(&sorted, points.high)),
        mean: Some(mean),
        n,
    }
}

/// Summarise optional values; `None` counts as missing, never as zero.
pub fn summarize_options<'a, I>(values: I, points: QuantilePoints) -> QuantileSummary
where
    I: IntoIterator<Item = &'a Option<f64>>,
{
    summarize_at(values.into_iter().filter_map(|v| *v), points)
}

/// Median of the finite values, `None` when there are none.
pub fn median(values: &[f64]) -> Option<f64> {
    let sorted = finite_sorted(values.iter().copied());
    if sorted.is_empty() {
        None
    } else {
        Some(interpolate(&sorted, 0.5))
    }
}

/// Fraction of finite values satisfying `pred`, `None` when there are none.
pub fn proportion<I, F>(values: I, pred: F) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
    F: Fn(f64) -> bool,
{
    let (hits, total) = values
        .into_iter()
        .filter(|x| x.is_finite())
        .fold((0usize, 0usize), |(h, t), x| (h + pred(x) as usize, t + 1));
    if total == 0 {
        None
    } else {
        Some(hits as f64 / total as f64)
    }
}
