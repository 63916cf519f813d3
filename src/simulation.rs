use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cashflow::{CashflowRow, prepare_rows, rows_from_records};
use crate::config::SimulationConfig;
use crate::finance::{irr, mirr, npv_discrete_cumulative};
use crate::stats::{QuantilePoints, QuantileSummary, proportion, summarize_at, summarize_options};

/// Cross-path distribution of each metric at one cashflow period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSummary {
    pub year: f64,
    pub npv: QuantileSummary,
    pub bcr: QuantileSummary,
    /// Percent.
    pub irr: QuantileSummary,
    /// Percent.
    pub mirr: QuantileSummary,
}

/// Final-period distributions plus success probabilities.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalSummary {
    pub npv: QuantileSummary,
    pub irr: QuantileSummary,
    pub mirr: QuantileSummary,
    pub bcr: QuantileSummary,
    pub prob_npv_positive: Option<f64>,
    pub prob_bcr_above1: Option<f64>,
}

impl FinalSummary {
    fn empty() -> Self {
        Self {
            npv: QuantileSummary::empty(),
            irr: QuantileSummary::empty(),
            mirr: QuantileSummary::empty(),
            bcr: QuantileSummary::empty(),
            prob_npv_positive: None,
            prob_bcr_above1: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub simulations: usize,
    pub yearly: Vec<YearSummary>,
    #[serde(rename = "final")]
    pub final_period: FinalSummary,
}

impl SimulationResult {
    /// The result for input with nothing to simulate.
    pub fn empty() -> Self {
        Self { simulations: 0, yearly: Vec::new(), final_period: FinalSummary::empty() }
    }
}

/// Metric series for one Monte Carlo draw. Index `i` covers periods `0..=i`.
#[derive(Debug, Clone)]
struct SimulationPath {
    npv: Vec<f64>,
    bcr: Vec<Option<f64>>,
    irr: Vec<Option<f64>>,
    mirr: Vec<Option<f64>>,
    final_irr: Option<f64>,
    final_mirr: Option<f64>,
}

impl SimulationPath {
    /// Evaluate one path. `rows` must be non-empty and sorted.
    fn evaluate(rows: &[CashflowRow], benefit_scale: f64, cost_scale: f64, rate: f64) -> Self {
        let benefits: Vec<f64> = rows.iter().map(|r| r.project_benefit * benefit_scale).collect();
        let costs: Vec<f64> = rows.iter().map(|r| r.cost * cost_scale).collect();
        let cashflow: Vec<f64> = benefits.iter().zip(&costs).map(|(b, c)| b - c).collect();

        let npv = npv_discrete_cumulative(&cashflow, rate);
        let npv_benefit = npv_discrete_cumulative(&benefits, rate);
        let npv_cost = npv_discrete_cumulative(&costs, rate);

        let bcr = npv_benefit
            .iter()
            .zip(&npv_cost)
            .map(|(b, c)| if *c == 0.0 { None } else { Some(b / c) })
            .collect();

        let as_percent = |r: Option<f64>| r.map(|x| x * 100.0);
        let irr_series: Vec<Option<f64>> =
            (1..=cashflow.len()).map(|k| as_percent(irr(&cashflow[..k]))).collect();
        let mirr_series: Vec<Option<f64>> =
            (1..=cashflow.len()).map(|k| as_percent(mirr(&cashflow[..k], rate, rate))).collect();

        Self {
            final_irr: irr_series.last().copied().flatten(),
            final_mirr: mirr_series.last().copied().flatten(),
            npv,
            bcr,
            irr: irr_series,
            mirr: mirr_series,
        }
    }
}

/// Run with the RNG described by `config.seed`, or a fresh entropy seed.
pub fn run(rows: &[CashflowRow], config: &SimulationConfig) -> SimulationResult {
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    debug!(seed, "seeding simulation rng");
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    run_simulation(rows, config, &mut rng)
}

/// Load duck-typed records using the config's field names, then simulate.
/// Anything other than a JSON array produces the empty result.
pub fn run_simulation_from_records(
    records: &Value,
    config: &SimulationConfig,
    rng: &mut impl Rng,
) -> SimulationResult {
    let rows = rows_from_records(records, &config.field_keys());
    run_simulation(&rows, config, rng)
}

/// Monte Carlo over benefit and cost scale factors.
///
/// All random draws come from `rng` on the calling thread; paths are then
/// evaluated in parallel, so a seeded `rng` reproduces the result exactly.
pub fn run_simulation(
    rows: &[CashflowRow],
    config: &SimulationConfig,
    rng: &mut impl Rng,
) -> SimulationResult {
    let rows = prepare_rows(rows);
    if rows.is_empty() || config.simulations == 0 {
        return SimulationResult::empty();
    }

    let rate = config.resolve_discount_rate(&rows);
    debug!(
        simulations = config.simulations,
        periods = rows.len(),
        discount_rate = rate,
        "starting cashflow simulation"
    );

    let draws: Vec<(f64, f64)> = (0..config.simulations)
        .map(|_| (config.benefit_scale.sample(rng), config.cost_scale.sample(rng)))
        .collect();

    let paths: Vec<SimulationPath> = draws
        .par_iter()
        .map(|&(b, c)| SimulationPath::evaluate(&rows, b, c, rate))
        .collect();

    aggregate(&rows, &paths, config.quantile_points())
}

fn aggregate(rows: &[CashflowRow], paths: &[SimulationPath], points: QuantilePoints) -> SimulationResult {
    let yearly = rows
        .iter()
        .enumerate()
        .map(|(i, row)| YearSummary {
            year: row.year,
            npv: summarize_at(paths.iter().map(|p| p.npv[i]), points),
            bcr: summarize_options(paths.iter().map(|p| &p.bcr[i]), points),
            irr: summarize_options(paths.iter().map(|p| &p.irr[i]), points),
            mirr: summarize_options(paths.iter().map(|p| &p.mirr[i]), points),
        })
        .collect();

    let last = rows.len() - 1;
    let final_npv = || paths.iter().map(|p| p.npv[last]);
    let final_bcr = || paths.iter().filter_map(|p| p.bcr[last]);

    let final_period = FinalSummary {
        npv: summarize_at(final_npv(), points),
        irr: summarize_options(paths.iter().map(|p| &p.final_irr), points),
        mirr: summarize_options(paths.iter().map(|p| &p.final_mirr), points),
        bcr: summarize_at(final_bcr(), points),
        prob_npv_positive: proportion(final_npv(), |x| x > 0.0),
        prob_bcr_above1: proportion(final_bcr(), |x| x > 1.0),
    };

    SimulationResult { simulations: paths.len(), yearly, final_period }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sampling::ScaleDistribution;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(42)
    }

    fn assert_close(actual: Option<f64>, expected: f64, tol: f64) {
        let a = actual.unwrap_or_else(|| panic!("expected {expected}, got None"));
        assert!((a - expected).abs() < tol, "expected {expected}, got {a}");
    }

    /// Outlay of 100 then two years of 60 benefit.
    fn small_project() -> Vec<CashflowRow> {
        vec![
            CashflowRow::new(2026.0, 0.0, 100.0),
            CashflowRow::new(2027.0, 60.0, 0.0),
            CashflowRow::new(2028.0, 60.0, 0.0),
        ]
    }

    fn fixed_config(simulations: usize, discount_rate: f64) -> SimulationConfig {
        SimulationConfig {
            simulations,
            discount_rate: Some(discount_rate),
            ..SimulationConfig::default()
        }
    }

    fn perturbed_config(simulations: usize, seed: u64) -> SimulationConfig {
        SimulationConfig {
            simulations,
            benefit_scale: ScaleDistribution::new(0.5, 1.0, 1.5),
            cost_scale: ScaleDistribution::new(0.9, 1.0, 1.4),
            seed: Some(seed),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn empty_rows_give_empty_result() {
        let result = run_simulation(&[], &SimulationConfig::default(), &mut rng());
        assert_eq!(result, SimulationResult::empty());
    }

    #[test]
    fn empty_result_json_shape() {
        let json = serde_json::to_value(SimulationResult::empty()).unwrap();
        let empty = json!({"p10": null, "p50": null, "p90": null, "mean": null, "n": 0});
        assert_eq!(
            json,
            json!({
                "simulations": 0,
                "yearly": [],
                "final": {
                    "npv": empty,
                    "irr": empty,
                    "mirr": empty,
                    "bcr": empty,
                    "probNpvPositive": null,
                    "probBcrAbove1": null
                }
            })
        );
    }

    #[test]
    fn non_array_records_give_empty_result() {
        let config = SimulationConfig::default();
        let result = run_simulation_from_records(&json!({"year": 1}), &config, &mut rng());
        assert_eq!(result, SimulationResult::empty());
    }

    #[test]
    fn rows_without_finite_year_give_empty_result() {
        let rows = vec![CashflowRow::new(f64::NAN, 10.0, 1.0)];
        let result = run_simulation(&rows, &SimulationConfig::default(), &mut rng());
        assert_eq!(result, SimulationResult::empty());
    }

    #[test]
    fn zero_simulations_give_empty_result() {
        let result = run_simulation(&small_project(), &fixed_config(0, 0.1), &mut rng());
        assert_eq!(result, SimulationResult::empty());
    }

    #[test]
    fn unperturbed_paths_have_degenerate_quantiles() {
        let result = run_simulation(&small_project(), &fixed_config(200, 0.08), &mut rng());
        assert_eq!(result.simulations, 200);
        assert_eq!(result.yearly.len(), 3);
        for y in &result.yearly {
            assert_eq!(y.npv.n, 200);
            assert_eq!(y.npv.p10, y.npv.p50);
            assert_eq!(y.npv.p50, y.npv.p90);
        }
    }

    #[test]
    fn unperturbed_metrics_match_closed_form() {
        let result = run_simulation(&small_project(), &fixed_config(50, 0.0), &mut rng());
        let npv: Vec<Option<f64>> = result.yearly.iter().map(|y| y.npv.p50).collect();
        assert_eq!(npv, vec![Some(-100.0), Some(-40.0), Some(20.0)]);

        let bcr: Vec<Option<f64>> = result.yearly.iter().map(|y| y.bcr.p50).collect();
        assert_eq!(bcr, vec![Some(0.0), Some(0.6), Some(1.2)]);

        // a single period has no IRR or MIRR
        assert_eq!(result.yearly[0].irr.n, 0);
        assert_eq!(result.yearly[0].mirr.n, 0);
        assert_close(result.yearly[1].irr.p50, -40.0, 1e-4);
        assert_close(result.yearly[1].mirr.p50, -40.0, 1e-9);

        // 60x + 60x² = 100 with x = 1/(1+r)
        let x = (-1.0 + (1.0 + 4.0 * 100.0 / 60.0_f64).sqrt()) / 2.0;
        assert_close(result.final_period.irr.p50, (1.0 / x - 1.0) * 100.0, 1e-4);
        assert_close(result.final_period.mirr.p50, (1.2_f64.sqrt() - 1.0) * 100.0, 1e-9);
        assert_eq!(result.final_period.npv.p50, Some(20.0));
        assert_eq!(result.final_period.prob_npv_positive, Some(1.0));
        assert_eq!(result.final_period.prob_bcr_above1, Some(1.0));
    }

    #[test]
    fn fixed_scales_are_idempotent_across_calls() {
        let config = fixed_config(100, 0.1);
        let a = run_simulation(&small_project(), &config, &mut ChaCha20Rng::seed_from_u64(1));
        let b = run_simulation(&small_project(), &config, &mut ChaCha20Rng::seed_from_u64(2));
        assert_eq!(a, b);
    }

    #[test]
    fn same_seed_reproduces_perturbed_run() {
        let config = perturbed_config(300, 9);
        assert_eq!(run(&small_project(), &config), run(&small_project(), &config));
    }

    #[test]
    fn perturbation_spreads_final_npv() {
        let result = run(&small_project(), &perturbed_config(2_000, 3));
        let npv = result.final_period.npv;
        assert_eq!(npv.n, 2_000);
        assert!(npv.p10.unwrap() < npv.p50.unwrap());
        assert!(npv.p50.unwrap() < npv.p90.unwrap());

        let p = result.final_period.prob_npv_positive.unwrap();
        assert!((0.0..=1.0).contains(&p));
        // benefit scale below ~0.8 or cost scale high flips the sign
        assert!(p > 0.0 && p < 1.0, "expected mixed outcomes, got {p}");
    }

    #[test]
    fn rows_are_sorted_and_shape_is_stable() {
        let mut rows = small_project();
        rows.reverse();
        rows.push(CashflowRow::new(f64::NAN, 1_000.0, 0.0));
        let a = run(&rows, &perturbed_config(100, 1));
        let b = run(&rows, &perturbed_config(100, 2));
        let years: Vec<f64> = a.yearly.iter().map(|y| y.year).collect();
        assert_eq!(years, vec![2026.0, 2027.0, 2028.0]);
        assert_eq!(a.yearly.len(), b.yearly.len());
        assert_eq!(a.simulations, b.simulations);
    }

    #[test]
    fn discount_rate_comes_from_rows_when_not_overridden() {
        let rows = vec![
            CashflowRow::new(1.0, 0.0, 100.0),
            CashflowRow::new(2.0, 110.0, 0.0).with_discount_rate(0.10),
        ];
        let config = SimulationConfig { simulations: 10, ..SimulationConfig::default() };
        let result = run_simulation(&rows, &config, &mut rng());
        assert_close(result.final_period.npv.p50, 0.0, 1e-9);
    }

    #[test]
    fn benefit_only_rows_have_no_bcr() {
        let rows = vec![CashflowRow::new(1.0, 10.0, 0.0), CashflowRow::new(2.0, 10.0, 0.0)];
        let result = run_simulation(&rows, &fixed_config(20, 0.1), &mut rng());
        assert!(result.yearly.iter().all(|y| y.bcr.is_empty()));
        assert_eq!(result.final_period.prob_bcr_above1, None);
        assert_eq!(result.final_period.prob_npv_positive, Some(1.0));
    }

    #[test]
    fn custom_keys_flow_through_records() {
        let records = json!([
            {"period": 1, "gain": 0, "spend": 100},
            {"period": 2, "gain": "121", "spend": 0}
        ]);
        let config = SimulationConfig {
            simulations: 5,
            year_key: "period".to_string(),
            benefit_key: "gain".to_string(),
            cost_key: "spend".to_string(),
            discount_rate: Some(0.21),
            ..SimulationConfig::default()
        };
        let result = run_simulation_from_records(&records, &config, &mut rng());
        assert_eq!(result.yearly.len(), 2);
        assert_close(result.final_period.npv.p50, 0.0, 1e-9);
        assert_close(result.final_period.irr.p50, 21.0, 1e-4);
    }

    #[test]
    fn custom_quantile_points_are_used() {
        let config = SimulationConfig { q_low: 0.0, q_high: 1.0, ..perturbed_config(500, 5) };
        let result = run(&small_project(), &config);
        let wide = result.final_period.npv;
        let narrow = run(&small_project(), &perturbed_config(500, 5)).final_period.npv;
        assert!(wide.p10.unwrap() <= narrow.p10.unwrap());
        assert!(wide.p90.unwrap() >= narrow.p90.unwrap());
        assert_eq!(wide.p50, narrow.p50);
    }
}
