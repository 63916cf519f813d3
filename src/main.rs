use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roisim::cashflow::{parse_records, rows_from_records};
use roisim::config::{DEFAULT_DISCOUNT_RATE, SimulationConfig};
use roisim::finance::{irr, mirr, npv_discrete_cumulative};
use roisim::loss::{LossOptions, avloss};
use roisim::simulation::{self, SimulationResult, YearSummary};
use roisim::stats::QuantileSummary;

#[derive(Parser)]
#[command(name = "roisim", about = "Monte Carlo ROI and loss-reduction estimates for project cashflows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate NPV, BCR, IRR and MIRR distributions over cashflow rows.
    Simulate {
        /// Cashflow rows as a JSON array or NDJSON.
        #[arg(long)]
        rows: PathBuf,
        /// JSON config (camelCase keys); defaults apply to missing fields.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        simulations: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, allow_hyphen_values = true)]
        discount_rate: Option<f64>,
        /// Write the full result as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
        #[arg(long)]
        quiet: bool,
    },
    /// Estimate average loss reduction from a cut in variability.
    Avloss {
        #[arg(long)]
        cv: f64,
        #[arg(long, allow_hyphen_values = true)]
        change: f64,
        /// Treat `change` as an absolute reduction in CV.
        #[arg(long)]
        fixed: bool,
        #[arg(long, default_value_t = 1_000_000)]
        reps: usize,
        /// Use the full sample for medians instead of a 50k subsample.
        #[arg(long)]
        exact: bool,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// IRR, MIRR and cumulative NPV of a cashflow sequence.
    Irr {
        #[arg(required = true, allow_hyphen_values = true, value_delimiter = ',')]
        cashflows: Vec<f64>,
        #[arg(long, allow_hyphen_values = true, default_value_t = DEFAULT_DISCOUNT_RATE)]
        discount_rate: f64,
        #[arg(long, allow_hyphen_values = true)]
        finance_rate: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        reinvest_rate: Option<f64>,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Simulate { rows, config, simulations, seed, discount_rate, json, quiet } => {
            let mut cfg = match config {
                Some(path) => {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    SimulationConfig::from_json_str(&text)
                        .with_context(|| format!("invalid config {}", path.display()))?
                }
                None => SimulationConfig::default(),
            };
            if let Some(n) = simulations {
                cfg.simulations = n;
            }
            if seed.is_some() {
                cfg.seed = seed;
            }
            if discount_rate.is_some() {
                cfg.discount_rate = discount_rate;
            }
            cfg.validate()?;

            let text = fs::read_to_string(&rows)
                .with_context(|| format!("failed to read {}", rows.display()))?;
            let records = parse_records(&text)
                .with_context(|| format!("invalid cashflow file {}", rows.display()))?;
            let rows = rows_from_records(&records, &cfg.field_keys());
            info!(rows = rows.len(), simulations = cfg.simulations, "running simulation");

            let result = simulation::run(&rows, &cfg);

            if let Some(path) = json {
                let file = File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                serde_json::to_writer_pretty(BufWriter::new(file), &result)?;
                info!(path = %path.display(), "wrote simulation result");
            }
            if !quiet {
                print_result(&result);
            }
        }
        Command::Avloss { cv, change, fixed, reps, exact, seed } => {
            let opts = LossOptions { fixed, reps, approx: !exact };
            let seed = seed.unwrap_or_else(|| rand::rng().random());
            info!(seed, "seeding avloss rng");
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let reduction = avloss(cv, change, &opts, &mut rng);
            if reduction.is_nan() {
                println!("avloss: undefined (parameters imply a negative standard deviation)");
            } else {
                println!("avloss: {reduction:.6} ({:.2}% of baseline)", reduction * 100.0);
            }
        }
        Command::Irr { cashflows, discount_rate, finance_rate, reinvest_rate } => {
            let finance = finance_rate.unwrap_or(discount_rate);
            let reinvest = reinvest_rate.unwrap_or(discount_rate);
            println!("IRR:  {}", fmt_rate(irr(&cashflows)));
            println!("MIRR: {}", fmt_rate(mirr(&cashflows, finance, reinvest)));
            println!("\n{:>6} | {:>14} | {:>14}", "Period", "Cashflow", "Cum. NPV");
            println!("{}", "-".repeat(40));
            for (t, (cf, npv)) in
                cashflows.iter().zip(npv_discrete_cumulative(&cashflows, discount_rate)).enumerate()
            {
                println!("{t:>6} | {cf:>14.2} | {npv:>14.2}");
            }
        }
    }
    Ok(())
}

fn fmt_rate(r: Option<f64>) -> String {
    match r {
        Some(r) => format!("{:.4}%", r * 100.0),
        None => "undefined".to_string(),
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".to_string())
}

fn print_section<F>(title: &str, yearly: &[YearSummary], extract: F)
where
    F: Fn(&YearSummary) -> &QuantileSummary,
{
    println!("\n--- {title} ---");
    println!(
        "{:>8} | {:>12} | {:>12} | {:>12} | {:>12} | {:>6}",
        "Year", "low", "mid", "high", "mean", "n"
    );
    for y in yearly {
        let s = extract(y);
        println!(
            "{:>8} | {:>12} | {:>12} | {:>12} | {:>12} | {:>6}",
            y.year,
            fmt_opt(s.p10),
            fmt_opt(s.p50),
            fmt_opt(s.p90),
            fmt_opt(s.mean),
            s.n,
        );
    }
}

fn print_result(result: &SimulationResult) {
    println!("=== Cashflow simulation (N={} paths) ===", result.simulations);
    if result.yearly.is_empty() {
        println!("No cashflow rows with a finite year; nothing to simulate.");
        return;
    }

    print_section("Cumulative NPV", &result.yearly, |y| &y.npv);
    print_section("BCR", &result.yearly, |y| &y.bcr);
    print_section("IRR %", &result.yearly, |y| &y.irr);
    print_section("MIRR %", &result.yearly, |y| &y.mirr);

    let f = &result.final_period;
    let pct = |p: Option<f64>| p.map(|x| format!("{:.1}%", x * 100.0)).unwrap_or_else(|| "-".to_string());
    println!("\n=== Final period ===");
    println!("  NPV  p50: {:>12}   mean: {:>12}", fmt_opt(f.npv.p50), fmt_opt(f.npv.mean));
    println!("  BCR  p50: {:>12}   mean: {:>12}", fmt_opt(f.bcr.p50), fmt_opt(f.bcr.mean));
    println!("  IRR  p50: {:>12}   mean: {:>12}", fmt_opt(f.irr.p50), fmt_opt(f.irr.mean));
    println!("  MIRR p50: {:>12}   mean: {:>12}", fmt_opt(f.mirr.p50), fmt_opt(f.mirr.mean));
    println!("  P(NPV > 0): {}", pct(f.prob_npv_positive));
    println!("  P(BCR > 1): {}", pct(f.prob_bcr_above1));
}
