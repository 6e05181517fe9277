//! BotRace Simulator CLI
//!
//! Run race scenarios on a virtual clock.

use anyhow::{bail, Context, Result};
use botrace_core::RaceConfig;
use botrace_sim::scenarios::ScenarioId;
use botrace_sim::{ScenarioResult, ScenarioRunner};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// BotRace simulation CLI
#[derive(Parser, Debug)]
#[command(name = "botrace-sim")]
#[command(about = "Run activity-driven race simulations on a virtual clock", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (single_race, marathon, roster_outage, flaky_feed, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of races (defaults to the scenario's own)
    #[arg(short, long)]
    races: Option<usize>,

    /// Number of consecutive seeds to test
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Maximum simulated seconds per race
    #[arg(short, long, default_value = "600")]
    duration: f64,

    /// Race configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export race frames to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    if !args.json {
        info!("BotRace Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let config = match &args.config {
        Some(path) => RaceConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RaceConfig::default(),
    };

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        let scenario = args.scenario.parse::<ScenarioId>().map_err(|e: String| {
            anyhow::anyhow!(
                "{} (available: single_race, marathon, roster_outage, flaky_feed, all)",
                e
            )
        })?;
        vec![scenario]
    };

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        bail!("--export only supports a single scenario and seed");
    }

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .context("System clock before UNIX epoch")?
            .as_nanos() as u64
    } else {
        args.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        for scenario in &scenarios {
            let mut runner = ScenarioRunner::new(seed)
                .with_config(config.clone())
                .with_duration(args.duration);
            if let Some(races) = args.races {
                runner = runner.with_races(races);
            }
            if let Some(path) = &args.export {
                runner = runner.with_export(path.clone());
            }

            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED: {} races, {} finishes, {} ties",
                        scenario.name(),
                        seed,
                        result.races_completed,
                        result.metrics.finishes,
                        result.metrics.ties
                    );
                    for race in &result.races {
                        let winners: Vec<&str> =
                            race.winners.iter().map(|w| w.name.as_str()).collect();
                        info!("    Race #{}: {}", race.race_number, winners.join(" & "));
                    }
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed: Vec<&ScenarioResult> = all_results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "races": r.races_completed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "derivation_failures": r.metrics.derivation_failures,
                    "batches_discarded": r.metrics.batches_discarded,
                    "winners": r.races.iter().map(|race| {
                        race.winners.iter().map(|w| w.name.clone()).collect::<Vec<_>>()
                    }).collect::<Vec<_>>(),
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if !failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
