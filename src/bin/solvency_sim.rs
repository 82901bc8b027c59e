//! Solvency Scenario Runner
//!
//! Replays a market scenario against an in-memory ledger on a simulated
//! clock and prints the recorded history and any risk alerts.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin solvency-sim -- --scenario crash
//! cargo run --bin solvency-sim -- --scenario random-walk --steps 48 --seed 7 --output report.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use solvency_ledger::clock::format_timestamp;
use solvency_ledger::history::HistoryConfig;
use solvency_ledger::simulation::{HarnessConfig, Scenario, SimulationHarness, DEFAULT_SIM_START};
use solvency_ledger::AlertThresholds;

#[derive(Parser, Debug)]
#[command(name = "solvency-sim")]
#[command(about = "Run solvency scenarios against a simulated ledger")]
struct Args {
    /// crash, volatility or random-walk
    #[arg(long, default_value = "crash")]
    scenario: Scenario,

    /// RNG seed for the random walk
    #[arg(long, env = "SOLVENCY_SIM_SEED", default_value = "42")]
    seed: u64,

    /// Random-walk steps
    #[arg(long, default_value = "24")]
    steps: u32,

    /// Random-walk per-step price move bound (bps)
    #[arg(long, default_value = "500")]
    max_move_bps: u64,

    /// History capacity
    #[arg(long, default_value = "1000")]
    max_entries: usize,

    /// Minimum seconds between history points
    #[arg(long, default_value = "3600")]
    min_interval_secs: u64,

    /// Write the JSON report here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the final ledger export here
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("solvency_ledger=info,solvency_sim=info")),
        )
        .init();

    let args = Args::parse();

    let config = HarnessConfig {
        seed: args.seed,
        start: DEFAULT_SIM_START,
        history: HistoryConfig {
            max_entries: args.max_entries,
            min_interval_secs: args.min_interval_secs,
        },
        alerts: AlertThresholds::default(),
        steps: args.steps,
        max_move_bps: args.max_move_bps,
    };

    eprintln!("Solvency Scenario Runner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("  Scenario: {}", args.scenario.as_str());
    eprintln!("  Seed:     {}", args.seed);

    let mut harness = SimulationHarness::new(config).context("Invalid harness configuration")?;
    let mut alerts_rx = harness.ledger().subscribe();
    let report = harness.run(args.scenario)?;

    println!();
    println!("{:<27} {:>10} {:>12}", "timestamp", "ratio", "solvent");
    for entry in &report.history {
        println!(
            "{:<27} {:>10} {:>12}",
            format_timestamp(entry.timestamp),
            entry.ratio.to_percent_string(),
            entry.assets.total_value() >= entry.liabilities.total_value()
        );
    }

    println!();
    let mut delivered = 0usize;
    while let Ok(alert) = alerts_rx.try_recv() {
        delivered += 1;
        println!(
            "ALERT {:<18} ratio={:<10} threshold={:<6} {} -> {}",
            alert.kind.as_str(),
            alert.current_value.to_percent_string(),
            alert.threshold,
            alert
                .previous_band
                .map(|b| b.as_str())
                .unwrap_or("-"),
            alert.band
        );
    }
    if delivered == 0 {
        println!("No alerts");
    }

    let metrics = &report.final_metrics;
    println!();
    println!("Final ratio:  {}", metrics.ratio_percent);
    println!("Final band:   {}", metrics.band);
    println!("Solvent:      {}", metrics.is_solvent);
    println!("Updates:      {}", report.updates);

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        eprintln!("Report written to: {}", path.display());
    }

    if let Some(path) = &args.export {
        harness.ledger().export().save(path)?;
        eprintln!("Ledger export written to: {}", path.display());
    }

    info!(scenario = args.scenario.as_str(), alerts = delivered, "Scenario complete");
    Ok(())
}
