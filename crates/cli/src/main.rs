// Backfill scheduling simulator
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Start from BACKFILL_* environment configuration; flags override it.

mod output;
mod sim;

use std::time::Duration;

use anyhow::{ensure, Context};
use clap::Parser;
use partition_backfill::prelude::*;
use partition_backfill::stats;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use output::{print_field, print_table_header, print_table_row, OutputFormat};

#[derive(Parser)]
#[command(name = "backfill-sim")]
#[command(about = "Simulate backfill admission and scheduling across replication connections")]
#[command(version)]
pub struct Cli {
    /// Replication connections (one scheduler each)
    #[arg(long, default_value = "4")]
    pub connections: usize,

    /// Backfills scheduled per connection
    #[arg(long, default_value = "64")]
    pub partitions: u16,

    /// Bucket-wide running backfill ceiling
    #[arg(long)]
    pub max_running: Option<usize>,

    /// Bucket memory quota in bytes (derives the ceiling)
    #[arg(long, conflicts_with = "max_running")]
    pub memory_quota: Option<u64>,

    /// Servicing order of active backfills
    #[arg(long)]
    pub order: Option<ScheduleOrder>,

    /// Successful runs before each backfill finishes
    #[arg(long, default_value = "8")]
    pub runs: u32,

    /// Probability that a run snoozes instead of progressing
    #[arg(long, default_value = "0.0")]
    pub snooze_ratio: f64,

    /// Snooze cooldown in milliseconds
    #[arg(long)]
    pub snooze_cooldown_ms: Option<u64>,

    /// RNG seed for the synthetic workload
    #[arg(long, default_value = "1")]
    pub seed: u64,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Print flat stat keys instead of tables (text output only)
    #[arg(long)]
    pub flat_stats: bool,
}

impl Cli {
    fn backfill_config(&self) -> anyhow::Result<BackfillConfig> {
        let mut config =
            BackfillConfig::from_env().context("Failed to load BACKFILL_* configuration")?;

        if let Some(max) = self.max_running {
            config = config.with_max_running(max);
        }
        if let Some(quota) = self.memory_quota {
            config = config.with_memory_quota(quota);
        }
        if let Some(order) = self.order {
            config = config.with_order(order);
        }
        let cooldown = self
            .snooze_cooldown_ms
            .map(Duration::from_millis)
            .unwrap_or_else(sim::default_cooldown);
        config = config.with_snooze(SnoozeConfig::cooldown(cooldown));

        Ok(config)
    }

    fn workload(&self) -> anyhow::Result<sim::Workload> {
        ensure!(self.connections > 0, "--connections must be at least 1");
        ensure!(
            (0.0..1.0).contains(&self.snooze_ratio),
            "--snooze-ratio must be in [0, 1)"
        );
        Ok(sim::Workload {
            connections: self.connections,
            partitions: self.partitions,
            runs: self.runs,
            snooze_ratio: self.snooze_ratio,
            seed: self.seed,
        })
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("LOG_LEVEL")
                .map(tracing_subscriber::EnvFilter::new)
        })
        .unwrap_or_else(|_| "info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let config = cli.backfill_config()?;
    let report = sim::run(cli.workload()?, config).await?;

    if !cli.output.is_text() {
        cli.output.print_value(&report)?;
    } else if cli.flat_stats {
        for scheduler in &report.schedulers {
            stats::add_scheduler_stats(scheduler, |key, value| println!("{key} {value}"));
        }
        stats::add_tracker_stats(&report.tracker, |key, value| println!("{key} {value}"));
    } else {
        print_report(&report);
    }

    ensure!(
        report.balanced,
        "admitted {} backfills but released {}",
        report.tracker.admitted,
        report.tracker.released
    );
    Ok(())
}

fn print_report(report: &sim::SimReport) {
    let columns = [
        ("SCHEDULER", 14),
        ("ORDER", 12),
        ("RUNS", 8),
        ("FINISHED", 8),
        ("FAILED", 6),
        ("STEPS", 8),
        ("BLOCKED", 8),
    ];
    print_table_header(&columns);

    for (stats, driver) in report.schedulers.iter().zip(&report.drivers) {
        let order = stats.order.to_string();
        let runs = stats.runs.to_string();
        let finished = stats.finished.to_string();
        let failed = stats.failed.to_string();
        let steps = driver.steps.to_string();
        let blocked = driver.blocked.to_string();
        print_table_row(&[
            (stats.name.as_str(), 14),
            (order.as_str(), 12),
            (runs.as_str(), 8),
            (finished.as_str(), 8),
            (failed.as_str(), 6),
            (steps.as_str(), 8),
            (blocked.as_str(), 8),
        ]);
    }

    println!();
    let tracker = &report.tracker;
    print_field("Max running", &tracker.max_running.to_string());
    print_field("Admitted", &tracker.admitted.to_string());
    print_field("Released", &tracker.released.to_string());
    print_field("Denied", &tracker.denied.to_string());
    print_field("Elapsed", &format!("{} ms", report.elapsed_ms));
    print_field(
        "Slots",
        if report.balanced { "balanced" } else { "LEAKED" },
    );
}
