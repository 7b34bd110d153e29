// Synthetic backfill workload
//
// Design Decision: Each backfill owns an RNG seeded from --seed, its connection
// and its partition.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use partition_backfill::prelude::*;
use partition_backfill::scheduler::SchedulerStats;
use partition_backfill::tracker::TrackerStats;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Workload shape
#[derive(Debug, Clone, Serialize)]
pub struct Workload {
    pub connections: usize,
    pub partitions: u16,
    pub runs: u32,
    pub snooze_ratio: f64,
    pub seed: u64,
}

/// Outcome of a simulation
#[derive(Debug, Serialize)]
pub struct SimReport {
    pub workload: Workload,
    pub config: BackfillConfig,
    pub schedulers: Vec<SchedulerStats>,
    pub drivers: Vec<DriverSummary>,
    pub tracker: TrackerStats,
    /// Every admitted backfill released its slot
    pub balanced: bool,
    pub elapsed_ms: u64,
}

/// Backfill that succeeds `remaining` times, snoozing at random in between
struct SyntheticBackfill {
    partition: PartitionId,
    remaining: u32,
    snooze_ratio: f64,
    rng: StdRng,
}

impl Backfill for SyntheticBackfill {
    fn run(&mut self) -> Result<RunOutcome, BackfillError> {
        if self.remaining == 0 {
            return Ok(RunOutcome::Finished);
        }
        if self.snooze_ratio > 0.0 && self.rng.gen_bool(self.snooze_ratio) {
            return Ok(RunOutcome::Snooze);
        }
        self.remaining -= 1;
        Ok(RunOutcome::Success)
    }

    fn cancel(&mut self) {
        self.remaining = 0;
    }

    fn partition_id(&self) -> PartitionId {
        self.partition
    }

    fn is_source_dead(&self) -> bool {
        false
    }
}

/// Drive every connection's backfills to completion
pub async fn run(workload: Workload, config: BackfillConfig) -> Result<SimReport> {
    config.validate().context("invalid backfill configuration")?;

    let tracker = Arc::new(AdmissionTracker::new(config.admission.clone()));
    tracing::info!(
        connections = workload.connections,
        partitions = workload.partitions,
        max_running = tracker.max_running(),
        order = %config.order,
        "Starting backfill simulation"
    );

    let started = Instant::now();
    let mut schedulers = Vec::with_capacity(workload.connections);
    let mut handles = Vec::with_capacity(workload.connections);

    for connection in 0..workload.connections {
        let scheduler = Arc::new(BackfillScheduler::new(
            tracker.clone(),
            config.scheduler(format!("replica-{connection}")),
        ));

        for partition in 0..workload.partitions {
            let seed = workload
                .seed
                .wrapping_add((connection as u64) << 16)
                .wrapping_add(u64::from(partition));
            scheduler.schedule(SyntheticBackfill {
                partition: PartitionId::new(partition),
                remaining: workload.runs,
                snooze_ratio: workload.snooze_ratio,
                rng: StdRng::seed_from_u64(seed),
            });
        }

        let driver_config = config.driver.clone().with_stop_when_idle(true);
        handles.push(
            SchedulerDriver::new(scheduler.clone(), driver_config)
                .with_tracker(tracker.clone())
                .spawn(),
        );
        schedulers.push(scheduler);
    }

    let mut drivers = Vec::with_capacity(handles.len());
    for handle in handles {
        drivers.push(handle.join().await.context("scheduler driver failed")?);
    }

    let scheduler_stats: Vec<_> = schedulers.iter().map(|s| s.stats()).collect();
    drop(schedulers);

    let tracker_stats = tracker.stats();
    let balanced = tracker_stats.admitted == tracker_stats.released
        && tracker_stats.running == 0
        && tracker_stats.invalid_releases == 0;
    if !balanced {
        tracing::error!(
            admitted = tracker_stats.admitted,
            released = tracker_stats.released,
            "Admission slots leaked"
        );
    }

    Ok(SimReport {
        workload,
        config,
        schedulers: scheduler_stats,
        drivers,
        tracker: tracker_stats,
        balanced,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

/// Snooze cooldown suitable for a simulation that should finish quickly
pub fn default_cooldown() -> Duration {
    Duration::from_millis(5)
}
