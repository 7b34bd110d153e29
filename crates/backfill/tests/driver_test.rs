// Integration tests for SchedulerDriver
//
// Run with: cargo test -p partition-backfill --test driver_test

mod common;

use std::time::Duration;

use common::{run_log, ScriptedBackfill};
use partition_backfill::prelude::*;

fn fast_driver() -> DriverConfig {
    DriverConfig::new()
        .with_min_interval(Duration::from_millis(1))
        .with_max_interval(Duration::from_millis(20))
}

#[tokio::test]
async fn test_driver_drains_scheduler() {
    let tracker = Arc::new(AdmissionTracker::with_max_running(2));
    let scheduler = Arc::new(BackfillScheduler::new(
        tracker.clone(),
        SchedulerConfig::new("driven"),
    ));
    let log = run_log();

    for partition in 0..5 {
        scheduler.schedule(ScriptedBackfill::new(partition, &log).successes(3));
    }

    let handle = SchedulerDriver::new(scheduler.clone(), fast_driver().with_stop_when_idle(true))
        .with_tracker(tracker.clone())
        .spawn();
    let summary = tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("driver did not drain")
        .expect("driver task failed");

    assert!(summary.steps >= 20);
    assert_eq!(log.lock().len(), 20);
    assert!(!scheduler.has_work());

    let stats = tracker.stats();
    assert_eq!(stats.admitted, 5);
    assert_eq!(stats.released, 5);
    assert_eq!(stats.running, 0);
}

#[test_log::test(tokio::test)]
async fn test_idle_driver_wakes_on_schedule() {
    let tracker = Arc::new(AdmissionTracker::with_max_running(4));
    let scheduler = Arc::new(BackfillScheduler::new(
        tracker.clone(),
        SchedulerConfig::new("driven"),
    ));
    let log = run_log();

    let handle = SchedulerDriver::new(scheduler.clone(), fast_driver()).spawn();
    tokio::task::yield_now().await;

    scheduler.schedule(ScriptedBackfill::new(9, &log).successes(1));

    tokio::time::timeout(Duration::from_secs(5), async {
        while tracker.stats().released < 1 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("backfill was not driven");

    let summary = handle.shutdown().await.expect("driver task failed");
    assert!(summary.idle_waits >= 1);
    assert_eq!(*log.lock(), vec![9, 9]);
}

#[tokio::test]
async fn test_driver_retries_snoozed_backfill_after_cooldown() {
    let tracker = Arc::new(AdmissionTracker::with_max_running(1));
    let scheduler = Arc::new(BackfillScheduler::new(
        tracker.clone(),
        SchedulerConfig::new("driven").with_snooze(SnoozeConfig::cooldown(Duration::from_millis(15))),
    ));
    let log = run_log();

    scheduler.schedule(
        ScriptedBackfill::new(4, &log)
            .then(RunOutcome::Snooze)
            .then(RunOutcome::Snooze),
    );

    let handle = SchedulerDriver::new(scheduler.clone(), fast_driver().with_stop_when_idle(true))
        .with_tracker(tracker.clone())
        .spawn();
    let summary = tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("driver did not drain")
        .expect("driver task failed");

    assert!(summary.blocked >= 1);
    assert_eq!(*log.lock(), vec![4, 4, 4]);
    assert_eq!(tracker.running(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_blocked_driver() {
    let tracker = Arc::new(AdmissionTracker::with_max_running(1));
    let scheduler = Arc::new(BackfillScheduler::new(
        tracker.clone(),
        SchedulerConfig::new("driven").with_snooze(SnoozeConfig::cooldown(Duration::from_secs(3600))),
    ));
    let log = run_log();
    scheduler.schedule(ScriptedBackfill::new(1, &log).then(RunOutcome::Snooze));

    let handle = partition_backfill::driver::spawn(scheduler.clone(), fast_driver());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!handle.is_finished());

    let summary = handle.shutdown().await.expect("driver task failed");
    assert!(summary.blocked >= 1);
    assert_eq!(scheduler.queue_counts().snoozing, 1);

    // Dropping the scheduler frees the snoozing backfill's slot
    drop(scheduler);
    assert_eq!(tracker.running(), 0);
}
