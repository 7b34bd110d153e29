//! Scheduler driver task

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace};

use crate::config::{duration_millis, ConfigError};
use crate::scheduler::{BackfillScheduler, StepStatus};
use crate::tracker::AdmissionTracker;

/// Driver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverConfig {
    /// Back-off after the first blocked step
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,

    /// Longest back-off while blocked
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Back-off growth per consecutive blocked step
    pub backoff_multiplier: f64,

    /// Productive steps between cooperative yields
    pub steps_per_yield: usize,

    /// Exit once the scheduler reports idle instead of waiting for work
    #[serde(default)]
    pub stop_when_idle: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            steps_per_yield: 64,
            stop_when_idle: false,
        }
    }
}

impl DriverConfig {
    /// Create a new driver configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum back-off
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set maximum back-off
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set back-off multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Set productive steps between yields
    pub fn with_steps_per_yield(mut self, steps: usize) -> Self {
        self.steps_per_yield = steps.max(1);
        self
    }

    /// Exit when the scheduler drains
    pub fn with_stop_when_idle(mut self, stop: bool) -> Self {
        self.stop_when_idle = stop;
        self
    }

    /// Back-off following `current`
    pub fn next_interval(&self, current: Duration) -> Duration {
        Duration::from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .min(self.max_interval)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval > self.max_interval {
            return Err(ConfigError::invalid(
                "driver min_interval must not exceed max_interval",
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "driver backoff_multiplier must be at least 1.0",
            ));
        }
        if self.steps_per_yield == 0 {
            return Err(ConfigError::invalid("driver steps_per_yield must be non-zero"));
        }
        Ok(())
    }
}

/// What a driver did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSummary {
    /// `step` calls made
    pub steps: u64,
    /// Steps that reported `Blocked`
    pub blocked: u64,
    /// Times the driver waited on an idle scheduler
    pub idle_waits: u64,
}

/// Driver errors
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The driver task panicked or was aborted
    #[error("driver task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Steps a [`BackfillScheduler`] until shut down
pub struct SchedulerDriver {
    scheduler: Arc<BackfillScheduler>,
    tracker: Option<Arc<AdmissionTracker>>,
    config: DriverConfig,
}

impl SchedulerDriver {
    /// Create a driver for `scheduler`
    pub fn new(scheduler: Arc<BackfillScheduler>, config: DriverConfig) -> Self {
        Self {
            scheduler,
            tracker: None,
            config,
        }
    }

    /// Wake early when `tracker` releases a slot
    pub fn with_tracker(mut self, tracker: Arc<AdmissionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Spawn the driver loop on the current tokio runtime
    pub fn spawn(self) -> DriverHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(shutdown_rx));
        DriverHandle {
            shutdown_tx,
            handle,
        }
    }

    #[instrument(skip_all, fields(scheduler = %self.scheduler.name()))]
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> DriverSummary {
        let mut summary = DriverSummary::default();
        let mut interval = self.config.min_interval;
        let mut since_yield = 0;

        loop {
            if *shutdown_rx.borrow() {
                debug!("Driver: shutdown requested");
                break;
            }

            let status = self.scheduler.step();
            summary.steps += 1;

            match status {
                StepStatus::MoreWork => {
                    interval = self.config.min_interval;
                    since_yield += 1;
                    if since_yield >= self.config.steps_per_yield {
                        since_yield = 0;
                        tokio::task::yield_now().await;
                    }
                }
                StepStatus::Busy => tokio::task::yield_now().await,
                StepStatus::Blocked => {
                    summary.blocked += 1;
                    trace!(interval_ms = interval.as_millis() as u64, "Scheduler blocked, backing off");
                    if self.wait(Some(interval), &mut shutdown_rx).await {
                        break;
                    }
                    interval = self.config.next_interval(interval);
                }
                StepStatus::Idle => {
                    interval = self.config.min_interval;
                    if self.config.stop_when_idle {
                        debug!("Driver: scheduler drained");
                        break;
                    }
                    summary.idle_waits += 1;
                    if self.wait(None, &mut shutdown_rx).await {
                        break;
                    }
                }
            }
        }

        debug!(steps = summary.steps, blocked = summary.blocked, "Driver exited");
        summary
    }

    /// Wait for a reason to step again; returns true on shutdown
    async fn wait(&self, timeout: Option<Duration>, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        let capacity = async {
            match &self.tracker {
                Some(tracker) => tracker.capacity_released().await,
                None => std::future::pending().await,
            }
        };
        let sleep = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = self.scheduler.work_notify().notified() => false,
            _ = self.scheduler.buffer().drained().notified() => false,
            _ = capacity => false,
            _ = sleep => false,
            _ = shutdown_rx.changed() => true,
        }
    }
}

/// Spawn a driver for `scheduler` on the current tokio runtime
pub fn spawn(scheduler: Arc<BackfillScheduler>, config: DriverConfig) -> DriverHandle {
    SchedulerDriver::new(scheduler, config).spawn()
}

/// Handle to a spawned [`SchedulerDriver`]
pub struct DriverHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<DriverSummary>,
}

impl DriverHandle {
    /// Whether the driver loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the driver to exit on its own (see `stop_when_idle`)
    pub async fn join(self) -> Result<DriverSummary, DriverError> {
        Ok(self.handle.await?)
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn shutdown(self) -> Result<DriverSummary, DriverError> {
        let _ = self.shutdown_tx.send(true);
        Ok(self.handle.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.min_interval, Duration::from_millis(10));
        assert_eq!(config.max_interval, Duration::from_secs(1));
        assert!(!config.stop_when_idle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = DriverConfig::new()
            .with_min_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_millis(300))
            .with_backoff_multiplier(2.0);

        let second = config.next_interval(config.min_interval);
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(config.next_interval(second), Duration::from_millis(300));
    }

    #[test]
    fn test_config_validation() {
        let inverted = DriverConfig::new()
            .with_min_interval(Duration::from_secs(2))
            .with_max_interval(Duration::from_secs(1));
        assert!(inverted.validate().is_err());

        let mut zero_yield = DriverConfig::new();
        zero_yield.steps_per_yield = 0;
        assert!(zero_yield.validate().is_err());
    }

    #[test]
    fn test_serialization() {
        let config = DriverConfig::new().with_stop_when_idle(true);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DriverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
