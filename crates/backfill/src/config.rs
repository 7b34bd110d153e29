//! Top-level configuration
//!
//! Groups tracker, scheduler, and driver settings and loads them from
//! `BACKFILL_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::DriverConfig;
use crate::scheduler::{BufferConfig, ScheduleOrder, SnoozeConfig};
use crate::tracker::AdmissionConfig;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent
    #[error("invalid backfill configuration: {0}")]
    Invalid(String),

    /// An environment variable could not be parsed
    #[error("invalid value for {var}: '{value}'")]
    Env { var: String, value: String },
}

impl ConfigError {
    /// Create an invalid-configuration error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Complete backfill configuration
///
/// # Example
///
/// ```
/// use partition_backfill::config::BackfillConfig;
/// use partition_backfill::scheduler::ScheduleOrder;
///
/// let config = BackfillConfig::default()
///     .with_max_running(16)
///     .with_order(ScheduleOrder::Sequential);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackfillConfig {
    /// Bucket-wide admission ceiling
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Initial order for new schedulers
    #[serde(default)]
    pub order: ScheduleOrder,

    /// Snooze wake-up policy for new schedulers
    #[serde(default)]
    pub snooze: SnoozeConfig,

    /// Read-ahead buffer for new schedulers
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Driver loop timing
    #[serde(default)]
    pub driver: DriverConfig,
}

impl BackfillConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `BACKFILL_MAX_RUNNING`: Fixed admission ceiling
    /// - `BACKFILL_MEMORY_QUOTA`: Bucket memory quota in bytes (derives the ceiling)
    /// - `BACKFILL_ORDER`: `round-robin` or `sequential`
    /// - `BACKFILL_SNOOZE_COOLDOWN_MS`: Snooze cooldown (0 wakes when idle)
    /// - `BACKFILL_BUFFER_BYTES`: Read-ahead budget per scheduler
    /// - `BACKFILL_DRIVER_MIN_INTERVAL_MS`: Shortest driver back-off
    /// - `BACKFILL_DRIVER_MAX_INTERVAL_MS`: Longest driver back-off
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(max) = env_parse::<usize>("BACKFILL_MAX_RUNNING")? {
            config.admission.max_running = max;
        }
        config.admission.memory_quota = env_parse::<u64>("BACKFILL_MEMORY_QUOTA")?;
        if let Some(order) = env_parse::<ScheduleOrder>("BACKFILL_ORDER")? {
            config.order = order;
        }
        if let Some(ms) = env_parse::<u64>("BACKFILL_SNOOZE_COOLDOWN_MS")? {
            config.snooze = SnoozeConfig::cooldown(Duration::from_millis(ms));
        }
        if let Some(bytes) = env_parse::<usize>("BACKFILL_BUFFER_BYTES")? {
            config.buffer.max_bytes = bytes;
        }
        if let Some(ms) = env_parse::<u64>("BACKFILL_DRIVER_MIN_INTERVAL_MS")? {
            config.driver.min_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("BACKFILL_DRIVER_MAX_INTERVAL_MS")? {
            config.driver.max_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set a fixed admission ceiling
    pub fn with_max_running(mut self, max: usize) -> Self {
        self.admission = self.admission.with_max_running(max);
        self
    }

    /// Derive the admission ceiling from a memory quota
    pub fn with_memory_quota(mut self, bytes: u64) -> Self {
        self.admission = self.admission.with_memory_quota(bytes);
        self
    }

    /// Set the initial schedule order
    pub fn with_order(mut self, order: ScheduleOrder) -> Self {
        self.order = order;
        self
    }

    /// Set the snooze policy
    pub fn with_snooze(mut self, snooze: SnoozeConfig) -> Self {
        self.snooze = snooze;
        self
    }

    /// Set the read-ahead budget
    pub fn with_buffer_bytes(mut self, max_bytes: usize) -> Self {
        self.buffer = BufferConfig { max_bytes };
        self
    }

    /// Set the driver configuration
    pub fn with_driver(mut self, driver: DriverConfig) -> Self {
        self.driver = driver;
        self
    }

    /// Scheduler configuration for a named connection
    pub fn scheduler(&self, name: impl Into<String>) -> crate::scheduler::SchedulerConfig {
        crate::scheduler::SchedulerConfig::new(name)
            .with_order(self.order)
            .with_snooze(self.snooze)
            .with_buffer_bytes(self.buffer.max_bytes)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.admission.validate()?;
        if self.buffer.max_bytes == 0 {
            return Err(ConfigError::invalid("buffer max_bytes must be non-zero"));
        }
        self.driver.validate()
    }
}

fn env_parse<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::MAX_RUNNING_CEILING;

    #[test]
    fn test_default_config() {
        let config = BackfillConfig::default();
        assert_eq!(config.admission.effective_max_running(), MAX_RUNNING_CEILING);
        assert_eq!(config.order, ScheduleOrder::RoundRobin);
        assert_eq!(config.snooze, SnoozeConfig::cooldown(Duration::from_secs(1)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = BackfillConfig::new()
            .with_max_running(8)
            .with_order(ScheduleOrder::Sequential)
            .with_snooze(SnoozeConfig::WhenIdle)
            .with_buffer_bytes(1024);

        assert_eq!(config.admission.effective_max_running(), 8);
        let scheduler = config.scheduler("replica-1");
        assert_eq!(scheduler.name, "replica-1");
        assert_eq!(scheduler.order, ScheduleOrder::Sequential);
        assert_eq!(scheduler.snooze, SnoozeConfig::WhenIdle);
        assert_eq!(scheduler.buffer.max_bytes, 1024);
    }

    #[test]
    fn test_validation_rejects_zero_buffer() {
        let config = BackfillConfig::new().with_buffer_bytes(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_parse_reports_variable() {
        // Unique variable names keep this test independent of the others
        env::set_var("BACKFILL_TEST_PARSE_BAD", "lots");
        let err = env_parse::<usize>("BACKFILL_TEST_PARSE_BAD").unwrap_err();
        assert_eq!(
            err,
            ConfigError::Env {
                var: "BACKFILL_TEST_PARSE_BAD".to_string(),
                value: "lots".to_string(),
            }
        );

        env::set_var("BACKFILL_TEST_PARSE_GOOD", " 12 ");
        assert_eq!(env_parse::<usize>("BACKFILL_TEST_PARSE_GOOD").unwrap(), Some(12));
        assert_eq!(env_parse::<usize>("BACKFILL_TEST_PARSE_UNSET").unwrap(), None);
    }

    #[test]
    fn test_serialization() {
        let config = BackfillConfig::new()
            .with_memory_quota(1 << 30)
            .with_snooze(SnoozeConfig::cooldown(Duration::from_millis(200)));

        let json = serde_json::to_string(&config).unwrap();
        let parsed: BackfillConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: BackfillConfig =
            serde_json::from_str(r#"{"order":"sequential"}"#).unwrap();
        assert_eq!(parsed.order, ScheduleOrder::Sequential);
        assert_eq!(parsed.buffer, BufferConfig::default());
    }
}
