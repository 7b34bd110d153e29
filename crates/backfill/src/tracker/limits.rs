//! Admission ceiling configuration

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Estimated file memory a single running backfill pins
pub const FILE_MEMORY_PER_BACKFILL: u64 = 10 * 1024;

/// Upper bound on concurrent backfills irrespective of memory
pub const MAX_RUNNING_CEILING: usize = 4096;

/// Share of the bucket memory quota backfills may occupy, in percent
pub const MEMORY_QUOTA_PERCENT: u64 = 1;

/// Admission tracker configuration
///
/// # Example
///
/// ```
/// use partition_backfill::tracker::AdmissionConfig;
///
/// let config = AdmissionConfig::default().with_memory_quota(1024 * 1024 * 1024);
/// assert_eq!(config.effective_max_running(), 1048);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Maximum concurrently admitted backfills when no quota is set
    pub max_running: usize,

    /// Bucket memory quota in bytes; overrides `max_running` when set
    #[serde(default)]
    pub memory_quota: Option<u64>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_running: MAX_RUNNING_CEILING,
            memory_quota: None,
        }
    }
}

impl AdmissionConfig {
    /// Create a new admission configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fixed ceiling
    pub fn with_max_running(mut self, max: usize) -> Self {
        self.max_running = max;
        self
    }

    /// Derive the ceiling from a bucket memory quota
    pub fn with_memory_quota(mut self, bytes: u64) -> Self {
        self.memory_quota = Some(bytes);
        self
    }

    /// The ceiling the tracker should enforce
    pub fn effective_max_running(&self) -> usize {
        match self.memory_quota {
            Some(quota) => Self::max_running_for_quota(quota),
            None => self.max_running.max(1),
        }
    }

    /// Ceiling for a memory quota: 1% of the quota divided by the per-backfill
    /// file memory estimate, clamped to `1..=MAX_RUNNING_CEILING`
    pub fn max_running_for_quota(quota: u64) -> usize {
        let budget = quota / 100 * MEMORY_QUOTA_PERCENT;
        let max = budget / FILE_MEMORY_PER_BACKFILL;
        (max.min(MAX_RUNNING_CEILING as u64) as usize).max(1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_quota.is_none() && self.max_running == 0 {
            return Err(ConfigError::invalid("max_running must be at least 1"));
        }
        if self.memory_quota == Some(0) {
            return Err(ConfigError::invalid("memory_quota must be non-zero"));
        }
        Ok(())
    }
}
