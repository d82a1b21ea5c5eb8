//! Workflow pacing and safety settings.
//!
//! Glacier inventory jobs run for hours, so the pacing knobs here default to
//! the reference values the service is documented around (15-minute status
//! polls, a 15-minute base wait before re-attempting vault deletion). Tests
//! inject compressed values through the same structs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

/// Run-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// If true, log what would be deleted without issuing any delete calls.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Vaults decommissioned in parallel.
    /// Default: 1 (strictly sequential, one vault at a time)
    #[serde(default = "default_max_concurrent_vaults")]
    pub max_concurrent_vaults: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_concurrent_vaults: default_max_concurrent_vaults(),
        }
    }
}

fn default_max_concurrent_vaults() -> usize {
    1
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_vaults == 0 {
            return Err("run.max_concurrent_vaults must be at least 1".into());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inventory polling
// ─────────────────────────────────────────────────────────────────────────────

/// Inventory job polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingConfig {
    /// Seconds between job status checks.
    /// Default: 900 (15 minutes; inventory jobs typically take ~4 hours)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Hours to wait for a single job before giving up on the vault.
    /// Set to 0 to wait indefinitely.
    /// Default: 0
    #[serde(default)]
    pub max_wait_hours: u64,

    /// Immediate retries when starting the inventory job fails on a
    /// transient error.
    /// Default: 1
    #[serde(default = "default_initiate_retries")]
    pub initiate_retries: u32,

    /// Seconds between those initiation retries.
    /// Default: 5
    #[serde(default = "default_initiate_retry_delay_secs")]
    pub initiate_retry_delay_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_hours: 0,
            initiate_retries: default_initiate_retries(),
            initiate_retry_delay_secs: default_initiate_retry_delay_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    900
}

fn default_initiate_retries() -> u32 {
    1
}

fn default_initiate_retry_delay_secs() -> u64 {
    5
}

impl PollingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Deadline for the whole wait, or `None` for unbounded waiting.
    pub fn max_wait(&self) -> Option<Duration> {
        (self.max_wait_hours > 0).then(|| Duration::from_secs(self.max_wait_hours * 3600))
    }

    pub fn initiate_retry_delay(&self) -> Duration {
        Duration::from_secs(self.initiate_retry_delay_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_secs == 0 {
            return Err("polling.poll_interval_secs must be at least 1".into());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Archive deletion
// ─────────────────────────────────────────────────────────────────────────────

/// Archive deletion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveDeletionConfig {
    /// Immediate retries per archive on transient errors. Retries carry no
    /// backoff; a persistently failing archive is recorded and skipped.
    /// Default: 2
    #[serde(default = "default_retries_per_archive")]
    pub retries_per_archive: u32,

    /// Archive deletions in flight at once. Deletes are issued in inventory
    /// order regardless of this setting.
    /// Default: 1
    #[serde(default = "default_max_concurrent_deletes")]
    pub max_concurrent_deletes: usize,
}

impl Default for ArchiveDeletionConfig {
    fn default() -> Self {
        Self {
            retries_per_archive: default_retries_per_archive(),
            max_concurrent_deletes: default_max_concurrent_deletes(),
        }
    }
}

fn default_retries_per_archive() -> u32 {
    2
}

fn default_max_concurrent_deletes() -> usize {
    1
}

impl ArchiveDeletionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_deletes == 0 {
            return Err("deletion.max_concurrent_deletes must be at least 1".into());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vault retirement
// ─────────────────────────────────────────────────────────────────────────────

/// Vault retirement backoff.
///
/// Glacier refuses to delete a vault that was written to since its last
/// inventory, and the refusal clears on the service's own schedule, so the
/// waits between attempts must keep growing: `wait(n) = base × growth^(n-1)`,
/// uncapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetirementConfig {
    /// Seconds before the second deletion attempt.
    /// Default: 900
    #[serde(default = "default_base_wait_secs")]
    pub base_wait_secs: u64,

    /// Growth factor between consecutive waits. Must be greater than 1.
    /// Default: 2.0
    #[serde(default = "default_growth")]
    pub growth: f64,

    /// Deletion attempts before abandoning the vault.
    /// Set to 0 to keep trying until a permanent error.
    /// Default: 0
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for RetirementConfig {
    fn default() -> Self {
        Self {
            base_wait_secs: default_base_wait_secs(),
            growth: default_growth(),
            max_attempts: 0,
        }
    }
}

fn default_base_wait_secs() -> u64 {
    900
}

fn default_growth() -> f64 {
    2.0
}

impl RetirementConfig {
    /// Wait after failed attempt `attempt` (1-based) before the next one.
    pub fn wait_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let millis = (self.base_wait_secs as f64) * 1000.0 * self.growth.powi(exponent as i32);
        Duration::from_millis(millis as u64)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows_attempt(&self, attempts: u32) -> bool {
        self.max_attempts == 0 || attempts < self.max_attempts
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_wait_secs == 0 {
            return Err("retirement.base_wait_secs must be at least 1".into());
        }
        if self.growth <= 1.0 {
            return Err("retirement.growth must be greater than 1.0 so waits keep increasing".into());
        }
        Ok(())
    }
}
