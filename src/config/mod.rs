//! Configuration for the vault decommissioner.
//!
//! The tool is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax. Every section is
//! optional: running with no config file at all is supported and uses the
//! defaults below.
//!
//! # Example
//!
//! ```toml
//! [aws]
//! region = "eu-west-1"
//!
//! [run]
//! dry_run = true
//!
//! [polling]
//! poll_interval_secs = 900
//!
//! [retirement]
//! base_wait_secs = 900
//! growth = 2.0
//! ```

mod aws;
mod observability;
mod workflow;

use std::path::Path;

pub use aws::*;
pub use observability::*;
use serde::{Deserialize, Serialize};
pub use workflow::*;

/// Path tried when no `--config` flag is given.
pub const DEFAULT_CONFIG_PATH: &str = "deicer.toml";

/// Root configuration.
///
/// All sections are optional with defaults that match the reference
/// behavior of the service, so a minimal deployment needs no file at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeicerConfig {
    /// AWS account and endpoint settings.
    #[serde(default)]
    pub aws: AwsConfig,

    /// Run-level safety and concurrency settings.
    #[serde(default)]
    pub run: RunConfig,

    /// Inventory job polling.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Archive deletion pipeline.
    #[serde(default)]
    pub deletion: ArchiveDeletionConfig,

    /// Vault retirement backoff.
    #[serde(default)]
    pub retirement: RetirementConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DeicerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: DeicerConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration for a CLI invocation.
    ///
    /// An explicitly named file must exist. Without `--config`, the default
    /// path is used when present and the defaults apply otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Validate the configuration for consistency.
    fn validate(&self) -> Result<(), ConfigError> {
        self.aws.validate().map_err(ConfigError::Validation)?;
        self.run.validate().map_err(ConfigError::Validation)?;
        self.polling.validate().map_err(ConfigError::Validation)?;
        self.deletion.validate().map_err(ConfigError::Validation)?;
        self.retirement.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Commented template written by `deicer init`.
pub const EXAMPLE_CONFIG: &str = r#"# deicer configuration
#
# Every setting is optional; the values below are the defaults. Environment
# variables can be interpolated anywhere with ${VAR_NAME}.

[aws]
# Region the vaults live in. Falls back to AWS_DEFAULT_REGION, then us-east-1.
# region = "us-east-1"
# Account that owns the vaults. "-" means the account of the credentials.
account_id = "-"
# Custom endpoint for localstack-style emulators.
# endpoint_url = "http://localhost:4566"

[run]
# Log what would be deleted without issuing any delete calls.
dry_run = false
# Vaults decommissioned in parallel.
max_concurrent_vaults = 1

[polling]
# Seconds between inventory job status checks.
poll_interval_secs = 900
# Hours to wait for a single job before giving up on the vault. 0 = forever.
max_wait_hours = 0
# Immediate retries when starting the inventory job fails transiently.
initiate_retries = 1
initiate_retry_delay_secs = 5

[deletion]
# Immediate retries per archive on transient errors.
retries_per_archive = 2
# Archive deletions in flight at once.
max_concurrent_deletes = 1

[retirement]
# Seconds before the second vault deletion attempt; later waits grow by
# `growth` each time and are never capped.
base_wait_secs = 900
growth = 2.0
# Attempts before abandoning the vault. 0 = keep trying.
max_attempts = 0

[logging]
level = "info"          # trace | debug | info | warn | error
format = "compact"      # pretty | compact | json
timestamps = true
"#;

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let whole = cap.get(0).unwrap();

            // Leave variables inside comments untouched
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
