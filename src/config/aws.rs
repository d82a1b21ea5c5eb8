use serde::{Deserialize, Serialize};

/// Region used when neither the CLI, the config file, nor the environment
/// names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// AWS account and endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsConfig {
    /// Region the vaults live in.
    /// When unset, resolution falls back to `AWS_DEFAULT_REGION`, then
    /// to `us-east-1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Account that owns the vaults.
    /// Default: "-" (the account of the signing credentials).
    #[serde(default = "default_account_id")]
    pub account_id: String,

    /// Custom service endpoint, for localstack-style emulators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: None,
            account_id: default_account_id(),
            endpoint_url: None,
        }
    }
}

fn default_account_id() -> String {
    "-".to_string()
}

impl AwsConfig {
    /// Resolve the effective region: CLI flag, then config file, then
    /// `AWS_DEFAULT_REGION`, then `us-east-1`.
    pub fn resolve_region(&self, cli_region: Option<&str>) -> String {
        cli_region
            .map(str::to_string)
            .or_else(|| self.region.clone())
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.account_id.is_empty() {
            return Err("aws.account_id must not be empty; use \"-\" for the caller's own account".into());
        }
        Ok(())
    }
}
