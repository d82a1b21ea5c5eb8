//! Amazon S3 Glacier client seam.
//!
//! The decommissioning engine talks to Glacier exclusively through the
//! [`GlacierClient`] trait, which covers the six operations the workflow
//! needs and nothing else. Two implementations exist:
//!
//! - [`aws::SdkGlacierClient`]: the production client over the AWS SDK
//! - [`memory::MemoryGlacierClient`]: an in-memory fake for tests

pub mod aws;
#[cfg(test)]
pub mod memory;

pub use aws::SdkGlacierClient;
#[cfg(test)]
pub use memory::{GlacierOp, MemoryArchive, MemoryGlacierClient, MemoryVaultSpec, RecordedCall};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Errors returned by Glacier operations, classified for retry decisions.
///
/// `Throttled`, `Unavailable` and `Network` are transient in the usual
/// sense. `VaultNotEmpty` is Glacier's refusal to delete a vault that still
/// holds archives as of its last inventory or was recently written to; it
/// resolves on the provider's own schedule and is retried with backoff
/// rather than immediately.
#[derive(Debug, Error)]
pub enum GlacierError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("vault not empty or recently written: {0}")]
    VaultNotEmpty(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("service error: {0}")]
    Service(String),
}

impl GlacierError {
    /// Whether retrying the same call can reasonably be expected to succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GlacierError::VaultNotEmpty(_)
                | GlacierError::Throttled(_)
                | GlacierError::Unavailable(_)
                | GlacierError::Network(_)
        )
    }
}

pub type GlacierResult<T> = Result<T, GlacierError>;

/// Status of an asynchronous Glacier job, mirroring the provider's
/// `StatusCode`. Glacier exposes no progress signal beyond these three
/// states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed { message: String },
}

/// One vault as returned by vault enumeration.
///
/// Archive count and size reflect the vault's last provider-side inventory,
/// which may lag reality by up to a day.
#[derive(Debug, Clone, Serialize)]
pub struct VaultSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_inventory_date: Option<DateTime<Utc>>,
    pub number_of_archives: i64,
    pub size_in_bytes: i64,
}

/// Handle to the Glacier API, scoped to one account and region.
#[async_trait]
pub trait GlacierClient: Send + Sync {
    /// Enumerate every vault in the account, following pagination to the end.
    async fn list_vaults(&self) -> GlacierResult<Vec<VaultSummary>>;

    /// Start an inventory-retrieval job for a vault. Returns the job id.
    async fn initiate_inventory_job(&self, vault: &str) -> GlacierResult<String>;

    /// Query the status of a previously initiated job.
    async fn describe_job(&self, vault: &str, job_id: &str) -> GlacierResult<JobStatus>;

    /// Fetch the output payload of a completed job.
    async fn get_job_output(&self, vault: &str, job_id: &str) -> GlacierResult<Bytes>;

    /// Delete a single archive from a vault.
    async fn delete_archive(&self, vault: &str, archive_id: &str) -> GlacierResult<()>;

    /// Delete a vault. Fails with [`GlacierError::VaultNotEmpty`] until the
    /// provider considers the vault empty and quiescent.
    async fn delete_vault(&self, vault: &str) -> GlacierResult<()>;
}
