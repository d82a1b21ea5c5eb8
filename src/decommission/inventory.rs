//! Inventory retrieval for a single vault.
//!
//! Glacier only reveals a vault's contents through an asynchronous
//! inventory-retrieval job that typically takes around four hours. This
//! module initiates the job, polls its status at a fixed interval, fetches
//! the output exactly once when the job succeeds, and parses the inventory
//! document into typed records.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::glacier::{GlacierClient, GlacierError, JobStatus};

/// One archive as listed in the inventory document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveRecord {
    pub archive_id: String,
    #[serde(default)]
    pub archive_description: Option<String>,
    #[serde(default)]
    pub creation_date: Option<String>,
    #[serde(default)]
    pub size: i64,
    #[serde(rename = "SHA256TreeHash", default)]
    pub sha256_tree_hash: Option<String>,
}

/// Parsed inventory document. Archive order is the document order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VaultInventory {
    #[serde(rename = "VaultARN", default)]
    pub vault_arn: Option<String>,
    #[serde(default)]
    pub inventory_date: Option<String>,
    #[serde(default)]
    pub archive_list: Vec<ArchiveRecord>,
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to start inventory job: {0}")]
    Initiate(#[source] GlacierError),

    #[error("inventory job failed: {0}")]
    JobFailed(String),

    #[error("gave up waiting for inventory job after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("failed checking inventory job status: {0}")]
    Poll(#[source] GlacierError),

    #[error("failed fetching inventory job output: {0}")]
    Fetch(#[source] GlacierError),

    #[error("unreadable inventory payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("cancelled while waiting for inventory")]
    Cancelled,
}

/// Retrieve the full inventory of `vault`.
///
/// The job output is fetched only after a poll reports the job succeeded,
/// and only once. A transient status-check error keeps the poll loop alive;
/// a failed job or an unreadable payload fails the vault.
pub async fn retrieve_inventory(
    client: &dyn GlacierClient,
    vault: &str,
    config: &PollingConfig,
    cancel: &CancellationToken,
) -> Result<VaultInventory, InventoryError> {
    let job_id = initiate_with_retry(client, vault, config, cancel).await?;
    info!(vault, job_id, "Initiated inventory retrieval job");

    let started = tokio::time::Instant::now();
    let poll_interval = config.poll_interval();
    let max_wait = config.max_wait();

    loop {
        match client.describe_job(vault, &job_id).await {
            Ok(JobStatus::Succeeded) => break,
            Ok(JobStatus::Failed { message }) => return Err(InventoryError::JobFailed(message)),
            Ok(JobStatus::InProgress) => {}
            Err(e) if e.is_transient() => {
                warn!(vault, job_id, error = %e, "Transient error checking job status; will poll again");
            }
            Err(e) => return Err(InventoryError::Poll(e)),
        }

        if let Some(max_wait) = max_wait
            && started.elapsed() + poll_interval > max_wait
        {
            return Err(InventoryError::Timeout(max_wait));
        }

        info!(
            vault,
            job_id,
            wait_secs = poll_interval.as_secs(),
            "Job still in progress; waiting"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(InventoryError::Cancelled),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    let payload = client
        .get_job_output(vault, &job_id)
        .await
        .map_err(InventoryError::Fetch)?;

    let inventory = parse_inventory(&payload)?;
    info!(
        vault,
        job_id,
        archives = inventory.archive_list.len(),
        "Retrieved inventory"
    );
    Ok(inventory)
}

async fn initiate_with_retry(
    client: &dyn GlacierClient,
    vault: &str,
    config: &PollingConfig,
    cancel: &CancellationToken,
) -> Result<String, InventoryError> {
    let mut attempt = 0;
    loop {
        match client.initiate_inventory_job(vault).await {
            Ok(job_id) => return Ok(job_id),
            Err(e) if e.is_transient() && attempt < config.initiate_retries => {
                attempt += 1;
                warn!(vault, attempt, error = %e, "Failed to start inventory job; retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(InventoryError::Cancelled),
                    _ = tokio::time::sleep(config.initiate_retry_delay()) => {}
                }
            }
            Err(e) => return Err(InventoryError::Initiate(e)),
        }
    }
}

fn parse_inventory(payload: &[u8]) -> Result<VaultInventory, serde_json::Error> {
    let inventory: VaultInventory = serde_json::from_slice(payload)?;
    debug!(
        vault_arn = inventory.vault_arn.as_deref().unwrap_or("<unknown>"),
        inventory_date = inventory.inventory_date.as_deref().unwrap_or("<unknown>"),
        "Parsed inventory document"
    );
    Ok(inventory)
}
