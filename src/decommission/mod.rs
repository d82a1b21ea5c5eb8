//! The decommission run: enumerate vaults, then empty and retire each one.
//!
//! Every vault goes through the same three phases in order: inventory
//! retrieval ([`inventory`]), bulk archive deletion ([`archives`]) and the
//! delete-vault backoff loop ([`retirement`]). A vault that fails is
//! recorded and skipped; it never stops the run. The run itself only
//! fails outright when the account's vaults cannot be listed at all.

mod archives;
mod inventory;
mod retirement;

pub use archives::{delete_all, DeletionSummary, FailedArchive};
pub use inventory::{retrieve_inventory, ArchiveRecord, InventoryError, VaultInventory};
pub use retirement::{retire_vault, RetirementOutcome};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{DeicerConfig, DEFAULT_REGION};
use crate::glacier::{GlacierClient, GlacierError};

#[derive(Debug, Error)]
pub enum DecommissionError {
    #[error("refusing to run without explicit confirmation")]
    NotConfirmed,

    #[error("failed to list vaults: {0}")]
    Enumeration(#[source] GlacierError),
}

/// How the inventory phase ended for one vault.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum InventoryOutcome {
    Retrieved { archives: usize },
    Failed { reason: String },
    Aborted,
    NotAttempted,
}

/// Everything that happened to one vault during the run.
#[derive(Debug, Clone, Serialize)]
pub struct VaultReport {
    pub vault: String,
    pub inventory: InventoryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion: Option<DeletionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retirement: Option<RetirementOutcome>,
}

impl VaultReport {
    fn not_attempted(vault: String) -> Self {
        Self {
            vault,
            inventory: InventoryOutcome::NotAttempted,
            deletion: None,
            retirement: None,
        }
    }

    /// True when the vault itself was deleted.
    pub fn retired(&self) -> bool {
        matches!(self.retirement, Some(ref outcome) if outcome.is_success())
    }
}

/// Final report of a decommission run. Vault order follows the
/// enumeration order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub region: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub aborted: bool,
    pub vaults: Vec<VaultReport>,
}

impl RunReport {
    pub fn retired_count(&self) -> usize {
        self.vaults.iter().filter(|v| v.retired()).count()
    }

    pub fn failed_vaults(&self) -> Vec<&str> {
        self.vaults
            .iter()
            .filter(|v| !v.retired())
            .map(|v| v.vault.as_str())
            .collect()
    }

    /// True when every enumerated vault was retired.
    pub fn fully_retired(&self) -> bool {
        self.vaults.iter().all(|v| v.retired())
    }
}

/// Decommission every vault in the account.
///
/// Refuses to do anything unless `confirmed` is set. Enumeration failure
/// is fatal; everything after that is isolated per vault. Up to
/// `max_concurrent_vaults` vaults are processed at a time.
pub async fn run_decommission(
    client: Arc<dyn GlacierClient>,
    config: &DeicerConfig,
    confirmed: bool,
    cancel: &CancellationToken,
) -> Result<RunReport, DecommissionError> {
    if !confirmed {
        return Err(DecommissionError::NotConfirmed);
    }

    let run_id = uuid::Uuid::new_v4();
    let region = config
        .aws
        .region
        .clone()
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    let started_at = Utc::now();

    info!(%run_id, region, dry_run = config.run.dry_run, "Starting decommission run");
    if config.run.dry_run {
        info!("DRY RUN MODE - no delete calls will be issued");
    }

    let vault_list = client
        .list_vaults()
        .await
        .map_err(DecommissionError::Enumeration)?;
    info!(count = vault_list.len(), "Enumerated vaults");

    let mut reports: Vec<Option<VaultReport>> = vec![None; vault_list.len()];
    let semaphore = Arc::new(Semaphore::new(config.run.max_concurrent_vaults));
    let mut tasks = JoinSet::new();

    for (index, vault) in vault_list.iter().enumerate() {
        let client = client.clone();
        let config = config.clone();
        let cancel = cancel.clone();
        let semaphore = semaphore.clone();
        let vault = vault.name.clone();
        let total = vault_list.len();

        tasks.spawn(async move {
            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                return (index, VaultReport::not_attempted(vault));
            };
            if cancel.is_cancelled() {
                return (index, VaultReport::not_attempted(vault));
            }

            info!(vault, position = index + 1, total, "Processing vault");
            let report = decommission_vault(client.as_ref(), &vault, &config, &cancel).await;
            (index, report)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, report)) => reports[index] = Some(report),
            Err(e) => error!(error = %e, "Vault task failed to complete"),
        }
    }

    let vaults: Vec<VaultReport> = reports
        .into_iter()
        .enumerate()
        .map(|(index, report)| {
            report.unwrap_or_else(|| VaultReport::not_attempted(vault_list[index].name.clone()))
        })
        .collect();

    let aborted = cancel.is_cancelled();
    let report = RunReport {
        run_id,
        region,
        dry_run: config.run.dry_run,
        started_at,
        finished_at: Utc::now(),
        aborted,
        vaults,
    };

    if aborted {
        warn!(%run_id, retired = report.retired_count(), "Decommission run aborted");
    } else {
        info!(
            %run_id,
            vaults = report.vaults.len(),
            retired = report.retired_count(),
            failed = report.failed_vaults().len(),
            "Decommission run complete"
        );
    }
    Ok(report)
}

/// Run the three phases for one vault. Never propagates an error; every
/// way a vault can fail lands in its report.
async fn decommission_vault(
    client: &dyn GlacierClient,
    vault: &str,
    config: &DeicerConfig,
    cancel: &CancellationToken,
) -> VaultReport {
    let inventory = match retrieve_inventory(client, vault, &config.polling, cancel).await {
        Ok(inventory) => inventory,
        Err(InventoryError::Cancelled) => {
            return VaultReport {
                vault: vault.to_string(),
                inventory: InventoryOutcome::Aborted,
                deletion: None,
                retirement: None,
            };
        }
        Err(e) => {
            error!(vault, error = %e, "Failed to retrieve inventory; skipping vault");
            return VaultReport {
                vault: vault.to_string(),
                inventory: InventoryOutcome::Failed {
                    reason: e.to_string(),
                },
                deletion: None,
                retirement: None,
            };
        }
    };

    let deletion = delete_all(
        client,
        vault,
        &inventory.archive_list,
        &config.deletion,
        config.run.dry_run,
        cancel,
    )
    .await;
    if !deletion.failed.is_empty() {
        warn!(
            vault,
            failed = deletion.failed.len(),
            "Some archives could not be deleted; the vault may refuse deletion"
        );
    }

    let retirement =
        retire_vault(client, vault, &config.retirement, config.run.dry_run, cancel).await;

    VaultReport {
        vault: vault.to_string(),
        inventory: InventoryOutcome::Retrieved {
            archives: inventory.archive_list.len(),
        },
        deletion: Some(deletion),
        retirement: Some(retirement),
    }
}
