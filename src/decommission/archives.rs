//! Bulk archive deletion for a single vault.
//!
//! Every archive named by the inventory is deleted exactly once, in
//! inventory order, with a bounded number of immediate retries on transient
//! errors. An archive that is already gone counts as deleted. Failures are
//! collected per archive so one bad archive never stops the sweep.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ArchiveDeletionConfig;
use crate::decommission::inventory::ArchiveRecord;
use crate::glacier::{GlacierClient, GlacierError};

/// An archive the sweep could not delete, with the final error.
#[derive(Debug, Clone, Serialize)]
pub struct FailedArchive {
    pub archive_id: String,
    pub reason: String,
}

/// Result of one deletion sweep over a vault's inventory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionSummary {
    /// Archives for which at least one delete call was issued.
    pub attempted: usize,
    /// Archives deleted, including those already gone.
    pub succeeded: usize,
    pub failed: Vec<FailedArchive>,
    /// Archives never attempted because the run was cancelled.
    pub skipped: usize,
}

impl DeletionSummary {
    /// True when every archive in the inventory was deleted.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped == 0
    }
}

enum ArchiveOutcome {
    Deleted,
    Failed { archive_id: String, reason: String },
    Skipped,
}

/// Delete every archive in `archives`, in order.
///
/// Issues at most `max_concurrent_deletes` calls at a time. Cancellation
/// lets in-flight deletes finish and marks the rest skipped. In dry-run
/// mode no delete call is issued and every archive counts as succeeded.
pub async fn delete_all(
    client: &dyn GlacierClient,
    vault: &str,
    archives: &[ArchiveRecord],
    config: &ArchiveDeletionConfig,
    dry_run: bool,
    cancel: &CancellationToken,
) -> DeletionSummary {
    if archives.is_empty() {
        debug!(vault, "No archives to delete");
        return DeletionSummary::default();
    }

    info!(vault, archives = archives.len(), "Deleting archives");

    // The closure takes an index rather than `&ArchiveRecord`: a reference
    // argument flowing into the async block trips rustc's "implementation
    // of `FnOnce` is not general enough" false positive when this future
    // is spawned (rust-lang/rust#102211).
    let outcomes: Vec<ArchiveOutcome> = stream::iter((0..archives.len()).map(|index| async move {
        let archive = &archives[index];
        if cancel.is_cancelled() {
            return ArchiveOutcome::Skipped;
        }
        if dry_run {
            info!(
                vault,
                archive_id = %archive.archive_id,
                size = archive.size,
                "DRY RUN: Would delete archive"
            );
            return ArchiveOutcome::Deleted;
        }
        delete_one(client, vault, archive, config.retries_per_archive).await
    }))
    .buffer_unordered(config.max_concurrent_deletes)
    .collect()
    .await;

    let mut summary = DeletionSummary::default();
    for outcome in outcomes {
        match outcome {
            ArchiveOutcome::Deleted => {
                summary.attempted += 1;
                summary.succeeded += 1;
            }
            ArchiveOutcome::Failed { archive_id, reason } => {
                summary.attempted += 1;
                summary.failed.push(FailedArchive { archive_id, reason });
            }
            ArchiveOutcome::Skipped => summary.skipped += 1,
        }
    }

    info!(
        vault,
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        failed = summary.failed.len(),
        skipped = summary.skipped,
        "Archive deletion pass complete"
    );
    summary
}

async fn delete_one(
    client: &dyn GlacierClient,
    vault: &str,
    archive: &ArchiveRecord,
    retries: u32,
) -> ArchiveOutcome {
    let mut attempt = 0;
    loop {
        match client.delete_archive(vault, &archive.archive_id).await {
            Ok(()) => {
                debug!(vault, archive_id = %archive.archive_id, "Deleted archive");
                return ArchiveOutcome::Deleted;
            }
            // Deleting an archive that no longer exists is the goal state.
            Err(GlacierError::NotFound(_)) => {
                debug!(vault, archive_id = %archive.archive_id, "Archive already gone");
                return ArchiveOutcome::Deleted;
            }
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(
                    vault,
                    archive_id = %archive.archive_id,
                    attempt,
                    error = %e,
                    "Failed to delete archive; retrying"
                );
            }
            Err(e) => {
                error!(
                    vault,
                    archive_id = %archive.archive_id,
                    error = %e,
                    "Failed to delete archive"
                );
                return ArchiveOutcome::Failed {
                    archive_id: archive.archive_id.clone(),
                    reason: e.to_string(),
                };
            }
        }
    }
}
