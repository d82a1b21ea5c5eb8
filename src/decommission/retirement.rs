//! Vault retirement: the final delete-vault call and its backoff loop.
//!
//! Glacier refuses to delete a vault until a later asynchronous
//! inventory sync observes it empty, which can take many hours. The loop
//! here retries the delete with strictly increasing waits so repeated
//! refusals back off harder instead of hammering the service on a vault
//! that is not ready yet.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::RetirementConfig;
use crate::glacier::{GlacierClient, GlacierError};

/// Terminal state of one vault's retirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RetirementOutcome {
    /// The vault is gone.
    Succeeded { attempts: u32 },
    /// A permanent error or an exhausted attempt budget ended the loop.
    Abandoned { attempts: u32, reason: String },
    /// Cancellation ended the loop before the vault was deleted.
    Aborted { attempts: u32 },
}

impl RetirementOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RetirementOutcome::Succeeded { .. })
    }
}

/// Delete `vault`, retrying refusals until it goes, the attempt budget
/// runs out, or the run is cancelled.
///
/// A not-empty refusal and a transient service error both wait
/// `wait_after_attempt(n)` before attempt n+1. In dry-run mode no call is
/// issued and the outcome reports zero attempts.
pub async fn retire_vault(
    client: &dyn GlacierClient,
    vault: &str,
    config: &RetirementConfig,
    dry_run: bool,
    cancel: &CancellationToken,
) -> RetirementOutcome {
    if dry_run {
        info!(vault, "DRY RUN: Would delete vault");
        return RetirementOutcome::Succeeded { attempts: 0 };
    }

    let mut attempts: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return RetirementOutcome::Aborted { attempts };
        }

        attempts += 1;
        match client.delete_vault(vault).await {
            Ok(()) => {
                info!(vault, attempts, "Deleted vault");
                return RetirementOutcome::Succeeded { attempts };
            }
            Err(e) if e.is_transient() => {
                if !config.allows_attempt(attempts) {
                    warn!(
                        vault,
                        attempts,
                        error = %e,
                        "Attempt budget exhausted; abandoning vault"
                    );
                    return RetirementOutcome::Abandoned {
                        attempts,
                        reason: e.to_string(),
                    };
                }
                let wait = config.wait_after_attempt(attempts);
                let not_empty = matches!(e, GlacierError::VaultNotEmpty(_));
                info!(
                    vault,
                    attempt = attempts,
                    wait_secs = wait.as_secs(),
                    not_empty,
                    error = %e,
                    "Vault not yet deletable; waiting before next attempt"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return RetirementOutcome::Aborted { attempts },
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Err(e) => {
                error!(vault, attempts, error = %e, "Giving up on vault");
                return RetirementOutcome::Abandoned {
                    attempts,
                    reason: e.to_string(),
                };
            }
        }
    }
}
