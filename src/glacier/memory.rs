//! In-memory Glacier client with configurable failure modes.
//!
//! Drives the decommission workflow in tests without external dependencies.
//! Vault contents, job completion pacing, and per-operation failures are
//! scripted up front, and every call is recorded so tests can assert on the
//! exact operation sequence the workflow issued.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use tokio::time::Instant;
use uuid::Uuid;

use super::{GlacierClient, GlacierError, GlacierResult, JobStatus, VaultSummary};

/// One scripted archive in a memory vault.
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    pub id: String,
    pub description: String,
    pub size: i64,
}

impl MemoryArchive {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            description: format!("backup of {id}"),
            size: 1024,
            id,
        }
    }
}

/// Scripted behavior for one vault.
#[derive(Debug, Clone)]
pub struct MemoryVaultSpec {
    pub name: String,
    pub archives: Vec<MemoryArchive>,
    /// `describe_job` calls that report in-progress before the job completes.
    pub polls_until_complete: u32,
    /// When set, the inventory job completes as failed with this message.
    pub job_failure: Option<String>,
    /// Extra refusals returned on `delete_vault` after the vault is already
    /// empty, mimicking the "recently written to" window.
    pub refusals_after_empty: u32,
}

impl MemoryVaultSpec {
    /// A vault holding `archive_count` synthetic archives whose inventory
    /// job completes on the first poll.
    pub fn new(name: impl Into<String>, archive_count: usize) -> Self {
        let name = name.into();
        let archives = (0..archive_count)
            .map(|i| MemoryArchive::new(format!("{name}-archive-{i:04}")))
            .collect();
        Self {
            name,
            archives,
            polls_until_complete: 0,
            job_failure: None,
            refusals_after_empty: 0,
        }
    }

    pub fn with_archives(mut self, archives: Vec<MemoryArchive>) -> Self {
        self.archives = archives;
        self
    }

    pub fn with_polls_until_complete(mut self, polls: u32) -> Self {
        self.polls_until_complete = polls;
        self
    }

    pub fn with_job_failure(mut self, message: impl Into<String>) -> Self {
        self.job_failure = Some(message.into());
        self
    }

    pub fn with_refusals_after_empty(mut self, refusals: u32) -> Self {
        self.refusals_after_empty = refusals;
        self
    }
}

/// Operations a test can target for failure injection or call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlacierOp {
    ListVaults,
    InitiateJob,
    DescribeJob,
    GetJobOutput,
    DeleteArchive,
    DeleteVault,
}

/// One recorded call together with its identifying fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    ListVaults,
    InitiateJob { vault: String },
    DescribeJob { vault: String, job_id: String },
    GetJobOutput { vault: String, job_id: String },
    DeleteArchive { vault: String, archive_id: String },
    DeleteVault { vault: String },
}

impl RecordedCall {
    pub fn op(&self) -> GlacierOp {
        match self {
            RecordedCall::ListVaults => GlacierOp::ListVaults,
            RecordedCall::InitiateJob { .. } => GlacierOp::InitiateJob,
            RecordedCall::DescribeJob { .. } => GlacierOp::DescribeJob,
            RecordedCall::GetJobOutput { .. } => GlacierOp::GetJobOutput,
            RecordedCall::DeleteArchive { .. } => GlacierOp::DeleteArchive,
            RecordedCall::DeleteVault { .. } => GlacierOp::DeleteVault,
        }
    }
}

struct VaultState {
    archives: Vec<MemoryArchive>,
    polls_until_complete: u32,
    job_failure: Option<String>,
    refusals_after_empty: u32,
}

struct JobState {
    vault: String,
    remaining_polls: u32,
    failure: Option<String>,
}

/// Glacier client backed by process memory.
pub struct MemoryGlacierClient {
    vaults: DashMap<String, VaultState>,
    jobs: DashMap<String, JobState>,
    injected: Mutex<HashMap<GlacierOp, VecDeque<GlacierError>>>,
    calls: Mutex<Vec<(RecordedCall, Instant)>>,
}

impl MemoryGlacierClient {
    pub fn new() -> Self {
        Self {
            vaults: DashMap::new(),
            jobs: DashMap::new(),
            injected: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_vaults(specs: impl IntoIterator<Item = MemoryVaultSpec>) -> Self {
        let client = Self::new();
        for spec in specs {
            client.add_vault(spec);
        }
        client
    }

    pub fn add_vault(&self, spec: MemoryVaultSpec) {
        self.vaults.insert(
            spec.name,
            VaultState {
                archives: spec.archives,
                polls_until_complete: spec.polls_until_complete,
                job_failure: spec.job_failure,
                refusals_after_empty: spec.refusals_after_empty,
            },
        );
    }

    /// Queue an error for the next call of `op`. Queued errors are consumed
    /// in FIFO order before the operation's normal behavior runs.
    pub fn inject_failure(&self, op: GlacierOp, error: GlacierError) {
        self.injected
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn call_count(&self, op: GlacierOp) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call, _)| call.op() == op)
            .count()
    }

    /// Instants (on the tokio clock) at which `delete_vault` was attempted
    /// for `vault`, in call order.
    pub fn delete_vault_times(&self, vault: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(call, at)| match call {
                RecordedCall::DeleteVault { vault: v } if v == vault => Some(*at),
                _ => None,
            })
            .collect()
    }

    /// Archive ids passed to `delete_archive` for `vault`, in call order.
    pub fn deleted_archive_ids(&self, vault: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(call, _)| match call {
                RecordedCall::DeleteArchive {
                    vault: v,
                    archive_id,
                } if v == vault => Some(archive_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn vault_exists(&self, name: &str) -> bool {
        self.vaults.contains_key(name)
    }

    /// Ids of the archives still stored in `vault`, in insertion order.
    pub fn remaining_archives(&self, vault: &str) -> Vec<String> {
        self.vaults
            .get(vault)
            .map(|state| state.archives.iter().map(|a| a.id.clone()).collect())
            .unwrap_or_default()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }

    fn take_injected(&self, op: GlacierOp) -> Option<GlacierError> {
        self.injected
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
    }
}

impl Default for MemoryGlacierClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GlacierClient for MemoryGlacierClient {
    async fn list_vaults(&self) -> GlacierResult<Vec<VaultSummary>> {
        self.record(RecordedCall::ListVaults);
        if let Some(error) = self.take_injected(GlacierOp::ListVaults) {
            return Err(error);
        }

        let mut summaries: Vec<VaultSummary> = self
            .vaults
            .iter()
            .map(|entry| VaultSummary {
                name: entry.key().clone(),
                arn: Some(vault_arn(entry.key())),
                creation_date: fixed_date("2024-01-15T00:00:00Z"),
                last_inventory_date: fixed_date("2024-06-01T00:00:00Z"),
                number_of_archives: entry.value().archives.len() as i64,
                size_in_bytes: entry.value().archives.iter().map(|a| a.size).sum(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn initiate_inventory_job(&self, vault: &str) -> GlacierResult<String> {
        self.record(RecordedCall::InitiateJob {
            vault: vault.to_string(),
        });
        if let Some(error) = self.take_injected(GlacierOp::InitiateJob) {
            return Err(error);
        }

        let state = self
            .vaults
            .get(vault)
            .ok_or_else(|| GlacierError::NotFound(format!("vault {vault} does not exist")))?;

        let job_id = Uuid::new_v4().to_string();
        self.jobs.insert(
            job_id.clone(),
            JobState {
                vault: vault.to_string(),
                remaining_polls: state.polls_until_complete,
                failure: state.job_failure.clone(),
            },
        );
        Ok(job_id)
    }

    async fn describe_job(&self, vault: &str, job_id: &str) -> GlacierResult<JobStatus> {
        self.record(RecordedCall::DescribeJob {
            vault: vault.to_string(),
            job_id: job_id.to_string(),
        });
        if let Some(error) = self.take_injected(GlacierOp::DescribeJob) {
            return Err(error);
        }

        let mut job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| GlacierError::NotFound(format!("job {job_id} does not exist")))?;
        if job.vault != vault {
            return Err(GlacierError::NotFound(format!(
                "job {job_id} does not belong to vault {vault}"
            )));
        }

        if job.remaining_polls > 0 {
            job.remaining_polls -= 1;
            return Ok(JobStatus::InProgress);
        }
        match &job.failure {
            Some(message) => Ok(JobStatus::Failed {
                message: message.clone(),
            }),
            None => Ok(JobStatus::Succeeded),
        }
    }

    async fn get_job_output(&self, vault: &str, job_id: &str) -> GlacierResult<Bytes> {
        self.record(RecordedCall::GetJobOutput {
            vault: vault.to_string(),
            job_id: job_id.to_string(),
        });
        if let Some(error) = self.take_injected(GlacierOp::GetJobOutput) {
            return Err(error);
        }

        let job = self
            .jobs
            .get(job_id)
            .ok_or_else(|| GlacierError::NotFound(format!("job {job_id} does not exist")))?;
        if job.vault != vault {
            return Err(GlacierError::NotFound(format!(
                "job {job_id} does not belong to vault {vault}"
            )));
        }
        // Fetching before completion is a caller bug; surface it loudly.
        if job.remaining_polls > 0 {
            return Err(GlacierError::Service(format!(
                "job {job_id} has not completed"
            )));
        }
        if let Some(message) = &job.failure {
            return Err(GlacierError::Service(format!("job {job_id} failed: {message}")));
        }

        let state = self
            .vaults
            .get(vault)
            .ok_or_else(|| GlacierError::NotFound(format!("vault {vault} does not exist")))?;

        let archive_list: Vec<serde_json::Value> = state
            .archives
            .iter()
            .enumerate()
            .map(|(i, archive)| {
                json!({
                    "ArchiveId": archive.id,
                    "ArchiveDescription": archive.description,
                    "CreationDate": "2024-03-01T00:00:00Z",
                    "Size": archive.size,
                    "SHA256TreeHash": format!("{:064x}", i + 1),
                })
            })
            .collect();
        let inventory = json!({
            "VaultARN": vault_arn(vault),
            "InventoryDate": "2024-06-01T00:00:00Z",
            "ArchiveList": archive_list,
        });
        Ok(Bytes::from(inventory.to_string()))
    }

    async fn delete_archive(&self, vault: &str, archive_id: &str) -> GlacierResult<()> {
        self.record(RecordedCall::DeleteArchive {
            vault: vault.to_string(),
            archive_id: archive_id.to_string(),
        });
        if let Some(error) = self.take_injected(GlacierOp::DeleteArchive) {
            return Err(error);
        }

        let mut state = self
            .vaults
            .get_mut(vault)
            .ok_or_else(|| GlacierError::NotFound(format!("vault {vault} does not exist")))?;
        // Deleting an already-deleted archive succeeds, as on the real service.
        state.archives.retain(|archive| archive.id != archive_id);
        Ok(())
    }

    async fn delete_vault(&self, vault: &str) -> GlacierResult<()> {
        self.record(RecordedCall::DeleteVault {
            vault: vault.to_string(),
        });
        if let Some(error) = self.take_injected(GlacierOp::DeleteVault) {
            return Err(error);
        }

        {
            let mut state = self
                .vaults
                .get_mut(vault)
                .ok_or_else(|| GlacierError::NotFound(format!("vault {vault} does not exist")))?;
            if !state.archives.is_empty() {
                return Err(GlacierError::VaultNotEmpty(format!(
                    "Vault not empty or recently written to: {}",
                    vault_arn(vault)
                )));
            }
            if state.refusals_after_empty > 0 {
                state.refusals_after_empty -= 1;
                return Err(GlacierError::VaultNotEmpty(format!(
                    "Vault not empty or recently written to: {}",
                    vault_arn(vault)
                )));
            }
            // Guard must drop before remove touches the same shard.
        }
        self.vaults.remove(vault);
        Ok(())
    }
}

fn vault_arn(vault: &str) -> String {
    format!("arn:aws:glacier:us-east-1:000000000000:vaults/{vault}")
}

fn fixed_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn job_completes_after_scripted_polls() {
        let client = MemoryGlacierClient::with_vaults([
            MemoryVaultSpec::new("photos", 2).with_polls_until_complete(2),
        ]);

        let job_id = client.initiate_inventory_job("photos").await.unwrap();
        assert_eq!(
            client.describe_job("photos", &job_id).await.unwrap(),
            JobStatus::InProgress
        );
        assert_eq!(
            client.describe_job("photos", &job_id).await.unwrap(),
            JobStatus::InProgress
        );
        assert_eq!(
            client.describe_job("photos", &job_id).await.unwrap(),
            JobStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn job_output_lists_current_archives() {
        let client = MemoryGlacierClient::with_vaults([MemoryVaultSpec::new("photos", 3)]);

        let job_id = client.initiate_inventory_job("photos").await.unwrap();
        client.describe_job("photos", &job_id).await.unwrap();
        let body = client.get_job_output("photos", &job_id).await.unwrap();

        let inventory: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(inventory["ArchiveList"].as_array().unwrap().len(), 3);
        assert_eq!(
            inventory["ArchiveList"][0]["ArchiveId"],
            "photos-archive-0000"
        );
    }

    #[tokio::test]
    async fn premature_output_fetch_is_rejected() {
        let client = MemoryGlacierClient::with_vaults([
            MemoryVaultSpec::new("photos", 1).with_polls_until_complete(5),
        ]);

        let job_id = client.initiate_inventory_job("photos").await.unwrap();
        let err = client.get_job_output("photos", &job_id).await.unwrap_err();
        assert!(matches!(err, GlacierError::Service(_)));
    }

    #[tokio::test]
    async fn delete_vault_refuses_while_archives_remain() {
        let client = MemoryGlacierClient::with_vaults([MemoryVaultSpec::new("photos", 1)]);

        let err = client.delete_vault("photos").await.unwrap_err();
        assert!(matches!(err, GlacierError::VaultNotEmpty(_)));

        client
            .delete_archive("photos", "photos-archive-0000")
            .await
            .unwrap();
        client.delete_vault("photos").await.unwrap();
        assert!(!client.vault_exists("photos"));
    }

    #[tokio::test]
    async fn refusals_after_empty_mimic_recently_written_window() {
        let client = MemoryGlacierClient::with_vaults([
            MemoryVaultSpec::new("photos", 0).with_refusals_after_empty(2),
        ]);

        assert!(client.delete_vault("photos").await.is_err());
        assert!(client.delete_vault("photos").await.is_err());
        client.delete_vault("photos").await.unwrap();
        assert_eq!(client.delete_vault_times("photos").len(), 3);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let client = MemoryGlacierClient::with_vaults([MemoryVaultSpec::new("photos", 0)]);
        client.inject_failure(
            GlacierOp::ListVaults,
            GlacierError::Throttled("slow down".into()),
        );

        assert!(matches!(
            client.list_vaults().await.unwrap_err(),
            GlacierError::Throttled(_)
        ));
        assert_eq!(client.list_vaults().await.unwrap().len(), 1);
        assert_eq!(client.call_count(GlacierOp::ListVaults), 2);
    }

    #[tokio::test]
    async fn deleting_a_missing_archive_is_idempotent() {
        let client = MemoryGlacierClient::with_vaults([MemoryVaultSpec::new("photos", 1)]);
        client.delete_archive("photos", "no-such-id").await.unwrap();
        assert_eq!(client.remaining_archives("photos").len(), 1);
    }
}
