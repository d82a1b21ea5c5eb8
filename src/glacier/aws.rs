//! Production Glacier client over the AWS SDK.
//!
//! Uses the standard credential chain unless explicit credentials were
//! resolved by the preflight check, and supports a custom endpoint URL for
//! testing against localstack-style emulators.

use async_trait::async_trait;
use aws_sdk_glacier::Client;
use aws_sdk_glacier::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_glacier::types::{DescribeVaultOutput, JobParameters, StatusCode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{GlacierClient, GlacierError, GlacierResult, JobStatus, VaultSummary};
use crate::config::AwsConfig;

/// Glacier client backed by `aws-sdk-glacier`.
pub struct SdkGlacierClient {
    client: Client,
    account_id: String,
}

impl SdkGlacierClient {
    /// Build a client from the AWS section of the configuration.
    ///
    /// Explicit credentials (from the env preflight) take precedence over
    /// the SDK's default chain.
    pub async fn new(
        config: &AwsConfig,
        credentials: Option<aws_credential_types::Credentials>,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        if let Some(credentials) = credentials {
            loader = loader.credentials_provider(credentials);
        }

        let sdk_config = loader.load().await;

        let mut glacier_config = aws_sdk_glacier::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = &config.endpoint_url {
            glacier_config = glacier_config.endpoint_url(endpoint_url);
        }

        Self {
            client: Client::from_conf(glacier_config.build()),
            account_id: config.account_id.clone(),
        }
    }
}

#[async_trait]
impl GlacierClient for SdkGlacierClient {
    async fn list_vaults(&self) -> GlacierResult<Vec<VaultSummary>> {
        let mut vaults = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut request = self.client.list_vaults().account_id(&self.account_id);
            if let Some(marker) = &marker {
                request = request.marker(marker);
            }

            let output = request
                .send()
                .await
                .map_err(|e| classify_sdk_error("list-vaults", e))?;

            vaults.extend(output.vault_list().iter().map(vault_summary));

            marker = output.marker().map(str::to_string);
            if marker.is_none() {
                break;
            }
        }

        debug!(count = vaults.len(), "Listed vaults");
        Ok(vaults)
    }

    async fn initiate_inventory_job(&self, vault: &str) -> GlacierResult<String> {
        let parameters = JobParameters::builder().r#type("inventory-retrieval").build();

        let output = self
            .client
            .initiate_job()
            .account_id(&self.account_id)
            .vault_name(vault)
            .job_parameters(parameters)
            .send()
            .await
            .map_err(|e| classify_sdk_error("initiate-job", e))?;

        output
            .job_id()
            .map(str::to_string)
            .ok_or_else(|| GlacierError::Service("initiate-job response carried no job id".into()))
    }

    async fn describe_job(&self, vault: &str, job_id: &str) -> GlacierResult<JobStatus> {
        let output = self
            .client
            .describe_job()
            .account_id(&self.account_id)
            .vault_name(vault)
            .job_id(job_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error("describe-job", e))?;

        let status = match output.status_code() {
            Some(StatusCode::Succeeded) => JobStatus::Succeeded,
            Some(StatusCode::Failed) => JobStatus::Failed {
                message: output.status_message().unwrap_or("no status message").to_string(),
            },
            Some(StatusCode::InProgress) => JobStatus::InProgress,
            Some(other) => {
                return Err(GlacierError::Service(format!(
                    "unrecognized job status: {other:?}"
                )));
            }
            // Older responses may omit the status code; Completed is still
            // authoritative, as in the Glacier API reference examples.
            None if output.completed() => JobStatus::Succeeded,
            None => JobStatus::InProgress,
        };

        Ok(status)
    }

    async fn get_job_output(&self, vault: &str, job_id: &str) -> GlacierResult<Bytes> {
        let output = self
            .client
            .get_job_output()
            .account_id(&self.account_id)
            .vault_name(vault)
            .job_id(job_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error("get-job-output", e))?;

        let payload = output
            .body
            .collect()
            .await
            .map_err(|e| GlacierError::Network(format!("failed to read job output body: {e}")))?
            .into_bytes();

        debug!(vault, job_id, bytes = payload.len(), "Fetched job output");
        Ok(payload)
    }

    async fn delete_archive(&self, vault: &str, archive_id: &str) -> GlacierResult<()> {
        self.client
            .delete_archive()
            .account_id(&self.account_id)
            .vault_name(vault)
            .archive_id(archive_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error("delete-archive", e))?;

        Ok(())
    }

    async fn delete_vault(&self, vault: &str) -> GlacierResult<()> {
        self.client
            .delete_vault()
            .account_id(&self.account_id)
            .vault_name(vault)
            .send()
            .await
            .map_err(|e| classify_sdk_error("delete-vault", e))?;

        Ok(())
    }
}

fn vault_summary(vault: &DescribeVaultOutput) -> VaultSummary {
    VaultSummary {
        name: vault.vault_name().unwrap_or_default().to_string(),
        arn: vault.vault_arn().map(str::to_string),
        creation_date: vault.creation_date().and_then(parse_timestamp),
        last_inventory_date: vault.last_inventory_date().and_then(parse_timestamp),
        number_of_archives: vault.number_of_archives(),
        size_in_bytes: vault.size_in_bytes(),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Map an SDK error onto the [`GlacierError`] taxonomy.
///
/// Dispatch and timeout failures are network-class; service errors are
/// classified by their exception code, with the documented
/// `InvalidParameterValueException` for a non-empty or recently written
/// vault pulled out into its own variant.
fn classify_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> GlacierError
where
    E: ProvideErrorMetadata,
{
    match &err {
        SdkError::TimeoutError(_) => GlacierError::Network(format!("{operation} timed out")),
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            GlacierError::Network(format!("{operation}: {err}"))
        }
        SdkError::ServiceError(_) => {
            let code = err.code().unwrap_or("UnknownException").to_string();
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{operation} failed without a message"));
            classify_service_error(&code, message)
        }
        _ => GlacierError::Service(format!("{operation}: {err}")),
    }
}

fn classify_service_error(code: &str, message: String) -> GlacierError {
    match code {
        "ResourceNotFoundException" => GlacierError::NotFound(message),
        "AccessDeniedException" | "UnrecognizedClientException" | "InvalidSignatureException" => {
            GlacierError::AccessDenied(message)
        }
        "ThrottlingException" | "RequestLimitExceeded" => GlacierError::Throttled(message),
        "ServiceUnavailableException" | "InternalServerError" | "RequestTimeoutException" => {
            GlacierError::Unavailable(message)
        }
        "InvalidParameterValueException" if is_vault_not_empty_message(&message) => {
            GlacierError::VaultNotEmpty(message)
        }
        _ => GlacierError::Service(format!("{code}: {message}")),
    }
}

/// Glacier reports a refused vault deletion as an invalid-parameter error
/// with a "Vault not empty or recently written to" message.
fn is_vault_not_empty_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("not empty") || lower.contains("recently written")
}
