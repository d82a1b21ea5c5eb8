use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

mod config;
mod credentials;
mod decommission;
mod glacier;
mod observability;

#[cfg(test)]
mod tests;

use crate::config::DeicerConfig;
use crate::decommission::{
    run_decommission, DeletionSummary, InventoryOutcome, RetirementOutcome, RunReport, VaultReport,
};
use crate::glacier::{GlacierClient, SdkGlacierClient};

#[derive(Parser, Debug)]
#[command(version, about = "Empty and delete AWS Glacier vaults", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to deicer.toml in the current
    /// directory if it exists)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Empty and delete every vault in the account (default)
    Run {
        /// Skip the interactive confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Log what would be deleted without issuing any delete calls
        #[arg(long)]
        dry_run: bool,
        /// AWS region (overrides the config file and AWS_DEFAULT_REGION)
        #[arg(long)]
        region: Option<String>,
        /// Print the final report as JSON to stdout
        #[arg(long)]
        json: bool,
    },
    /// List the account's vaults and exit
    Vaults {
        /// AWS region (overrides the config file and AWS_DEFAULT_REGION)
        #[arg(long)]
        region: Option<String>,
        /// Print the listing as JSON to stdout
        #[arg(long)]
        json: bool,
    },
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to deicer.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Vaults { region, json }) => {
            run_vaults(args.config.as_deref(), region.as_deref(), json).await;
        }
        Some(Command::Init { output, force }) => {
            run_init(output, force);
        }
        Some(Command::Run {
            yes,
            dry_run,
            region,
            json,
        }) => {
            run_decommission_command(args.config.as_deref(), yes, dry_run, region.as_deref(), json)
                .await;
        }
        None => {
            run_decommission_command(args.config.as_deref(), false, false, None, false).await;
        }
    }
}

/// The default command: empty and delete every vault in the account.
async fn run_decommission_command(
    explicit_config: Option<&str>,
    yes: bool,
    dry_run: bool,
    region: Option<&str>,
    json: bool,
) {
    let mut config = load_config(explicit_config);
    if dry_run {
        config.run.dry_run = true;
    }
    let region = config.aws.resolve_region(region);
    config.aws.region = Some(region.clone());

    observability::init_tracing(&config.logging);
    tracing::info!(region, dry_run = config.run.dry_run, "Starting deicer");

    let resolved = resolve_credentials();

    // Nothing destructive happens without an explicit yes.
    let confirmed = yes || config.run.dry_run || confirm_destruction();
    if !confirmed {
        tracing::info!("Vault decommission cancelled");
        std::process::exit(1);
    }

    tracing::info!(region, "Initializing Glacier client");
    let client = SdkGlacierClient::new(&config.aws, Some(resolved.into_sdk_credentials())).await;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::warn!("Shutdown requested; letting in-flight calls finish");
            cancel.cancel();
        })
    };

    let report = match run_decommission(Arc::new(client), &config, confirmed, &cancel).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Decommission run failed");
            std::process::exit(1);
        }
    };
    watcher.abort();

    render_report(&report, json);

    if report.aborted {
        std::process::exit(130);
    }
    if !report.fully_retired() {
        std::process::exit(2);
    }
}

/// List the account's vaults without touching them.
async fn run_vaults(explicit_config: Option<&str>, region: Option<&str>, json: bool) {
    let mut config = load_config(explicit_config);
    let region = config.aws.resolve_region(region);
    config.aws.region = Some(region.clone());

    observability::init_tracing(&config.logging);
    let resolved = resolve_credentials();

    tracing::info!(region, "Initializing Glacier client");
    let client = SdkGlacierClient::new(&config.aws, Some(resolved.into_sdk_credentials())).await;

    let vaults = match client.list_vaults().await {
        Ok(vaults) => vaults,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list vaults");
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&vaults) {
            Ok(body) => println!("{}", body),
            Err(e) => eprintln!("Failed to serialize vault list: {}", e),
        }
        return;
    }

    println!("{} vault(s) in {}", vaults.len(), region);
    for vault in &vaults {
        println!(
            "  {}  archives={}  size_bytes={}  created={}  last_inventory={}",
            vault.name,
            vault.number_of_archives,
            vault.size_in_bytes,
            vault
                .creation_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| "-".into()),
            vault
                .last_inventory_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| "-".into()),
        );
    }
}

/// Initialize a new configuration file
fn run_init(output: Option<String>, force: bool) {
    let path = PathBuf::from(output.unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string()));

    if path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&path, config::EXAMPLE_CONFIG) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created configuration at: {}", path.display());
    println!("Review the settings, then run 'deicer' to start a decommission.");
}

fn load_config(explicit: Option<&str>) -> DeicerConfig {
    match DeicerConfig::load(explicit.map(Path::new)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn resolve_credentials() -> credentials::ResolvedCredentials {
    match credentials::preflight() {
        Ok(resolved) => {
            tracing::debug!(
                session_token = resolved.has_session_token(),
                "Credentials resolved"
            );
            resolved
        }
        Err(e) => {
            tracing::error!(error = %e, "Credential validation failed");
            std::process::exit(1);
        }
    }
}

/// Ask the operator to type out their intent before deleting an account's
/// worth of vaults.
fn confirm_destruction() -> bool {
    print!("This will delete ALL vaults and their contents. Are you sure? (yes/no): ");
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut response = String::new();
    if std::io::stdin().read_line(&mut response).is_err() {
        return false;
    }
    response.trim().eq_ignore_ascii_case("yes")
}

fn render_report(report: &RunReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(body) => println!("{}", body),
            Err(e) => eprintln!("Failed to serialize report: {}", e),
        }
        return;
    }

    println!();
    println!("Decommission run {}", report.run_id);
    println!("  region:   {}", report.region);
    if report.dry_run {
        println!("  mode:     dry run (no deletes were issued)");
    }
    println!("  started:  {}", report.started_at.to_rfc3339());
    println!("  finished: {}", report.finished_at.to_rfc3339());
    if report.aborted {
        println!("  aborted:  yes (interrupted before completion)");
    }
    println!(
        "  vaults:   {} total, {} retired",
        report.vaults.len(),
        report.retired_count()
    );
    for vault in &report.vaults {
        println!("    {}: {}", vault.vault, describe_vault(vault));
    }
}

fn describe_vault(report: &VaultReport) -> String {
    match &report.inventory {
        InventoryOutcome::NotAttempted => "not attempted".to_string(),
        InventoryOutcome::Aborted => "aborted while waiting for inventory".to_string(),
        InventoryOutcome::Failed { reason } => format!("inventory failed: {}", reason),
        InventoryOutcome::Retrieved { archives } => {
            let deletion = report
                .deletion
                .as_ref()
                .map(describe_deletion)
                .unwrap_or_else(|| "no deletion pass".to_string());
            let retirement = match &report.retirement {
                Some(RetirementOutcome::Succeeded { attempts: 0 }) => {
                    "vault delete skipped (dry run)".to_string()
                }
                Some(RetirementOutcome::Succeeded { attempts }) => {
                    format!("vault deleted after {} attempt(s)", attempts)
                }
                Some(RetirementOutcome::Abandoned { attempts, reason }) => {
                    format!("vault abandoned after {} attempt(s): {}", attempts, reason)
                }
                Some(RetirementOutcome::Aborted { attempts }) => {
                    format!("vault delete aborted after {} attempt(s)", attempts)
                }
                None => "vault delete not attempted".to_string(),
            };
            format!("{} archive(s); {}; {}", archives, deletion, retirement)
        }
    }
}

fn describe_deletion(summary: &DeletionSummary) -> String {
    let mut out = format!(
        "{} of {} deletes succeeded",
        summary.succeeded, summary.attempted
    );
    if !summary.failed.is_empty() {
        out.push_str(&format!(", {} failed", summary.failed.len()));
    }
    if summary.skipped > 0 {
        out.push_str(&format!(", {} skipped", summary.skipped));
    }
    if !summary.is_complete() {
        out.push_str(" (incomplete)");
    }
    out
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
