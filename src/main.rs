use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use program_deployer::config::{self, load_config, DeployConfig, EnvOverrides};
use program_deployer::log_collector::PARSED_TARGET;
use program_deployer::models::{BuildMode, DeploymentReport, VerificationStatus, WorkflowKind};
use program_deployer::verification::{self, VerificationClient};
use program_deployer::{check_status, DeploymentOrchestrator, LogCollector, RpcChainClient, TokioProcessRunner};

/// Interval between job polls for `verify --wait`.
const VERIFY_POLL_INTERVAL: Duration = Duration::from_secs(15);
const VERIFY_WAIT_LIMIT: Duration = Duration::from_secs(45 * 60);

#[derive(Parser)]
#[command(name = "program-deployer")]
#[command(about = "Deploy, upgrade and verify on-chain programs")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to ./deploy.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the reproducible (containerized) build
    #[arg(long, global = true)]
    reproducible: bool,

    /// Build but never publish
    #[arg(long, global = true)]
    dry_run: bool,

    /// Include debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and deploy the program for the first time
    Deploy,

    /// Build and upgrade the deployed program
    Upgrade,

    /// Show deployer balance, program account and current slot
    Status,

    /// Submit the program for source verification
    Verify {
        /// Poll the submitted job until it finishes
        #[arg(long)]
        wait: bool,
    },

    /// Show the verification state of the program
    VerifyStatus {
        /// Program address (defaults to the configured program)
        address: Option<String>,
    },

    /// Print the verification service's build logs for the program
    VerifyLogs {
        /// Program address (defaults to the configured program)
        address: Option<String>,
    },

    /// Show the progress of a submitted verification job
    VerifyJob {
        /// Request id returned by `verify`
        request_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut settings = match load_config(cli.config.as_deref(), &EnvOverrides::from_process_env()) {
        Ok(settings) => settings,
        Err(e) => {
            println!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if cli.reproducible {
        settings.build_mode = BuildMode::Reproducible;
    }

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let (collector, file_logging_error) = LogCollector::new_or_stdout(&settings.log_dir, level);
    let collector = match collector.install() {
        Ok(collector) => Some(collector),
        Err(e) => {
            println!("Warning: {}", e);
            None
        }
    };
    if let Some(reason) = file_logging_error {
        log::warn!("[Main] File logging disabled, writing to stdout only: {}", reason);
    }

    let result = run(cli, settings).await;

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{:#}", e);
            1
        }
    };

    if let Some(collector) = collector {
        if let Err(e) = collector.wait_for_empty().await {
            println!("Warning: failed to flush logs: {}", e);
        }
    }
    std::process::exit(code);
}

async fn run(cli: Cli, settings: DeployConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Deploy => run_workflow(settings, WorkflowKind::Deploy, cli.dry_run).await,
        Commands::Upgrade => run_workflow(settings, WorkflowKind::Upgrade, cli.dry_run).await,
        Commands::Status => {
            let chain = RpcChainClient::new(settings.target())?;
            let report = check_status(&settings, &chain).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to render status")?
            );
            Ok(())
        }
        Commands::Verify { wait } => run_verify(&settings, wait).await,
        Commands::VerifyStatus { address } => {
            let address = program_address(&settings, address)?;
            let client = VerificationClient::new(settings.verification_url.clone())?;
            let result = client.poll_status(&address).await?;
            log::info!(
                "[Verify] {} verification status: {}{}",
                address,
                result.status,
                result.message.map(|m| format!(" ({})", m)).unwrap_or_default()
            );
            Ok(())
        }
        Commands::VerifyLogs { address } => {
            let address = program_address(&settings, address)?;
            let client = VerificationClient::new(settings.verification_url.clone())?;
            let logs = client.fetch_logs(&address).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&logs).context("Failed to render logs")?
            );
            Ok(())
        }
        Commands::VerifyJob { request_id } => {
            let client = VerificationClient::new(settings.verification_url.clone())?;
            let result = client.job_status(&request_id).await?;
            log::info!(
                "[Verify] Job {}: {}{}",
                request_id,
                result.status,
                result.message.map(|m| format!(" ({})", m)).unwrap_or_default()
            );
            if result.status == VerificationStatus::Failure {
                anyhow::bail!("verification job {} failed", request_id);
            }
            Ok(())
        }
    }
}

async fn run_workflow(settings: DeployConfig, workflow: WorkflowKind, dry_run: bool) -> anyhow::Result<()> {
    let chain = Arc::new(RpcChainClient::new(settings.target())?);
    let orchestrator =
        DeploymentOrchestrator::new(settings, workflow, Arc::new(TokioProcessRunner::new()), chain)
            .with_dry_run(dry_run);

    let report = orchestrator.run().await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &DeploymentReport) {
    log::info!(target: PARSED_TARGET, "==== {} summary ====", report.workflow);
    match report.program_address {
        Some(ref address) => log::info!(target: PARSED_TARGET, "Program:   {}", address),
        None => log::info!(target: PARSED_TARGET, "Program:   not published (dry run)"),
    }
    log::info!(
        target: PARSED_TARGET,
        "Artifact:  {} ({} bytes)",
        report.artifact.file_path.display(),
        report.artifact.size_bytes
    );
    log::info!(target: PARSED_TARGET, "sha256:    {}", report.artifact.digest);
    if let Some(ref signature) = report.signature {
        log::info!(target: PARSED_TARGET, "Signature: {}", signature);
    }
    if let Some(slot) = report.slot {
        log::info!(target: PARSED_TARGET, "Slot:      {}", slot);
    }
    for warning in &report.warnings {
        log::warn!(target: PARSED_TARGET, "{}", warning);
    }
}

async fn run_verify(settings: &DeployConfig, wait: bool) -> anyhow::Result<()> {
    let address = program_address(settings, None)?;
    let request = verification::build_request(settings, &address)?;
    let client = VerificationClient::new(settings.verification_url.clone())?;
    let submitted = client.request_verification(&request).await?;

    let request_id = match (wait, submitted.request_id) {
        (true, Some(id)) => id,
        (_, id) => {
            log::info!(
                "[Verify] Submitted: {}{}",
                submitted.status,
                id.map(|id| format!(" (request id {})", id)).unwrap_or_default()
            );
            return Ok(());
        }
    };

    let deadline = tokio::time::Instant::now() + VERIFY_WAIT_LIMIT;
    loop {
        let result = client.job_status(&request_id).await?;
        match result.status {
            VerificationStatus::Success => {
                log::info!(target: PARSED_TARGET, "VERIFIED: {}", address);
                return Ok(());
            }
            VerificationStatus::Failure => {
                anyhow::bail!(
                    "verification job {} failed: {}",
                    request_id,
                    result.message.unwrap_or_default()
                );
            }
            VerificationStatus::Pending => {
                if tokio::time::Instant::now() >= deadline {
                    anyhow::bail!("verification job {} still pending, giving up", request_id);
                }
                log::info!("[Verify] Job {} pending...", request_id);
                tokio::time::sleep(VERIFY_POLL_INTERVAL).await;
            }
        }
    }
}

fn program_address(settings: &DeployConfig, explicit: Option<String>) -> anyhow::Result<String> {
    match explicit {
        Some(address) => {
            config::keypair::validate_address(&address)?;
            Ok(address)
        }
        None => Ok(config::resolve_program_identity(settings)?.public_address),
    }
}
