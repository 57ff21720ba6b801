//! Publish stage: submit the artifact with the chain CLI, then read it back.
//!
//! A zero exit status alone is never trusted. The program account is fetched
//! afterwards and must exist and be executable before the address is
//! returned.

use crate::chain::ChainClient;
use crate::config::DeployConfig;
use crate::error::{ProcessError, PublishError};
use crate::models::{BuildArtifact, DeploymentTarget, Identity, PublishMode};
use crate::system::process::{OutputMode, ProcessRunner, ProcessSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

// Pre-compiled patterns for the chain CLI's summary lines
static PROGRAM_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*Program Id:\s*([1-9A-HJ-NP-Za-km-z]{32,44})\s*$")
        .expect("Invalid Program Id regex")
});
static SIGNATURE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*Signature:\s*([1-9A-HJ-NP-Za-km-z]{64,88})\s*$")
        .expect("Invalid Signature regex")
});

/// Confirmed result of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub program_address: String,
    pub signature: Option<String>,
}

/// Summary lines scraped from the chain CLI's stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOutput {
    pub program_id: Option<String>,
    pub signature: Option<String>,
}

impl PublishOutput {
    pub fn parse(stdout: &str) -> Self {
        PublishOutput {
            program_id: PROGRAM_ID_REGEX
                .captures(stdout)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string()),
            signature: SIGNATURE_REGEX
                .captures(stdout)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string()),
        }
    }
}


/// Command line for the chain CLI publish call.
pub fn publish_command(
    config: &DeployConfig,
    artifact: &BuildArtifact,
    program: &Identity,
    deployer_keypair: &Path,
    target: &DeploymentTarget,
    mode: PublishMode,
) -> ProcessSpec {
    // Initial deploys sign with the program keypair; upgrades only name the address.
    let program_ref = match mode {
        PublishMode::InitialDeploy => program
            .source
            .clone()
            .unwrap_or_else(|| config.program_keypair_path())
            .display()
            .to_string(),
        PublishMode::Upgrade => program.public_address.clone(),
    };

    let mut spec = ProcessSpec::new(config.publish_program.clone())
        .args(["program", "deploy"])
        .arg(artifact.file_path.display().to_string())
        .arg("--program-id")
        .arg(program_ref)
        .arg("--keypair")
        .arg(deployer_keypair.display().to_string())
        .arg("--url")
        .arg(target.network_endpoint.clone())
        .arg("--commitment")
        .arg(target.commitment.as_str())
        .arg("--with-compute-unit-price")
        .arg(config.priority_fee_micro_lamports.to_string())
        .arg("--max-sign-attempts")
        .arg(config.max_sign_attempts.to_string());
    if mode == PublishMode::Upgrade {
        spec = spec
            .arg("--upgrade-authority")
            .arg(deployer_keypair.display().to_string());
    }

    // No current_dir: artifact and keypair paths are relative to the caller.
    spec.output(OutputMode::Capture)
        .timeout(config.publish_timeout())
}

/// Publish `artifact` and confirm the program is live.
#[allow(clippy::too_many_arguments)]
pub async fn run_publish(
    runner: &dyn ProcessRunner,
    chain: &dyn ChainClient,
    config: &DeployConfig,
    artifact: &BuildArtifact,
    program: &Identity,
    deployer: &Identity,
    target: &DeploymentTarget,
    mode: PublishMode,
) -> Result<PublishOutcome, PublishError> {
    match std::fs::metadata(&artifact.file_path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {}
        _ => return Err(PublishError::ArtifactMissing(artifact.file_path.clone())),
    }

    // Set by the resolver for every identity read from a keypair file.
    let deployer_keypair = deployer
        .source
        .as_deref()
        .ok_or_else(|| PublishError::SignerKeypairMissing(deployer.public_address.clone()))?;
    let spec = publish_command(config, artifact, program, deployer_keypair, target, mode);
    let command = spec.command_line();
    log::info!(
        "[Deploy] [PUBLISH] {} {} via '{}'",
        match mode {
            PublishMode::InitialDeploy => "Deploying",
            PublishMode::Upgrade => "Upgrading",
        },
        program.public_address,
        command
    );

    let outcome = runner.run(&spec).await.map_err(|e| match e {
        ProcessError::TimedOut { command, after } => PublishError::Timeout { command, after },
        other => PublishError::Spawn(other.to_string()),
    })?;

    if !outcome.success() {
        for line in outcome.stderr.lines().filter(|l| !l.trim().is_empty()) {
            log::error!("[Deploy] [PUBLISH] {}", line);
        }
        return Err(PublishError::ToolFailed {
            command,
            exit_code: outcome.exit_code,
        });
    }

    let output = PublishOutput::parse(&outcome.stdout);
    if let Some(ref reported) = output.program_id {
        if reported != &program.public_address {
            return Err(PublishError::VerificationFailed {
                address: program.public_address.clone(),
                reason: format!("publish tool reported program id {}", reported),
            });
        }
    }
    if let Some(ref signature) = output.signature {
        log::info!("[Deploy] [PUBLISH] Signature: {}", signature);
    }

    log::info!(
        "[Deploy] [PUBLISH] Reading back {} at {} commitment",
        program.public_address,
        target.commitment
    );
    let state = chain.get_account(&program.public_address).await?;
    if !state.exists {
        return Err(PublishError::VerificationFailed {
            address: program.public_address.clone(),
            reason: "account not found after publish".to_string(),
        });
    }
    if !state.executable {
        return Err(PublishError::VerificationFailed {
            address: program.public_address.clone(),
            reason: "account exists but is not executable".to_string(),
        });
    }
    log::info!(
        "[Deploy] [PUBLISH] ✓ {} is live and executable",
        program.public_address
    );

    Ok(PublishOutcome {
        program_address: program.public_address.clone(),
        signature: output.signature,
    })
}
