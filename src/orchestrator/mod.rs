//! Deployment Orchestration: Init -> ConfigResolved -> PreconditionsChecked -> Built -> Published -> Done.
//!
//! Deploy and upgrade share the same pipeline and differ only in the
//! program-must-exist gate and the publish mode. Every stage is attempted
//! once; the first failure halts the run as `Failed(stage, error)`.

pub mod phases;
pub mod state;

use std::sync::Arc;
use tokio::sync::RwLock;

pub use phases::{check_preconditions, locate_artifact, run_build, run_publish, PublishOutcome};
pub use state::{OrchestrationState, WorkflowStage};

use crate::chain::ChainClient;
use crate::config::{self, DeployConfig, ResolvedConfig};
use crate::error::{StageError, WorkflowError};
use crate::log_collector::PARSED_TARGET;
use crate::models::{format_sol, DeploymentReport, StatusReport, WorkflowKind};
use crate::system::process::ProcessRunner;

/// Runs one deploy or upgrade workflow against injected collaborators.
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    config: DeployConfig,
    workflow: WorkflowKind,
    dry_run: bool,
    runner: Arc<dyn ProcessRunner>,
    chain: Arc<dyn ChainClient>,
    /// Shared so callers can inspect progress while a run is in flight
    state: Arc<RwLock<OrchestrationState>>,
}

impl DeploymentOrchestrator {
    pub fn new(
        config: DeployConfig,
        workflow: WorkflowKind,
        runner: Arc<dyn ProcessRunner>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        DeploymentOrchestrator {
            config,
            workflow,
            dry_run: false,
            runner,
            chain,
            state: Arc::new(RwLock::new(OrchestrationState::new(workflow))),
        }
    }

    /// Stop after the build; nothing is published.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn current_stage(&self) -> WorkflowStage {
        self.state.read().await.stage
    }

    /// Get a snapshot of the current orchestration state.
    pub async fn state_snapshot(&self) -> OrchestrationState {
        self.state.read().await.clone()
    }

    async fn transition_stage(&self, next: WorkflowStage) {
        let mut state = self.state.write().await;
        match state.transition_to(next) {
            Ok(()) => log::info!(target: PARSED_TARGET, "STAGE TRANSITION: {}", next),
            Err(e) => log::error!("[Deploy] [STATE] {}", e),
        }
    }

    async fn fail(&self, attempted: WorkflowStage, error: impl Into<StageError>) -> WorkflowError {
        let error = WorkflowError::new(attempted, error);
        self.state
            .write()
            .await
            .record_error(attempted, error.source.to_string());
        log::error!(target: PARSED_TARGET, "STAGE FAILED: {}: {}", attempted, error.source);
        error
    }

    /// Execute the workflow end to end.
    pub async fn run(&self) -> Result<DeploymentReport, WorkflowError> {
        log::info!(
            target: PARSED_TARGET,
            "WORKFLOW START: {}{}",
            self.workflow,
            if self.dry_run { " (dry run)" } else { "" }
        );

        // Init -> ConfigResolved
        let ResolvedConfig {
            target,
            deployer,
            program,
        } = match config::resolve(&self.config) {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.fail(WorkflowStage::ConfigResolved, e).await),
        };
        self.transition_stage(WorkflowStage::ConfigResolved).await;

        // ConfigResolved -> PreconditionsChecked
        let report = match check_preconditions(
            self.chain.as_ref(),
            &self.config,
            self.workflow,
            &deployer,
            &program,
        )
        .await
        {
            Ok(report) => report,
            Err(e) => return Err(self.fail(WorkflowStage::PreconditionsChecked, e).await),
        };
        self.state.write().await.record_warnings(&report.warnings);
        self.transition_stage(WorkflowStage::PreconditionsChecked).await;

        // PreconditionsChecked -> Built
        let mode = self.config.build_mode;
        let artifact = match run_build(self.runner.as_ref(), &self.config, &target, mode).await {
            Ok(artifact) => artifact,
            Err(e) => return Err(self.fail(WorkflowStage::Built, e).await),
        };
        self.transition_stage(WorkflowStage::Built).await;
        log::info!(
            target: PARSED_TARGET,
            "ARTIFACT: {} ({} bytes, sha256 {})",
            artifact.file_path.display(),
            artifact.size_bytes,
            artifact.digest
        );

        if self.dry_run {
            log::info!("[Deploy] [DRY-RUN] Build complete, skipping publish");
            self.transition_stage(WorkflowStage::Done).await;
            return Ok(DeploymentReport {
                workflow: self.workflow,
                program_address: None,
                artifact,
                warnings: report.warnings,
                signature: None,
                slot: None,
            });
        }

        // Built -> Published
        let published = match run_publish(
            self.runner.as_ref(),
            self.chain.as_ref(),
            &self.config,
            &artifact,
            &program,
            &deployer,
            &target,
            self.workflow.publish_mode(),
        )
        .await
        {
            Ok(published) => published,
            Err(e) => return Err(self.fail(WorkflowStage::Published, e).await),
        };
        self.transition_stage(WorkflowStage::Published).await;

        // Published -> Done
        let slot = match self.chain.get_slot().await {
            Ok(slot) => Some(slot),
            Err(e) => {
                log::warn!("[Deploy] [DONE] ⚠ Could not read current slot: {}", e);
                None
            }
        };
        self.transition_stage(WorkflowStage::Done).await;
        log::info!(
            target: PARSED_TARGET,
            "WORKFLOW DONE: {} {}",
            self.workflow,
            published.program_address
        );

        Ok(DeploymentReport {
            workflow: self.workflow,
            program_address: Some(published.program_address),
            artifact,
            warnings: report.warnings,
            signature: published.signature,
            slot,
        })
    }
}

/// Read-only status check: resolve, then report balance, program state and slot.
pub async fn check_status(
    config: &DeployConfig,
    chain: &dyn ChainClient,
) -> Result<StatusReport, WorkflowError> {
    let resolved = config::resolve(config)
        .map_err(|e| WorkflowError::new(WorkflowStage::ConfigResolved, e))?;

    let query = async {
        let balance = chain.get_balance(&resolved.deployer.public_address).await?;
        let program_state = chain.get_account(&resolved.program.public_address).await?;
        let slot = chain.get_slot().await?;
        Ok::<_, crate::error::RpcError>((balance, program_state, slot))
    };
    let (deployer_balance, program_state, slot) = query
        .await
        .map_err(|e| WorkflowError::new(WorkflowStage::PreconditionsChecked, e))?;

    log::info!(
        "[Status] Deployer {} balance {}",
        resolved.deployer.public_address,
        format_sol(deployer_balance)
    );
    log::info!(
        "[Status] Program {} exists={} executable={} owner={} size={} bytes",
        resolved.program.public_address,
        program_state.exists,
        program_state.executable,
        program_state.owner,
        program_state.data_length
    );
    log::info!("[Status] Current slot {}", slot);

    Ok(StatusReport {
        target: resolved.target,
        deployer_address: resolved.deployer.public_address,
        deployer_balance,
        program_address: resolved.program.public_address,
        program_state,
        slot,
    })
}
