//! Workflow State and Stage Tracking
//!
//! `WorkflowStage` is the linear state machine shared by the deploy and
//! upgrade workflows:
//!
//! ```text
//! Init -> ConfigResolved -> PreconditionsChecked -> Built -> Published -> Done
//!                                                      \-> Done (dry run)
//! ```
//!
//! `Failed` is reachable from every non-terminal stage. `OrchestrationState`
//! records which stage was being attempted when the failure happened.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::models::{PreconditionWarning, WorkflowKind};

/// Discrete stages of a deployment workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStage {
    Init,
    /// Target and identities resolved, deployer pin checked
    ConfigResolved,
    /// Balance, program account and keypair gates passed
    PreconditionsChecked,
    /// Artifact built, located and digested
    Built,
    /// Publish tool succeeded and the read-back confirmed the program is live
    Published,
    Done,
    Failed,
}

impl WorkflowStage {
    /// Get the human-readable name for this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Init => "init",
            WorkflowStage::ConfigResolved => "config_resolved",
            WorkflowStage::PreconditionsChecked => "preconditions_checked",
            WorkflowStage::Built => "built",
            WorkflowStage::Published => "published",
            WorkflowStage::Done => "done",
            WorkflowStage::Failed => "failed",
        }
    }

    /// Get all valid stage transitions FROM this stage.
    pub fn valid_next_stages(&self) -> Vec<WorkflowStage> {
        match self {
            WorkflowStage::Init => vec![WorkflowStage::ConfigResolved, WorkflowStage::Failed],
            WorkflowStage::ConfigResolved => {
                vec![WorkflowStage::PreconditionsChecked, WorkflowStage::Failed]
            }
            WorkflowStage::PreconditionsChecked => vec![WorkflowStage::Built, WorkflowStage::Failed],
            WorkflowStage::Built => vec![
                WorkflowStage::Published,
                WorkflowStage::Done,
                WorkflowStage::Failed,
            ],
            WorkflowStage::Published => vec![WorkflowStage::Done, WorkflowStage::Failed],
            WorkflowStage::Done => vec![],
            WorkflowStage::Failed => vec![],
        }
    }

    /// Check if a transition to the given stage is valid.
    pub fn can_transition_to(&self, next: WorkflowStage) -> bool {
        self.valid_next_stages().contains(&next)
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub workflow: WorkflowKind,

    /// Current stage
    pub stage: WorkflowStage,

    /// Stage that was being attempted when the run failed
    pub failed_stage: Option<WorkflowStage>,

    /// Error message if the run failed
    pub error: Option<String>,

    /// Non-fatal findings accumulated along the way
    pub warnings: Vec<PreconditionWarning>,

    pub start_time: SystemTime,
    pub last_update_time: SystemTime,
}

impl OrchestrationState {
    pub fn new(workflow: WorkflowKind) -> Self {
        let now = SystemTime::now();
        OrchestrationState {
            workflow,
            stage: WorkflowStage::Init,
            failed_stage: None,
            error: None,
            warnings: Vec::new(),
            start_time: now,
            last_update_time: now,
        }
    }

    /// Attempt to transition to the next stage.
    pub fn transition_to(&mut self, next_stage: WorkflowStage) -> Result<(), String> {
        if !self.stage.can_transition_to(next_stage) {
            return Err(format!(
                "Invalid stage transition: {} -> {}",
                self.stage.as_str(),
                next_stage.as_str()
            ));
        }
        self.stage = next_stage;
        self.last_update_time = SystemTime::now();
        Ok(())
    }

    /// Record an error against the stage being attempted and mark the run failed.
    pub fn record_error(&mut self, attempted: WorkflowStage, error: String) {
        self.failed_stage = Some(attempted);
        self.error = Some(error);
        self.stage = WorkflowStage::Failed;
        self.last_update_time = SystemTime::now();
    }

    pub fn record_warnings(&mut self, warnings: &[PreconditionWarning]) {
        self.warnings.extend_from_slice(warnings);
    }
}
