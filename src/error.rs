//! Unified error type hierarchy for the program deployer
//!
//! Every workflow stage has its own error enum (ConfigError, PreconditionError,
//! BuildError, PublishError, VerificationError). Collaborator failures are
//! described by RpcError and ProcessError, and the orchestrator wraps stage
//! failures into WorkflowError so the operator always sees which stage halted.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::models::BuildMode;
use crate::orchestrator::state::WorkflowStage;

/// Configuration and identity resolution errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Malformed configuration: {0}")]
    Malformed(String),

    #[error("Identity mismatch for {role}: expected {expected}, found {actual}")]
    IdentityMismatch {
        role: &'static str,
        expected: String,
        actual: String,
    },

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// JSON-RPC account query errors.
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    Malformed(String),
}

/// External process invocation errors.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("'{command}' did not finish within {}s", .after.as_secs())]
    TimedOut { command: String, after: Duration },

    #[error("Failed to wait for '{command}': {reason}")]
    Wait { command: String, reason: String },
}

/// Pre-mutation gate failures.
#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("Program account {0} does not exist on the target network")]
    ProgramNotFound(String),

    #[error("Program account {0} exists but is not executable")]
    NotExecutable(String),

    #[error("Program keypair file not found: {}", .0.display())]
    ProgramKeypairMissing(PathBuf),

    #[error("Network query failed: {0}")]
    Rpc(#[from] RpcError),
}

/// Build step errors.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Build command '{command}' ({mode}) failed with {}", exit_description(.exit_code))]
    ToolFailed {
        command: String,
        mode: BuildMode,
        exit_code: Option<i32>,
    },

    #[error("Build artifact missing or empty: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("Build command '{command}' timed out after {}s", .after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("Build command could not be started: {0}")]
    Spawn(String),

    #[error("IO error while reading build artifact: {0}")]
    Io(#[from] io::Error),
}

/// Publish / upgrade step errors.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publish command '{command}' failed with {}", exit_description(.exit_code))]
    ToolFailed {
        command: String,
        exit_code: Option<i32>,
    },

    #[error("Post-publish verification failed for {address}: {reason}")]
    VerificationFailed { address: String, reason: String },

    #[error("Publish command '{command}' timed out after {}s", .after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("Publish command could not be started: {0}")]
    Spawn(String),

    #[error("Build artifact is not publishable: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("No keypair file is known for signer {0}")]
    SignerKeypairMissing(String),

    #[error("Read-back query failed: {0}")]
    Rpc(#[from] RpcError),
}

/// Attestation service errors.
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Verification request failed: {0}")]
    RequestFailed(String),
}

/// Failure of one orchestrator stage.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Terminal `Failed(stage, error)` outcome of a workflow run.
#[derive(Error, Debug)]
#[error("Stage '{}' failed: {source}", .stage.as_str())]
pub struct WorkflowError {
    pub stage: WorkflowStage,
    #[source]
    pub source: StageError,
}

impl WorkflowError {
    pub fn new(stage: WorkflowStage, source: impl Into<StageError>) -> Self {
        WorkflowError {
            stage,
            source: source.into(),
        }
    }

    /// Process exit code for a failed workflow.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}
