//! Program Deployer
//!
//! Builds an on-chain program with the project's build tool, publishes or
//! upgrades it with the chain CLI, confirms the result by reading the program
//! account back, and submits the source for third-party verification.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core data structures and types
//! - **config**: Settings, keypair files and identity resolution
//! - **system**: External process invocation
//! - **chain**: JSON-RPC account queries
//! - **orchestrator**: Stage sequencing and state tracking
//! - **verification**: Attestation service client and git snapshot lookup
//! - **log_collector**: Session logging behind the `log` facade

// Core foundational modules
pub mod error;
pub mod models;

pub mod config;
pub mod system;
pub mod chain;

// Session logging
pub mod log_collector;

pub mod orchestrator;
pub mod verification;

// Re-export the log crate for macro usage
pub use log;

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    BuildError, ConfigError, PreconditionError, ProcessError, PublishError, RpcError, StageError,
    VerificationError, WorkflowError,
};

pub use models::{
    BuildArtifact, BuildMode, Commitment, DeploymentReport, DeploymentTarget, Identity,
    OnChainProgramState, PreconditionReport, PreconditionWarning, PublishMode, StatusReport,
    VerificationRequest, VerificationResult, VerificationStatus, WorkflowKind,
};

pub use config::{DeployConfig, EnvOverrides, ResolvedConfig};
pub use chain::{ChainClient, RpcChainClient};
pub use system::process::{OutputMode, ProcessOutcome, ProcessRunner, ProcessSpec, TokioProcessRunner};
pub use log_collector::{LogCollector, LogLine};
pub use orchestrator::{check_status, DeploymentOrchestrator, OrchestrationState, WorkflowStage};
pub use verification::VerificationClient;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
