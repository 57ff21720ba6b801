//! Core data types for the program deployer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Owner of every program that can be upgraded after deployment.
pub const UPGRADEABLE_LOADER_ID: &str = "BPFLoaderUpgradeab1e11111111111111111111111";

/// Base units per native token.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Commit hash sent when the project is not inside a git checkout.
pub const PLACEHOLDER_COMMIT: &str = "0000000000000000000000000000000000000000";

/// Durability guarantee requested when reading network state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            _ => Err(format!("Unknown commitment level: {}", s)),
        }
    }
}

/// Network the workflow runs against. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub network_endpoint: String,
    pub commitment: Commitment,
}

/// Raw keypair bytes, wiped from memory on drop.
#[derive(Clone)]
pub struct SecretMaterial(Zeroizing<Vec<u8>>);

impl SecretMaterial {
    pub fn new(bytes: Vec<u8>) -> Self {
        SecretMaterial(Zeroizing::new(bytes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretMaterial([REDACTED; {} bytes])", self.0.len())
    }
}

/// A signing identity or program identity.
///
/// `source` is the file the identity was loaded from; the chain CLI is handed
/// that path rather than the secret bytes.
#[derive(Debug, Clone)]
pub struct Identity {
    pub public_address: String,
    pub secret_material: Option<SecretMaterial>,
    pub source: Option<PathBuf>,
}

impl Identity {
    /// Identity known only by its address (e.g. an already deployed program).
    pub fn address_only(address: impl Into<String>) -> Self {
        Identity {
            public_address: address.into(),
            secret_material: None,
            source: None,
        }
    }

    /// Shortened address for log lines.
    pub fn short_address(&self) -> String {
        short_address(&self.public_address)
    }
}

/// Abbreviate a base58 address as `abcd..wxyz`.
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 12 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}..{}", head, tail)
}

/// Which build pipeline variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Standard,
    /// Containerized build whose output can be rebuilt bit-for-bit by a third party.
    Reproducible,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Standard => write!(f, "standard"),
            BuildMode::Reproducible => write!(f, "reproducible"),
        }
    }
}

/// How the artifact reaches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishMode {
    InitialDeploy,
    Upgrade,
}

/// Entry workflow selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    Deploy,
    Upgrade,
}

impl WorkflowKind {
    pub fn publish_mode(&self) -> PublishMode {
        match self {
            WorkflowKind::Deploy => PublishMode::InitialDeploy,
            WorkflowKind::Upgrade => PublishMode::Upgrade,
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowKind::Deploy => write!(f, "deploy"),
            WorkflowKind::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// Output of the build step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub file_path: PathBuf,
    pub size_bytes: u64,
    /// Lowercase hex sha-256 of the file contents.
    pub digest: String,
}

/// Read-only projection of a program account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OnChainProgramState {
    pub exists: bool,
    pub executable: bool,
    pub owner: String,
    pub data_length: u64,
    pub balance: u64,
}

impl OnChainProgramState {
    pub fn missing() -> Self {
        OnChainProgramState::default()
    }

    /// True when the account exists and is marked executable.
    pub fn is_live(&self) -> bool {
        self.exists && self.executable
    }
}

/// Build parameters submitted to the attestation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub repository: String,
    pub program_id: String,
    pub commit_hash: String,
    pub lib_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub cargo_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Success,
    Failure,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStatus::Pending => write!(f, "pending"),
            VerificationStatus::Success => write!(f, "success"),
            VerificationStatus::Failure => write!(f, "failure"),
        }
    }
}

/// The service's current view of a verification job. Never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub request_id: Option<String>,
    pub status: VerificationStatus,
    pub message: Option<String>,
}

/// Advisory findings that do not stop the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreconditionWarning {
    LowBalance { balance: u64, threshold: u64 },
    UnexpectedOwner { expected: String, actual: String },
}

impl fmt::Display for PreconditionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionWarning::LowBalance { balance, threshold } => write!(
                f,
                "deployer balance {} is below the recommended {}",
                format_sol(*balance),
                format_sol(*threshold)
            ),
            PreconditionWarning::UnexpectedOwner { expected, actual } => write!(
                f,
                "program is owned by {} instead of {}; upgrade may be rejected",
                actual, expected
            ),
        }
    }
}

/// Outcome of the precondition gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreconditionReport {
    pub deployer_balance: u64,
    pub program_state: Option<OnChainProgramState>,
    pub warnings: Vec<PreconditionWarning>,
}

/// Summary returned by a completed workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub workflow: WorkflowKind,
    /// `None` when the run stopped after the build (dry run).
    pub program_address: Option<String>,
    pub artifact: BuildArtifact,
    pub warnings: Vec<PreconditionWarning>,
    pub signature: Option<String>,
    pub slot: Option<u64>,
}

/// Read-only snapshot printed by the status command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub target: DeploymentTarget,
    pub deployer_address: String,
    pub deployer_balance: u64,
    pub program_address: String,
    pub program_state: OnChainProgramState,
    pub slot: u64,
}

/// Render base units as a decimal token amount.
pub fn format_sol(lamports: u64) -> String {
    format!(
        "{}.{:09} SOL",
        lamports / LAMPORTS_PER_SOL,
        lamports % LAMPORTS_PER_SOL
    )
}
