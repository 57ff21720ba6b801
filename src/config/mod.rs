//! Configuration module for deployment workflows.
//!
//! All settings live in one explicit `DeployConfig` value that is constructed
//! once at startup and passed by reference into every component. There is no
//! ambient global state: environment variables are captured into an
//! `EnvOverrides` snapshot and applied on top of the file settings.
//!
//! # Module Structure
//!
//! - `loader`: reads `deploy.toml` and layers defaults, file and environment
//! - `keypair`: parses keypair files into `Identity` values
//! - `resolver`: the Config Resolver stage (identities + target + pin check)
//!
//! # Resolution Order
//!
//! 1. Built-in defaults (`DeployConfig::default()`)
//! 2. TOML file values
//! 3. Environment overrides (`ANCHOR_PROVIDER_URL`, `ANCHOR_WALLET`)
//! 4. Command-line flags (applied by the binary)

pub mod keypair;
pub mod loader;
pub mod resolver;

pub use keypair::read_keypair_file;
pub use loader::{load_config, load_config_from_file};
pub use resolver::{resolve, resolve_program_identity, ResolvedConfig};

use crate::error::ConfigError;
use crate::models::{BuildMode, Commitment, DeploymentTarget, LAMPORTS_PER_SOL};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the network endpoint.
pub const ENV_PROVIDER_URL: &str = "ANCHOR_PROVIDER_URL";

/// Environment variable overriding the signer keypair path.
pub const ENV_WALLET: &str = "ANCHOR_WALLET";

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_VERIFICATION_URL: &str = "https://verify.osec.io";
pub const DEFAULT_LIBRARY_NAME: &str = "test_program";

/// Complete settings for one invocation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeployConfig {
    // Network
    pub rpc_url: String,
    pub commitment: Commitment,

    // Identities
    /// Signer keypair; `~/.config/solana/id.json` when unset.
    pub deployer_keypair_path: Option<PathBuf>,
    /// Pinned address the signer must derive to. Required.
    pub expected_deployer: Option<String>,
    pub program_id: Option<String>,
    /// Program keypair; `<project_dir>/target/deploy/<library_name>-keypair.json` when unset.
    pub program_keypair_path: Option<PathBuf>,

    // Build
    pub library_name: String,
    pub project_dir: PathBuf,
    pub build_mode: BuildMode,
    pub build_program: String,
    pub build_timeout_secs: u64,

    // Publish policy
    pub publish_program: String,
    pub priority_fee_micro_lamports: u64,
    pub max_sign_attempts: u32,
    pub min_balance_lamports: u64,
    pub publish_timeout_secs: u64,

    // Source verification
    pub verification_url: String,
    pub repository_url: Option<String>,
    pub base_image: Option<String>,
    pub mount_path: Option<String>,
    pub cargo_args: Vec<String>,

    // Logging
    pub log_dir: PathBuf,
}

impl Default for DeployConfig {
    fn default() -> Self {
        DeployConfig {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            commitment: Commitment::Confirmed,
            deployer_keypair_path: None,
            expected_deployer: None,
            program_id: None,
            program_keypair_path: None,
            library_name: DEFAULT_LIBRARY_NAME.to_string(),
            project_dir: PathBuf::from("."),
            build_mode: BuildMode::Standard,
            build_program: "anchor".to_string(),
            build_timeout_secs: 30 * 60,
            publish_program: "solana".to_string(),
            priority_fee_micro_lamports: 10_000,
            max_sign_attempts: 10,
            min_balance_lamports: 2 * LAMPORTS_PER_SOL,
            publish_timeout_secs: 15 * 60,
            verification_url: DEFAULT_VERIFICATION_URL.to_string(),
            repository_url: None,
            base_image: None,
            mount_path: None,
            cargo_args: Vec::new(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Snapshot of the environment variables the deployer honours.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub rpc_url: Option<String>,
    pub wallet: Option<PathBuf>,
}

impl EnvOverrides {
    /// Capture overrides from the current process environment.
    pub fn from_process_env() -> Self {
        EnvOverrides {
            rpc_url: std::env::var(ENV_PROVIDER_URL)
                .ok()
                .filter(|v| !v.trim().is_empty()),
            wallet: std::env::var_os(ENV_WALLET)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}

impl DeployConfig {
    /// Apply environment overrides on top of file settings.
    pub fn apply_env(&mut self, env: &EnvOverrides) {
        if let Some(ref url) = env.rpc_url {
            log::debug!("[Config] [ENV] {} overrides rpc_url", ENV_PROVIDER_URL);
            self.rpc_url = url.clone();
        }
        if let Some(ref wallet) = env.wallet {
            log::debug!("[Config] [ENV] {} overrides deployer_keypair_path", ENV_WALLET);
            self.deployer_keypair_path = Some(wallet.clone());
        }
    }

    /// Network endpoint and commitment for this run.
    pub fn target(&self) -> DeploymentTarget {
        DeploymentTarget {
            network_endpoint: self.rpc_url.clone(),
            commitment: self.commitment,
        }
    }

    /// Resolved signer keypair path.
    pub fn deployer_keypair_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.deployer_keypair_path {
            return Ok(path.clone());
        }
        let home = dirs::home_dir().ok_or_else(|| {
            ConfigError::Malformed("Cannot determine home directory".to_string())
        })?;
        Ok(home.join(".config/solana/id.json"))
    }

    /// Resolved program keypair path.
    pub fn program_keypair_path(&self) -> PathBuf {
        match self.program_keypair_path {
            Some(ref path) => path.clone(),
            None => self
                .project_dir
                .join("target/deploy")
                .join(format!("{}-keypair.json", self.library_name)),
        }
    }

    /// Where the build tool leaves the program binary for `mode`.
    pub fn artifact_path(&self, mode: BuildMode) -> PathBuf {
        let subdir = match mode {
            BuildMode::Standard => "target/deploy",
            BuildMode::Reproducible => "target/verifiable",
        };
        self.project_dir
            .join(subdir)
            .join(format!("{}.so", self.library_name))
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    /// Reject settings no workflow could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rpc_url.starts_with("http://") || self.rpc_url.starts_with("https://")) {
            return Err(ConfigError::Malformed(format!(
                "rpc_url must be an http(s) URL, got '{}'",
                self.rpc_url
            )));
        }
        if self.library_name.trim().is_empty() {
            return Err(ConfigError::Malformed(
                "library_name cannot be empty".to_string(),
            ));
        }
        if self.build_timeout_secs == 0 || self.publish_timeout_secs == 0 {
            return Err(ConfigError::Malformed(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.max_sign_attempts == 0 {
            return Err(ConfigError::Malformed(
                "max_sign_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
