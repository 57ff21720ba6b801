//! Shared fixtures: keypair files, a scratch project, and fake collaborators.

#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use futures::future::BoxFuture;
use program_deployer::error::{ProcessError, RpcError};
use program_deployer::models::{OnChainProgramState, LAMPORTS_PER_SOL, UPGRADEABLE_LOADER_ID};
use program_deployer::{ChainClient, DeployConfig, ProcessOutcome, ProcessRunner, ProcessSpec};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const DEPLOYER_SEED: u8 = 1;
pub const PROGRAM_SEED: u8 = 2;

/// Write a keypair file derived from `seed` and return its address.
pub fn write_keypair(path: &Path, seed: u8) -> String {
    let signing_key = SigningKey::from_bytes(&[seed; 32]);
    fs::create_dir_all(path.parent().expect("keypair path has a parent")).unwrap();
    fs::write(
        path,
        serde_json::to_string(&signing_key.to_keypair_bytes().to_vec()).unwrap(),
    )
    .unwrap();
    address_for_seed(seed)
}

pub fn address_for_seed(seed: u8) -> String {
    let signing_key = SigningKey::from_bytes(&[seed; 32]);
    bs58::encode(signing_key.verifying_key().as_bytes()).into_string()
}

/// Scratch program project with both keypairs in place.
pub struct TestProject {
    pub dir: TempDir,
    pub config: DeployConfig,
    pub deployer: String,
    pub program: String,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = DeployConfig::default();
        config.project_dir = dir.path().to_path_buf();
        config.rpc_url = "http://127.0.0.1:8899".to_string();
        config.deployer_keypair_path = Some(dir.path().join("id.json"));
        config.log_dir = dir.path().join("logs");

        let deployer = write_keypair(&dir.path().join("id.json"), DEPLOYER_SEED);
        let program = write_keypair(&config.program_keypair_path(), PROGRAM_SEED);
        config.expected_deployer = Some(deployer.clone());
        config.program_id = Some(program.clone());

        TestProject {
            dir,
            config,
            deployer,
            program,
        }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.config.artifact_path(self.config.build_mode)
    }
}

pub fn live_program() -> OnChainProgramState {
    OnChainProgramState {
        exists: true,
        executable: true,
        owner: UPGRADEABLE_LOADER_ID.to_string(),
        data_length: 36,
        balance: 1_141_440,
    }
}

/// In-memory chain whose program account can be swapped by a publish.
pub struct FakeChain {
    pub balance: u64,
    pub program: Arc<Mutex<OnChainProgramState>>,
    pub slot: u64,
    pub calls: AtomicUsize,
}

impl FakeChain {
    pub fn new(balance: u64, program: OnChainProgramState) -> Self {
        FakeChain {
            balance,
            program: Arc::new(Mutex::new(program)),
            slot: 250_000_000,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn funded(program: OnChainProgramState) -> Self {
        FakeChain::new(10 * LAMPORTS_PER_SOL, program)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChainClient for FakeChain {
    fn get_balance<'a>(&'a self, _address: &'a str) -> BoxFuture<'a, Result<u64, RpcError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(self.balance) })
    }

    fn get_account<'a>(
        &'a self,
        _address: &'a str,
    ) -> BoxFuture<'a, Result<OnChainProgramState, RpcError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(self.program.lock().unwrap().clone()) })
    }

    fn get_slot(&self) -> BoxFuture<'_, Result<u64, RpcError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(self.slot) })
    }
}

/// Stands in for the build tool and the chain CLI.
pub struct FakeRunner {
    pub build_exit: i32,
    /// Written by a successful build, like the real tool would.
    pub artifact: Option<PathBuf>,
    pub publish_exit: i32,
    pub publish_stdout: String,
    /// Program account state after a successful publish.
    pub publish_effect: Option<(Arc<Mutex<OnChainProgramState>>, OnChainProgramState)>,
    /// First argument (`build` or `program`) of the command that never finishes.
    pub times_out: Option<&'static str>,
    pub calls: Mutex<Vec<ProcessSpec>>,
}

impl FakeRunner {
    pub fn new(artifact: PathBuf) -> Self {
        FakeRunner {
            build_exit: 0,
            artifact: Some(artifact),
            publish_exit: 0,
            publish_stdout: String::new(),
            publish_effect: None,
            times_out: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn publishing_to(mut self, chain: &FakeChain, after: OnChainProgramState) -> Self {
        self.publish_effect = Some((Arc::clone(&chain.program), after));
        self
    }

    pub fn recorded(&self) -> Vec<ProcessSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn publish_calls(&self) -> usize {
        self.recorded()
            .iter()
            .filter(|spec| spec.args.first().map(String::as_str) == Some("program"))
            .count()
    }
}

impl ProcessRunner for FakeRunner {
    fn run<'a>(
        &'a self,
        spec: &'a ProcessSpec,
    ) -> BoxFuture<'a, Result<ProcessOutcome, ProcessError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(spec.clone());

            let first = spec.args.first().map(String::as_str);
            if first.is_some() && first == self.times_out {
                return Err(ProcessError::TimedOut {
                    command: spec.command_line(),
                    after: spec.timeout.unwrap_or_default(),
                });
            }

            match first {
                Some("build") => {
                    if self.build_exit == 0 {
                        if let Some(ref artifact) = self.artifact {
                            fs::create_dir_all(artifact.parent().unwrap()).unwrap();
                            fs::write(artifact, b"\x7fELF fake program").unwrap();
                        }
                    }
                    Ok(ProcessOutcome {
                        exit_code: Some(self.build_exit),
                        ..ProcessOutcome::default()
                    })
                }
                Some("program") => {
                    if self.publish_exit == 0 {
                        if let Some((ref account, ref after)) = self.publish_effect {
                            *account.lock().unwrap() = after.clone();
                        }
                    }
                    Ok(ProcessOutcome {
                        exit_code: Some(self.publish_exit),
                        stdout: self.publish_stdout.clone(),
                        stderr: if self.publish_exit == 0 {
                            String::new()
                        } else {
                            "Error: Account has insufficient funds".to_string()
                        },
                    })
                }
                _ => Err(ProcessError::Spawn {
                    command: spec.command_line(),
                    reason: "unexpected command".to_string(),
                }),
            }
        })
    }
}
