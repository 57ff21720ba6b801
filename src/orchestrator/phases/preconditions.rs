//! Precondition gate: nothing mutating runs until this passes.

use crate::chain::ChainClient;
use crate::config::DeployConfig;
use crate::error::PreconditionError;
use crate::models::{
    format_sol, Identity, PreconditionReport, PreconditionWarning, WorkflowKind,
    UPGRADEABLE_LOADER_ID,
};

/// Check balance, program account and keypair requirements for `workflow`.
///
/// Low balance and an unexpected program owner are reported as warnings;
/// everything else that fails here is fatal.
pub async fn check_preconditions(
    chain: &dyn ChainClient,
    config: &DeployConfig,
    workflow: WorkflowKind,
    deployer: &Identity,
    program: &Identity,
) -> Result<PreconditionReport, PreconditionError> {
    let mut warnings = Vec::new();

    let balance = chain.get_balance(&deployer.public_address).await?;
    log::info!(
        "[Deploy] [PRECHECK] Deployer {} balance: {}",
        deployer.short_address(),
        format_sol(balance)
    );
    if balance < config.min_balance_lamports {
        let warning = PreconditionWarning::LowBalance {
            balance,
            threshold: config.min_balance_lamports,
        };
        log::warn!("[Deploy] [PRECHECK] ⚠ {}", warning);
        warnings.push(warning);
    }

    let program_state = match workflow {
        WorkflowKind::Deploy => {
            let keypair_path = config.program_keypair_path();
            if !keypair_path.exists() {
                log::error!(
                    "[Deploy] [PRECHECK] ✗ Program keypair not found: {}",
                    keypair_path.display()
                );
                return Err(PreconditionError::ProgramKeypairMissing(keypair_path));
            }
            log::info!(
                "[Deploy] [PRECHECK] ✓ Program keypair present: {}",
                keypair_path.display()
            );
            None
        }
        WorkflowKind::Upgrade => {
            let state = chain.get_account(&program.public_address).await?;
            if !state.exists {
                log::error!(
                    "[Deploy] [PRECHECK] ✗ Program {} not found on chain",
                    program.public_address
                );
                return Err(PreconditionError::ProgramNotFound(
                    program.public_address.clone(),
                ));
            }
            if !state.executable {
                log::error!(
                    "[Deploy] [PRECHECK] ✗ Program {} is not executable",
                    program.public_address
                );
                return Err(PreconditionError::NotExecutable(
                    program.public_address.clone(),
                ));
            }
            if state.owner != UPGRADEABLE_LOADER_ID {
                let warning = PreconditionWarning::UnexpectedOwner {
                    expected: UPGRADEABLE_LOADER_ID.to_string(),
                    actual: state.owner.clone(),
                };
                log::warn!("[Deploy] [PRECHECK] ⚠ {}", warning);
                warnings.push(warning);
            }
            log::info!(
                "[Deploy] [PRECHECK] ✓ Program {} is live ({} bytes, owner {})",
                program.short_address(),
                state.data_length,
                state.owner
            );
            Some(state)
        }
    };

    Ok(PreconditionReport {
        deployer_balance: balance,
        program_state,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::models::{OnChainProgramState, LAMPORTS_PER_SOL};
    use futures::future::BoxFuture;
    use std::fs;
    use tempfile::TempDir;

    struct StaticChain {
        balance: u64,
        program: OnChainProgramState,
    }

    impl ChainClient for StaticChain {
        fn get_balance<'a>(&'a self, _address: &'a str) -> BoxFuture<'a, Result<u64, RpcError>> {
            Box::pin(async move { Ok(self.balance) })
        }

        fn get_account<'a>(
            &'a self,
            _address: &'a str,
        ) -> BoxFuture<'a, Result<OnChainProgramState, RpcError>> {
            Box::pin(async move { Ok(self.program.clone()) })
        }

        fn get_slot(&self) -> BoxFuture<'_, Result<u64, RpcError>> {
            Box::pin(async { Ok(1) })
        }
    }

    struct DownChain;

    impl ChainClient for DownChain {
        fn get_balance<'a>(&'a self, _address: &'a str) -> BoxFuture<'a, Result<u64, RpcError>> {
            Box::pin(async { Err(RpcError::Transport("connection refused".to_string())) })
        }

        fn get_account<'a>(
            &'a self,
            _address: &'a str,
        ) -> BoxFuture<'a, Result<OnChainProgramState, RpcError>> {
            Box::pin(async { Err(RpcError::Transport("connection refused".to_string())) })
        }

        fn get_slot(&self) -> BoxFuture<'_, Result<u64, RpcError>> {
            Box::pin(async { Err(RpcError::Transport("connection refused".to_string())) })
        }
    }

    fn live_program(owner: &str) -> OnChainProgramState {
        OnChainProgramState {
            exists: true,
            executable: true,
            owner: owner.to_string(),
            data_length: 36,
            balance: 1_141_440,
        }
    }

    fn identities() -> (Identity, Identity) {
        (
            Identity::address_only("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"),
            Identity::address_only("GZzqLG5WuHm9fipCh5PsEyo841F7Kbz9YvNRYynQQY2Z"),
        )
    }

    #[tokio::test]
    async fn test_upgrade_passes_with_live_program() {
        let chain = StaticChain {
            balance: 5 * LAMPORTS_PER_SOL,
            program: live_program(UPGRADEABLE_LOADER_ID),
        };
        let (deployer, program) = identities();
        let report = check_preconditions(
            &chain,
            &DeployConfig::default(),
            WorkflowKind::Upgrade,
            &deployer,
            &program,
        )
        .await
        .unwrap();

        assert_eq!(report.deployer_balance, 5 * LAMPORTS_PER_SOL);
        assert!(report.warnings.is_empty());
        assert!(report.program_state.unwrap().is_live());
    }

    #[tokio::test]
    async fn test_low_balance_and_owner_are_warnings() {
        let chain = StaticChain {
            balance: LAMPORTS_PER_SOL / 2,
            program: live_program("BPFLoader2111111111111111111111111111111111"),
        };
        let (deployer, program) = identities();
        let report = check_preconditions(
            &chain,
            &DeployConfig::default(),
            WorkflowKind::Upgrade,
            &deployer,
            &program,
        )
        .await
        .unwrap();

        assert_eq!(report.warnings.len(), 2);
        assert!(matches!(
            report.warnings[0],
            PreconditionWarning::LowBalance { balance, .. } if balance == LAMPORTS_PER_SOL / 2
        ));
        assert!(matches!(
            report.warnings[1],
            PreconditionWarning::UnexpectedOwner { .. }
        ));
    }

    #[tokio::test]
    async fn test_upgrade_missing_or_inert_program() {
        let (deployer, program) = identities();
        let config = DeployConfig::default();

        let missing = StaticChain {
            balance: 5 * LAMPORTS_PER_SOL,
            program: OnChainProgramState::missing(),
        };
        let result =
            check_preconditions(&missing, &config, WorkflowKind::Upgrade, &deployer, &program).await;
        assert!(matches!(result, Err(PreconditionError::ProgramNotFound(_))));

        let mut inert_state = live_program(UPGRADEABLE_LOADER_ID);
        inert_state.executable = false;
        let inert = StaticChain {
            balance: 5 * LAMPORTS_PER_SOL,
            program: inert_state,
        };
        let result =
            check_preconditions(&inert, &config, WorkflowKind::Upgrade, &deployer, &program).await;
        assert!(matches!(result, Err(PreconditionError::NotExecutable(_))));
    }

    #[tokio::test]
    async fn test_deploy_requires_program_keypair() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = DeployConfig::default();
        config.project_dir = temp_dir.path().to_path_buf();
        let chain = StaticChain {
            balance: 5 * LAMPORTS_PER_SOL,
            program: OnChainProgramState::missing(),
        };
        let (deployer, program) = identities();

        let result =
            check_preconditions(&chain, &config, WorkflowKind::Deploy, &deployer, &program).await;
        assert!(matches!(result, Err(PreconditionError::ProgramKeypairMissing(_))));

        let keypair_path = config.program_keypair_path();
        fs::create_dir_all(keypair_path.parent().unwrap()).unwrap();
        fs::write(&keypair_path, "[]").unwrap();
        let report = check_preconditions(&chain, &config, WorkflowKind::Deploy, &deployer, &program)
            .await
            .unwrap();
        assert!(report.program_state.is_none());
    }

    #[tokio::test]
    async fn test_rpc_failure_surfaces() {
        let (deployer, program) = identities();
        let result = check_preconditions(
            &DownChain,
            &DeployConfig::default(),
            WorkflowKind::Upgrade,
            &deployer,
            &program,
        )
        .await;
        assert!(matches!(result, Err(PreconditionError::Rpc(RpcError::Transport(_)))));
    }
}
