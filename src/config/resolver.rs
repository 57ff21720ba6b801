//! Config Resolver stage: turns settings into a target and two identities.

use super::keypair::{read_keypair_file, validate_address};
use super::DeployConfig;
use crate::error::ConfigError;
use crate::models::{DeploymentTarget, Identity};

/// Everything the later stages need, resolved once per run.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub target: DeploymentTarget,
    pub deployer: Identity,
    pub program: Identity,
}

/// Resolve the deployment target, the deployer identity and the program identity.
///
/// The deployer must derive to the pinned `expected_deployer` address; a
/// mismatch is fatal. The program identity comes from `program_id` and, when
/// the program keypair file exists, must agree with it. A missing program
/// keypair is not an error here: first-time deploys report it from the
/// precondition stage.
pub fn resolve(config: &DeployConfig) -> Result<ResolvedConfig, ConfigError> {
    let expected = config.expected_deployer.as_deref().ok_or_else(|| {
        ConfigError::Malformed(
            "expected_deployer is not pinned; refusing to sign with an unchecked key".to_string(),
        )
    })?;
    validate_address(expected)?;

    let deployer_path = config.deployer_keypair_path()?;
    log::info!("[Config] [RESOLVE] Reading deployer keypair: {}", deployer_path.display());
    let deployer = read_keypair_file(&deployer_path)?;

    if deployer.public_address != expected {
        log::error!(
            "[Config] [RESOLVE] ✗ Deployer {} does not match pinned {}",
            deployer.public_address,
            expected
        );
        return Err(ConfigError::IdentityMismatch {
            role: "deployer",
            expected: expected.to_string(),
            actual: deployer.public_address.clone(),
        });
    }
    log::info!("[Config] [RESOLVE] ✓ Deployer identity {}", deployer.public_address);

    let program = resolve_program_identity(config)?;
    log::info!("[Config] [RESOLVE] ✓ Program identity {}", program.public_address);

    let target = config.target();
    log::info!(
        "[Config] [RESOLVE] Target {} (commitment: {})",
        target.network_endpoint,
        target.commitment
    );

    Ok(ResolvedConfig {
        target,
        deployer,
        program,
    })
}

/// Program identity alone; used by commands that never sign.
pub fn resolve_program_identity(config: &DeployConfig) -> Result<Identity, ConfigError> {
    if let Some(ref id) = config.program_id {
        validate_address(id)?;
    }

    let keypair_path = config.program_keypair_path();
    if keypair_path.exists() {
        let program = read_keypair_file(&keypair_path)?;
        if let Some(ref id) = config.program_id {
            if &program.public_address != id {
                return Err(ConfigError::IdentityMismatch {
                    role: "program",
                    expected: id.clone(),
                    actual: program.public_address.clone(),
                });
            }
        }
        return Ok(program);
    }

    match config.program_id {
        Some(ref id) => {
            log::debug!(
                "[Config] [RESOLVE] No program keypair at {}, using configured program_id",
                keypair_path.display()
            );
            Ok(Identity::address_only(id.clone()))
        }
        None => Err(ConfigError::Malformed(format!(
            "program_id is not configured and no program keypair exists at {}",
            keypair_path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_keypair(path: &Path, seed: u8) -> String {
        let signing_key = SigningKey::from_bytes(&[seed; 32]);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            path,
            serde_json::to_string(&signing_key.to_keypair_bytes().to_vec()).unwrap(),
        )
        .unwrap();
        bs58::encode(signing_key.verifying_key().as_bytes()).into_string()
    }

    fn base_config(temp_dir: &TempDir) -> DeployConfig {
        let mut config = DeployConfig::default();
        config.project_dir = temp_dir.path().to_path_buf();
        config.deployer_keypair_path = Some(temp_dir.path().join("id.json"));
        config
    }

    #[test]
    fn test_resolve_success() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = base_config(&temp_dir);
        let deployer = write_keypair(&temp_dir.path().join("id.json"), 1);
        let program = write_keypair(&config.program_keypair_path(), 2);
        config.expected_deployer = Some(deployer.clone());

        let resolved = resolve(&config).expect("resolve should succeed");
        assert_eq!(resolved.deployer.public_address, deployer);
        assert_eq!(resolved.program.public_address, program);
        assert_eq!(resolved.target, config.target());
    }

    #[test]
    fn test_unpinned_deployer_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = base_config(&temp_dir);
        write_keypair(&temp_dir.path().join("id.json"), 1);
        assert!(matches!(resolve(&config), Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_missing_deployer_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = base_config(&temp_dir);
        config.expected_deployer = Some("GZzqLG5WuHm9fipCh5PsEyo841F7Kbz9YvNRYynQQY2Z".to_string());
        assert!(matches!(resolve(&config), Err(ConfigError::MissingFile(_))));
    }

    #[test]
    fn test_program_keypair_must_match_program_id() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = base_config(&temp_dir);
        let deployer = write_keypair(&temp_dir.path().join("id.json"), 1);
        write_keypair(&config.program_keypair_path(), 2);
        config.expected_deployer = Some(deployer);
        config.program_id = Some("GZzqLG5WuHm9fipCh5PsEyo841F7Kbz9YvNRYynQQY2Z".to_string());

        match resolve(&config) {
            Err(ConfigError::IdentityMismatch { role, .. }) => assert_eq!(role, "program"),
            other => panic!("expected program mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_program_id_without_keypair() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = base_config(&temp_dir);
        let deployer = write_keypair(&temp_dir.path().join("id.json"), 1);
        config.expected_deployer = Some(deployer);
        config.program_id = Some("GZzqLG5WuHm9fipCh5PsEyo841F7Kbz9YvNRYynQQY2Z".to_string());

        let resolved = resolve(&config).unwrap();
        assert!(resolved.program.secret_material.is_none());
        assert_eq!(
            resolved.program.public_address,
            "GZzqLG5WuHm9fipCh5PsEyo841F7Kbz9YvNRYynQQY2Z"
        );
    }

    #[test]
    fn test_no_program_identity_at_all() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = base_config(&temp_dir);
        let deployer = write_keypair(&temp_dir.path().join("id.json"), 1);
        config.expected_deployer = Some(deployer);
        assert!(matches!(resolve(&config), Err(ConfigError::Malformed(_))));
    }
}
