//! Build stage: run the build tool, then locate and digest its artifact.

use crate::config::{DeployConfig, ENV_PROVIDER_URL};
use crate::error::{BuildError, ProcessError};
use crate::models::{BuildArtifact, BuildMode, DeploymentTarget};
use crate::system::process::{OutputMode, ProcessRunner, ProcessSpec};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Command line for the configured build tool in `mode`.
pub fn build_command(config: &DeployConfig, target: &DeploymentTarget, mode: BuildMode) -> ProcessSpec {
    let mut spec = ProcessSpec::new(config.build_program.clone())
        .arg("build")
        .env(ENV_PROVIDER_URL, target.network_endpoint.clone())
        .current_dir(config.project_dir.clone())
        .output(OutputMode::Inherit)
        .timeout(config.build_timeout());
    if mode == BuildMode::Reproducible {
        spec = spec.arg("--verifiable");
    }
    spec
}

/// Run the build and return the located artifact.
pub async fn run_build(
    runner: &dyn ProcessRunner,
    config: &DeployConfig,
    target: &DeploymentTarget,
    mode: BuildMode,
) -> Result<BuildArtifact, BuildError> {
    let spec = build_command(config, target, mode);
    let command = spec.command_line();
    let artifact_path = config.artifact_path(mode);
    discard_stale_artifact(&artifact_path)?;
    log::info!("[Deploy] [BUILD] Running '{}' ({} mode)", command, mode);

    let outcome = runner.run(&spec).await.map_err(|e| match e {
        ProcessError::TimedOut { command, after } => BuildError::Timeout { command, after },
        ProcessError::Spawn { .. } => BuildError::Spawn(e.to_string()),
        ProcessError::Wait { .. } => BuildError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())),
    })?;

    if !outcome.success() {
        log::error!(
            "[Deploy] [BUILD] ✗ '{}' exited with {:?}",
            command,
            outcome.exit_code
        );
        return Err(BuildError::ToolFailed {
            command,
            mode,
            exit_code: outcome.exit_code,
        });
    }

    let artifact = locate_artifact(&artifact_path)?;
    log::info!(
        "[Deploy] [BUILD] ✓ Artifact {} ({} bytes)",
        artifact.file_path.display(),
        artifact.size_bytes
    );
    log::info!("[Deploy] [BUILD] sha256: {}", artifact.digest);
    Ok(artifact)
}

/// Remove a binary left by an earlier build; only output of this run is accepted.
fn discard_stale_artifact(path: &Path) -> Result<(), BuildError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("[Deploy] [BUILD] Removed previous artifact {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::Io(e)),
    }
}

/// Check that the artifact exists and is non-empty, then digest it.
pub fn locate_artifact(path: &Path) -> Result<BuildArtifact, BuildError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BuildError::ArtifactMissing(path.to_path_buf()))
        }
        Err(e) => return Err(BuildError::Io(e)),
    };
    if !metadata.is_file() || metadata.len() == 0 {
        return Err(BuildError::ArtifactMissing(path.to_path_buf()));
    }

    Ok(BuildArtifact {
        file_path: path.to_path_buf(),
        size_bytes: metadata.len(),
        digest: sha256_file(path)?,
    })
}

/// Lowercase hex sha-256 of a file.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Commitment;
    use crate::system::process::ProcessOutcome;
    use futures::future::BoxFuture;
    use std::fs;
    use tempfile::TempDir;

    /// Build tool that exits 0 and writes nothing.
    struct SilentBuild;

    impl ProcessRunner for SilentBuild {
        fn run<'a>(
            &'a self,
            _spec: &'a ProcessSpec,
        ) -> BoxFuture<'a, Result<ProcessOutcome, ProcessError>> {
            Box::pin(async {
                Ok(ProcessOutcome {
                    exit_code: Some(0),
                    ..ProcessOutcome::default()
                })
            })
        }
    }

    struct HangingBuild;

    impl ProcessRunner for HangingBuild {
        fn run<'a>(
            &'a self,
            spec: &'a ProcessSpec,
        ) -> BoxFuture<'a, Result<ProcessOutcome, ProcessError>> {
            Box::pin(async move {
                Err(ProcessError::TimedOut {
                    command: spec.command_line(),
                    after: spec.timeout.unwrap_or_default(),
                })
            })
        }
    }

    fn target() -> DeploymentTarget {
        DeploymentTarget {
            network_endpoint: "http://127.0.0.1:8899".to_string(),
            commitment: Commitment::Confirmed,
        }
    }

    #[test]
    fn test_build_command_per_mode() {
        let config = DeployConfig::default();
        let standard = build_command(&config, &target(), BuildMode::Standard);
        assert_eq!(standard.command_line(), "anchor build");
        assert_eq!(standard.output, OutputMode::Inherit);
        assert_eq!(
            standard.env.get(ENV_PROVIDER_URL).map(String::as_str),
            Some("http://127.0.0.1:8899")
        );
        assert_eq!(standard.timeout, Some(config.build_timeout()));

        let reproducible = build_command(&config, &target(), BuildMode::Reproducible);
        assert_eq!(reproducible.command_line(), "anchor build --verifiable");
    }

    #[test]
    fn test_locate_artifact_digest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test_program.so");
        fs::write(&path, b"abc").unwrap();

        let artifact = locate_artifact(&path).unwrap();
        assert_eq!(artifact.size_bytes, 3);
        assert_eq!(
            artifact.digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_locate_artifact_missing_or_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test_program.so");
        assert!(matches!(locate_artifact(&path), Err(BuildError::ArtifactMissing(_))));

        fs::write(&path, b"").unwrap();
        assert!(matches!(locate_artifact(&path), Err(BuildError::ArtifactMissing(_))));

        assert!(matches!(
            locate_artifact(temp_dir.path()),
            Err(BuildError::ArtifactMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_leftover_artifact_is_not_reused() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = DeployConfig::default();
        config.project_dir = temp_dir.path().to_path_buf();
        let stale = config.artifact_path(BuildMode::Standard);
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"binary from an earlier build").unwrap();

        let result = run_build(&SilentBuild, &config, &target(), BuildMode::Standard).await;
        assert!(matches!(result, Err(BuildError::ArtifactMissing(ref p)) if *p == stale));
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn test_build_timeout_maps_to_build_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = DeployConfig::default();
        config.project_dir = temp_dir.path().to_path_buf();
        config.build_timeout_secs = 7;

        let result = run_build(&HangingBuild, &config, &target(), BuildMode::Reproducible).await;
        match result {
            Err(BuildError::Timeout { command, after }) => {
                assert_eq!(command, "anchor build --verifiable");
                assert_eq!(after.as_secs(), 7);
            }
            other => panic!("expected build timeout, got {:?}", other),
        }
    }
}
