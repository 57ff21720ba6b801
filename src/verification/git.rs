//! Source snapshot lookup using the `git2` crate.

use crate::models::PLACEHOLDER_COMMIT;
use git2::Repository;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading the local repository
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Remote not found: {0}")]
    RemoteNotFound(String),
}

/// Result type for git operations
pub type GitResult<T> = Result<T, GitError>;

/// The repository containing a project directory.
pub struct SourceSnapshot {
    repo: Repository,
}

impl SourceSnapshot {
    /// Find the repository that contains `project_dir`, searching upwards.
    pub fn discover(project_dir: impl AsRef<Path>) -> GitResult<Self> {
        let repo = Repository::discover(project_dir.as_ref()).map_err(|e| {
            GitError::Repository(format!(
                "No git repository at or above {}: {}",
                project_dir.as_ref().display(),
                e
            ))
        })?;
        Ok(SourceSnapshot { repo })
    }

    /// Full hash of the commit HEAD points at.
    pub fn head_commit(&self) -> GitResult<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| GitError::Repository(format!("Failed to read HEAD: {}", e)))?;
        let commit = head
            .peel_to_commit()
            .map_err(|e| GitError::Repository(format!("HEAD does not point at a commit: {}", e)))?;
        Ok(commit.id().to_string())
    }

    /// URL of the named remote, usually `origin`.
    pub fn remote_url(&self, name: &str) -> GitResult<String> {
        let remote = self
            .repo
            .find_remote(name)
            .map_err(|_| GitError::RemoteNotFound(name.to_string()))?;
        remote
            .url()
            .map(str::to_string)
            .ok_or_else(|| GitError::Repository(format!("Remote '{}' has no UTF-8 URL", name)))
    }
}

/// HEAD commit of the project, or the all-zero placeholder when there is none.
pub fn commit_or_placeholder(project_dir: &Path) -> String {
    match SourceSnapshot::discover(project_dir).and_then(|snapshot| snapshot.head_commit()) {
        Ok(commit) => commit,
        Err(e) => {
            log::warn!(
                "[Verify] [GIT] ⚠ No local commit ({}), using placeholder {}",
                e,
                PLACEHOLDER_COMMIT
            );
            PLACEHOLDER_COMMIT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;
    use tempfile::TempDir;

    fn commit_file(repo: &Repository, name: &str) -> String {
        let workdir = repo.workdir().unwrap();
        fs::write(workdir.join(name), "content").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Deployer Test", "deployer@example.com").unwrap();
        let parents: Vec<git2::Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parent_refs)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_head_commit_from_subdirectory() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        let expected = commit_file(&repo, "Anchor.toml");
        let nested = temp_dir.path().join("programs/test_program");
        fs::create_dir_all(&nested).unwrap();

        let snapshot = SourceSnapshot::discover(&nested).unwrap();
        assert_eq!(snapshot.head_commit().unwrap(), expected);
        assert_eq!(commit_or_placeholder(&nested), expected);
    }

    #[test]
    fn test_unborn_head_falls_back_to_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        Repository::init(temp_dir.path()).unwrap();
        assert_eq!(commit_or_placeholder(temp_dir.path()), PLACEHOLDER_COMMIT);
    }

    #[test]
    fn test_remote_url() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        repo.remote("origin", "https://github.com/example/test_program")
            .unwrap();

        let snapshot = SourceSnapshot::discover(temp_dir.path()).unwrap();
        assert_eq!(
            snapshot.remote_url("origin").unwrap(),
            "https://github.com/example/test_program"
        );
        assert!(matches!(
            snapshot.remote_url("upstream"),
            Err(GitError::RemoteNotFound(_))
        ));
    }
}
