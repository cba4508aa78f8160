//! Local mirror inspection

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{ErrorCode, Repository};

use crate::{Error, Result};

/// What a mirror directory says about the tracked branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalHead {
    /// The branch exists and points at this commit
    Commit(String),
    /// The repository is valid but has no such branch
    BranchAbsent,
    /// Missing, unreadable, or not a repository at all
    InvalidRepository(String),
}

impl LocalHead {
    /// The commit hash, if one was found
    pub fn commit(&self) -> Option<&str> {
        match self {
            LocalHead::Commit(oid) => Some(oid),
            _ => None,
        }
    }

    /// Whether the mirror needs to be recreated
    pub fn is_invalid(&self) -> bool {
        matches!(self, LocalHead::InvalidRepository(_))
    }
}

/// Reads the branch head of a local mirror
#[async_trait]
pub trait LocalInspector: Send + Sync {
    /// Inspect `path` for the head of `branch`
    ///
    /// An `Err` means the inspection itself could not run; a broken mirror is
    /// reported as `LocalHead::InvalidRepository`.
    async fn head_of(&self, path: &Path, branch: &str) -> Result<LocalHead>;
}

/// `LocalInspector` backed by git2, run on the blocking pool
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Inspector;

impl Git2Inspector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LocalInspector for Git2Inspector {
    async fn head_of(&self, path: &Path, branch: &str) -> Result<LocalHead> {
        let path: PathBuf = path.to_path_buf();
        let branch = branch.to_string();
        tokio::task::spawn_blocking(move || inspect(&path, &branch))
            .await
            .map_err(|e| Error::Git(format!("Local inspection task failed: {}", e)))
    }
}

/// Synchronously inspect a mirror directory
pub fn inspect(path: &Path, branch: &str) -> LocalHead {
    if !path.exists() {
        return LocalHead::InvalidRepository(format!("{} does not exist", path.display()));
    }

    let repo = match Repository::open(path) {
        Ok(repo) => repo,
        Err(e) => {
            return LocalHead::InvalidRepository(format!(
                "{} is not a git repository: {}",
                path.display(),
                e.message()
            ))
        }
    };

    let refname = format!("refs/heads/{}", branch);
    let reference = match repo.find_reference(&refname) {
        Ok(r) => r,
        Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
            tracing::debug!(path = %path.display(), branch, "Branch does not exist locally");
            return LocalHead::BranchAbsent;
        }
        Err(e) => {
            return LocalHead::InvalidRepository(format!(
                "Failed to read {}: {}",
                refname,
                e.message()
            ))
        }
    };

    // A ref pointing at a missing object means the object store is damaged.
    let head = match reference.peel_to_commit() {
        Ok(commit) => LocalHead::Commit(commit.id().to_string()),
        Err(e) => LocalHead::InvalidRepository(format!(
            "{} does not resolve to a commit: {}",
            refname,
            e.message()
        )),
    };
    head
}
