//! Test doubles and repository fixtures

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use git2::{Repository, Signature, Time};
use tokio::time::Instant;

use crate::git::{GitBackend, LocalHead, LocalInspector};
use crate::{Error, Result};

/// Fixed commit time so fixture commits hash identically across repos
const FIXTURE_TIME: i64 = 1_700_000_000;

fn signature() -> Signature<'static> {
    Signature::new("Fixture", "fixture@example.com", &Time::new(FIXTURE_TIME, 0)).unwrap()
}

/// Create a bare repository at `path` with one commit on `branch`
pub fn bare_repo_with_commit(path: &Path, branch: &str) -> String {
    let repo = Repository::init_bare(path).unwrap();
    let sig = signature();
    let tree_id = repo.treebuilder(None).unwrap().write().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let refname = format!("refs/heads/{}", branch);
    let oid = repo
        .commit(Some(refname.as_str()), &sig, &sig, "initial", &tree, &[])
        .unwrap();
    repo.set_head(&refname).unwrap();
    oid.to_string()
}

/// Add a commit on top of `branch` in the repository at `path`
pub fn add_commit(path: &Path, branch: &str, message: &str) -> String {
    let repo = Repository::open(path).unwrap();
    let sig = signature();
    let refname = format!("refs/heads/{}", branch);
    let parent = repo
        .find_reference(&refname)
        .unwrap()
        .peel_to_commit()
        .unwrap();
    let tree = parent.tree().unwrap();
    let oid = repo
        .commit(Some(refname.as_str()), &sig, &sig, message, &tree, &[&parent])
        .unwrap();
    oid.to_string()
}

/// An operation the fake backend was asked to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitOp {
    LsRemote(String),
    Clone(PathBuf),
    Fetch {
        path: PathBuf,
        branch: String,
        prune: bool,
    },
}

impl GitOp {
    /// A pruning fetch of `branch` into `path`
    pub fn fetch(path: &Path, branch: &str) -> Self {
        GitOp::Fetch {
            path: path.to_path_buf(),
            branch: branch.to_string(),
            prune: true,
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, GitOp::LsRemote(_))
    }
}

/// Scriptable `GitBackend` that records every call
#[derive(Debug, Default)]
pub struct FakeGit {
    remote_heads: HashMap<String, String>,
    panic_urls: HashSet<String>,
    failing_clones: HashSet<String>,
    failing_fetches: HashSet<PathBuf>,
    hanging_fetches: HashSet<PathBuf>,
    ls_remote_delay: Option<Duration>,
    clone_delay: Option<Duration>,
    create_repos: bool,
    ops: Mutex<Vec<(GitOp, Instant)>>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_head(mut self, url: &str, commit: &str) -> Self {
        self.remote_heads.insert(url.to_string(), commit.to_string());
        self
    }

    pub fn panicking_on(mut self, url: &str) -> Self {
        self.panic_urls.insert(url.to_string());
        self
    }

    pub fn failing_clone(mut self, url: &str) -> Self {
        self.failing_clones.insert(url.to_string());
        self
    }

    pub fn failing_fetch(mut self, path: &Path) -> Self {
        self.failing_fetches.insert(path.to_path_buf());
        self
    }

    pub fn hanging_fetch(mut self, path: &Path) -> Self {
        self.hanging_fetches.insert(path.to_path_buf());
        self
    }

    pub fn with_ls_remote_delay(mut self, delay: Duration) -> Self {
        self.ls_remote_delay = Some(delay);
        self
    }

    pub fn with_clone_delay(mut self, delay: Duration) -> Self {
        self.clone_delay = Some(delay);
        self
    }

    /// Make clones produce a real bare repository with the fixture commit on `main`
    pub fn creating_repos(mut self) -> Self {
        self.create_repos = true;
        self
    }

    fn push(&self, op: GitOp) {
        self.ops.lock().unwrap().push((op, Instant::now()));
    }

    /// Every recorded operation, in call order
    pub fn ops(&self) -> Vec<GitOp> {
        self.ops.lock().unwrap().iter().map(|(op, _)| op.clone()).collect()
    }

    /// Recorded operations with the (tokio) instant they started
    pub fn timed_ops(&self) -> Vec<(GitOp, Instant)> {
        self.ops.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&GitOp) -> bool) -> usize {
        self.ops.lock().unwrap().iter().filter(|(op, _)| pred(op)).count()
    }

    /// Number of clone and fetch calls so far
    pub fn mutations(&self) -> usize {
        self.count(GitOp::is_mutation)
    }
}

#[async_trait]
impl GitBackend for FakeGit {
    async fn ls_remote_head(&self, url: &str, _branch: &str) -> Result<Option<String>> {
        self.push(GitOp::LsRemote(url.to_string()));
        if self.panic_urls.contains(url) {
            panic!("injected panic for {}", url);
        }
        if let Some(delay) = self.ls_remote_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.remote_heads.get(url).cloned())
    }

    async fn clone_bare(&self, url: &str, dest: &Path) -> Result<()> {
        self.push(GitOp::Clone(dest.to_path_buf()));
        if let Some(delay) = self.clone_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_clones.contains(url) {
            return Err(Error::CloneFailed {
                url: url.to_string(),
                stderr: "fatal: repository not found".to_string(),
            });
        }
        if self.create_repos {
            bare_repo_with_commit(dest, "main");
        } else {
            std::fs::create_dir_all(dest)?;
        }
        Ok(())
    }

    async fn fetch(&self, repo: &Path, branch: &str, prune: bool) -> Result<()> {
        self.push(GitOp::Fetch {
            path: repo.to_path_buf(),
            branch: branch.to_string(),
            prune,
        });
        if self.hanging_fetches.contains(repo) {
            std::future::pending::<()>().await;
        }
        if self.failing_fetches.contains(repo) {
            return Err(Error::FetchFailed {
                path: repo.to_path_buf(),
                stderr: "fatal: couldn't find remote ref".to_string(),
            });
        }
        Ok(())
    }
}

/// `LocalInspector` answering from a fixed table; unknown paths are invalid
#[derive(Debug, Default)]
pub struct FakeInspector {
    heads: HashMap<PathBuf, LocalHead>,
}

impl FakeInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_head(mut self, path: &Path, head: LocalHead) -> Self {
        self.heads.insert(path.to_path_buf(), head);
        self
    }
}

#[async_trait]
impl LocalInspector for FakeInspector {
    async fn head_of(&self, path: &Path, _branch: &str) -> Result<LocalHead> {
        Ok(self
            .heads
            .get(path)
            .cloned()
            .unwrap_or_else(|| LocalHead::InvalidRepository("unknown path".to_string())))
    }
}
