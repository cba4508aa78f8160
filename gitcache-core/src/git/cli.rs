//! Remote git operations through the git executable

use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use super::redact::redact_url;
use crate::{Error, Result};

/// The three remote operations the reconciliation engine needs
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Head commit of `branch` on the remote, `None` when the branch does not exist
    async fn ls_remote_head(&self, url: &str, branch: &str) -> Result<Option<String>>;

    /// Create a bare clone of `url` at `dest`
    async fn clone_bare(&self, url: &str, dest: &Path) -> Result<()>;

    /// Update `branch` inside the mirror at `repo` from its origin
    async fn fetch(&self, repo: &Path, branch: &str, prune: bool) -> Result<()>;
}

/// `GitBackend` backed by the system git binary
#[derive(Debug, Clone)]
pub struct SystemGit {
    git_path: String,
}

impl SystemGit {
    /// Use `git` from PATH
    pub fn new() -> Self {
        Self {
            git_path: "git".to_string(),
        }
    }

    /// Use a specific git executable
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.git_path = path.into();
        self
    }

    /// Check if the git executable can be run
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.git_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        // Never block on a credential prompt; a dropped future kills the child.
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn output(&self, mut cmd: Command) -> Result<Output> {
        cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Git(format!(
                    "git executable not found at '{}'. Is git installed?",
                    self.git_path
                ))
            } else {
                Error::Io(e)
            }
        })
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[async_trait]
impl GitBackend for SystemGit {
    async fn ls_remote_head(&self, url: &str, branch: &str) -> Result<Option<String>> {
        let mut cmd = self.command();
        cmd.arg("ls-remote")
            .arg("--")
            .arg(url)
            .arg(format!("refs/heads/{}", branch));

        let output = self.output(cmd).await?;
        if !output.status.success() {
            return Err(Error::Git(format!(
                "git ls-remote {} failed: {}",
                redact_url(url),
                stderr_of(&output)
            )));
        }

        Ok(parse_ls_remote(&String::from_utf8_lossy(&output.stdout), branch))
    }

    async fn clone_bare(&self, url: &str, dest: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("clone").arg("--bare").arg("--").arg(url).arg(dest);

        let output = self.output(cmd).await?;
        if !output.status.success() {
            return Err(Error::CloneFailed {
                url: redact_url(url),
                stderr: stderr_of(&output),
            });
        }

        Ok(())
    }

    async fn fetch(&self, repo: &Path, branch: &str, prune: bool) -> Result<()> {
        // A bare clone has no fetch refspec, so name the destination explicitly
        // or the local branch head would never move.
        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");

        let mut cmd = self.command();
        cmd.arg("-C").arg(repo).arg("fetch");
        if prune {
            cmd.arg("--prune");
        }
        cmd.arg("origin").arg(refspec);

        let output = self.output(cmd).await?;
        if !output.status.success() {
            return Err(Error::FetchFailed {
                path: repo.to_path_buf(),
                stderr: stderr_of(&output),
            });
        }

        Ok(())
    }
}

/// Extract the head commit of `branch` from `git ls-remote` output
///
/// Only an exact `refs/heads/<branch>` match with a well-formed object id
/// counts; anything else is treated as "no commit".
pub fn parse_ls_remote(stdout: &str, branch: &str) -> Option<String> {
    let wanted = format!("refs/heads/{}", branch);

    stdout.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let oid = parts.next()?;
        let refname = parts.next()?;
        (refname == wanted && is_object_id(oid)).then(|| oid.to_string())
    })
}

fn is_object_id(s: &str) -> bool {
    matches!(s.len(), 40 | 64) && s.chars().all(|c| c.is_ascii_hexdigit())
}
