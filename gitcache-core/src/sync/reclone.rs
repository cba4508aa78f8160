//! Destructive recreation of mirrors

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use crate::git::{redact_url, GitBackend};
use crate::mirror::MirrorSpec;
use crate::Result;

use super::bounded;

/// Delete whatever is at `cache_path` and clone the mirror again
///
/// Single attempt. If the clone fails the mirror stays absent and the next
/// cycle clones it from scratch.
pub async fn reclone(git: &dyn GitBackend, spec: &MirrorSpec, timeout: Duration) -> Result<()> {
    tracing::warn!(
        cache_path = %spec.cache_path.display(),
        "Removing mirror and re-cloning repository"
    );
    remove_path(&spec.cache_path).await?;
    clone_fresh(git, spec, timeout).await
}

/// Bare-clone the mirror into a path that does not exist yet
pub async fn clone_fresh(git: &dyn GitBackend, spec: &MirrorSpec, timeout: Duration) -> Result<()> {
    if let Some(parent) = spec.cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    tracing::info!(
        cache_path = %spec.cache_path.display(),
        remote = %redact_url(&spec.remote_url),
        "Cloning repository"
    );
    bounded(
        "clone",
        timeout,
        git.clone_bare(&spec.remote_url, &spec.cache_path),
    )
    .await
}

async fn remove_path(path: &Path) -> Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await?,
        Ok(_) => tokio::fs::remove_file(path).await?,
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
