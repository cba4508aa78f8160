//! Per-mirror sync worker

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::CommitRecording;
use crate::git::{redact_url, GitBackend, LocalHead, LocalInspector};
use crate::mirror::{Mirror, MirrorSpec};
use crate::Result;

use super::reclone::{clone_fresh, reclone};
use super::{bounded, decide, Decision, SyncOutcome, SyncPhase, SyncSettings};

/// Brings one mirror up to date per invocation
pub struct SyncWorker {
    git: Arc<dyn GitBackend>,
    inspector: Arc<dyn LocalInspector>,
    settings: SyncSettings,
}

impl std::fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SyncWorker {
    /// Create a worker over the given collaborators
    pub fn new(
        git: Arc<dyn GitBackend>,
        inspector: Arc<dyn LocalInspector>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            git,
            inspector,
            settings,
        }
    }

    /// Delete and reclone a mirror under its lock
    pub async fn force_reclone(&self, mirror: &Mirror) -> Result<()> {
        let _guard = mirror.lock().await;
        mirror.enter(SyncPhase::Reclone).await;
        let result = reclone(self.git.as_ref(), mirror.spec(), self.settings.operation_timeout).await;
        mirror.enter(SyncPhase::Recorded).await;
        result
    }

    /// Run one cycle of the state machine for `mirror`
    ///
    /// State is recorded whatever happens; the returned error is for logging
    /// and reporting only.
    pub async fn sync(&self, mirror: &Mirror, cycle_started: DateTime<Utc>) -> Result<SyncOutcome> {
        let _guard = mirror.lock().await;
        let spec = mirror.spec();

        mirror.enter(SyncPhase::ProbingRemote).await;
        let remote = self.probe_remote(spec).await;

        let result = self.reconcile(mirror, remote.as_deref()).await;
        self.record(mirror, cycle_started, remote, &result).await;
        result
    }

    /// Remote head, or `None` on any failure
    async fn probe_remote(&self, spec: &MirrorSpec) -> Option<String> {
        let probe = self.git.ls_remote_head(&spec.remote_url, &spec.branch);
        match bounded("ls-remote", self.settings.operation_timeout, probe).await {
            Ok(Some(commit)) => Some(commit),
            Ok(None) => {
                tracing::warn!(
                    remote = %redact_url(&spec.remote_url),
                    branch = %spec.branch,
                    "Branch not found on remote"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    remote = %redact_url(&spec.remote_url),
                    branch = %spec.branch,
                    error = %e,
                    "Error fetching remote commit"
                );
                None
            }
        }
    }

    async fn reconcile(&self, mirror: &Mirror, remote: Option<&str>) -> Result<SyncOutcome> {
        let spec = mirror.spec();
        let timeout = self.settings.operation_timeout;

        mirror.enter(SyncPhase::ProbingLocal).await;
        let local = bounded(
            "local inspection",
            timeout,
            self.inspector.head_of(&spec.cache_path, &spec.branch),
        )
        .await?;

        match decide(remote, &local, self.settings.on_remote_unavailable) {
            Decision::UpToDate => {
                mirror.enter(SyncPhase::UpToDate).await;
                tracing::info!(mirror = %spec.label(), "Cache is up to date");
                return Ok(SyncOutcome::UpToDate);
            }
            Decision::Deferred => {
                tracing::info!(
                    mirror = %spec.label(),
                    "Remote head unknown, keeping existing mirror"
                );
                return Ok(SyncOutcome::Deferred);
            }
            Decision::NeedsUpdate => {
                mirror.enter(SyncPhase::NeedsUpdate).await;
                tracing::info!(
                    mirror = %spec.label(),
                    remote = remote.unwrap_or("<unknown>"),
                    local = ?local,
                    "New changes detected, fetching updates"
                );
            }
        }

        mirror.enter(SyncPhase::EnsureExists).await;
        let outcome = self.ensure_exists(mirror, &local).await?;

        mirror.enter(SyncPhase::Fetching).await;
        bounded(
            "fetch",
            timeout,
            self.git.fetch(&spec.cache_path, &spec.branch, self.settings.prune),
        )
        .await?;

        Ok(outcome)
    }

    async fn ensure_exists(&self, mirror: &Mirror, local: &LocalHead) -> Result<SyncOutcome> {
        let spec = mirror.spec();
        let timeout = self.settings.operation_timeout;

        if !tokio::fs::try_exists(&spec.cache_path).await? {
            clone_fresh(self.git.as_ref(), spec, timeout).await?;
            return Ok(SyncOutcome::Cloned);
        }

        if let LocalHead::InvalidRepository(reason) = local {
            tracing::warn!(
                cache_path = %spec.cache_path.display(),
                reason = %reason,
                "Path exists but is not a valid git repository"
            );
            mirror.enter(SyncPhase::Reclone).await;
            reclone(self.git.as_ref(), spec, timeout).await?;
            return Ok(SyncOutcome::Recloned);
        }

        tracing::debug!(cache_path = %spec.cache_path.display(), "Repository exists");
        Ok(SyncOutcome::Fetched)
    }

    async fn record(
        &self,
        mirror: &Mirror,
        cycle_started: DateTime<Utc>,
        remote: Option<String>,
        result: &Result<SyncOutcome>,
    ) {
        let spec = mirror.spec();
        let write_commit = match self.settings.record_commit {
            CommitRecording::Observed => true,
            CommitRecording::OnSuccess => {
                remote.is_some() && matches!(result, Ok(outcome) if outcome.is_in_sync())
            }
        };

        match result {
            Ok(outcome) => tracing::info!(
                mirror = %spec.label(),
                %outcome,
                commit = remote.as_deref().unwrap_or(""),
                "Mirror updated"
            ),
            Err(e) => tracing::warn!(
                mirror = %spec.label(),
                error = %e,
                commit = remote.as_deref().unwrap_or(""),
                "Mirror sync failed, will retry next cycle"
            ),
        }

        mirror
            .update(|state| {
                state.last_updated = Some(cycle_started);
                if write_commit {
                    state.latest_commit = remote;
                }
                match result {
                    Ok(outcome) => {
                        state.last_outcome = Some(*outcome);
                        state.last_error = None;
                        state.consecutive_failures = 0;
                    }
                    Err(e) => {
                        state.last_error = Some(e.to_string());
                        state.consecutive_failures += 1;
                    }
                }
                state.phase = Some(SyncPhase::Recorded);
            })
            .await;
    }
}
