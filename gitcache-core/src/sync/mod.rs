//! Reconciliation engine
//!
//! The scheduler fans out one [`SyncWorker`] per mirror each cycle. A worker
//! walks the per-mirror state machine:
//!
//! ```text
//! ProbingRemote -> ProbingLocal -> UpToDate
//!                               -> NeedsUpdate -> EnsureExists -> Fetching -> Recorded
//!                                                      `-> Reclone -^
//! ```
//!
//! `Recorded` is reached on every path, failures included.

mod reclone;
mod scheduler;
mod worker;

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{CommitRecording, Config, RemoteUnavailablePolicy};
use crate::git::LocalHead;
use crate::{Error, Result};

pub use reclone::{clone_fresh, reclone};
pub use scheduler::{sleep_for, CycleReport, MirrorResult, Scheduler};
pub use worker::SyncWorker;

/// Phase of the per-mirror state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Asking the remote for the branch head
    ProbingRemote,
    /// Reading the branch head from the local mirror
    ProbingLocal,
    /// Heads match, nothing to do
    UpToDate,
    /// Heads differ or one is unknown
    NeedsUpdate,
    /// Making sure a valid mirror exists on disk
    EnsureExists,
    /// Deleting and recloning an invalid mirror
    Reclone,
    /// Fetching the tracked branch
    Fetching,
    /// State written for this cycle
    Recorded,
}

impl SyncPhase {
    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            SyncPhase::ProbingRemote => "Probing remote head",
            SyncPhase::ProbingLocal => "Probing local head",
            SyncPhase::UpToDate => "Cache is up to date",
            SyncPhase::NeedsUpdate => "Update needed",
            SyncPhase::EnsureExists => "Ensuring mirror exists",
            SyncPhase::Reclone => "Mirror invalid, recloning",
            SyncPhase::Fetching => "Fetching updates",
            SyncPhase::Recorded => "Recorded",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// How a successful sync ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
    /// Remote and local heads matched
    UpToDate,
    /// Remote unknown, local mirror left alone by policy
    Deferred,
    /// Existing mirror fetched
    Fetched,
    /// Missing mirror cloned, then fetched
    Cloned,
    /// Invalid mirror deleted, cloned, then fetched
    Recloned,
}

impl SyncOutcome {
    /// Whether git was asked to change the mirror
    pub fn mutated(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Fetched | SyncOutcome::Cloned | SyncOutcome::Recloned
        )
    }

    /// Whether the mirror is known to hold the remote head afterwards
    pub fn is_in_sync(&self) -> bool {
        !matches!(self, SyncOutcome::Deferred)
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncOutcome::UpToDate => "up to date",
            SyncOutcome::Deferred => "deferred",
            SyncOutcome::Fetched => "fetched",
            SyncOutcome::Cloned => "cloned",
            SyncOutcome::Recloned => "recloned",
        };
        f.write_str(s)
    }
}

/// Knobs shared by every worker of a scheduler
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Upper bound for each external operation
    pub operation_timeout: Duration,
    /// Behaviour when the remote head is unknown
    pub on_remote_unavailable: RemoteUnavailablePolicy,
    /// When `latest_commit` is written
    pub record_commit: CommitRecording,
    /// Prune refs during fetch
    pub prune: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(300),
            on_remote_unavailable: RemoteUnavailablePolicy::default(),
            record_commit: CommitRecording::default(),
            prune: true,
        }
    }
}

impl SyncSettings {
    /// Take the worker settings from a loaded config
    pub fn from_config(config: &Config) -> Self {
        Self {
            operation_timeout: config.operation_timeout,
            on_remote_unavailable: config.on_remote_unavailable,
            record_commit: config.record_commit,
            prune: true,
        }
    }
}

/// Result of comparing remote and local heads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    UpToDate,
    Deferred,
    NeedsUpdate,
}

/// Decide whether a mirror needs work this cycle
pub fn decide(remote: Option<&str>, local: &LocalHead, policy: RemoteUnavailablePolicy) -> Decision {
    match (remote, local.commit()) {
        (Some(remote), Some(local)) if remote == local => Decision::UpToDate,
        (None, Some(_)) if policy == RemoteUnavailablePolicy::SkipIfPresent => Decision::Deferred,
        _ => Decision::NeedsUpdate,
    }
}

/// Run an external operation with an upper bound on its duration
pub(crate) async fn bounded<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, after }),
    }
}
