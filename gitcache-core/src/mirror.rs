//! Mirror descriptors and their observed state

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::git::redact_url;
use crate::sync::{SyncOutcome, SyncPhase};

/// Format used for `last_updated` on the status view
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// One mirror as configured
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MirrorSpec {
    /// Location of the bare mirror; identifies the mirror
    pub cache_path: PathBuf,

    /// URL the mirror is cloned and fetched from
    pub remote_url: String,

    /// The single branch tracked by this mirror
    pub branch: String,

    /// Wipe and reclone on startup
    #[serde(default)]
    pub force_clone: bool,

    /// Optional human label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl MirrorSpec {
    /// Create a spec with defaults for the optional fields
    pub fn new(
        cache_path: impl Into<PathBuf>,
        remote_url: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            cache_path: cache_path.into(),
            remote_url: remote_url.into(),
            branch: branch.into(),
            force_clone: false,
            desc: None,
        }
    }

    /// Request a startup reclone
    pub fn with_force_clone(mut self, force_clone: bool) -> Self {
        self.force_clone = force_clone;
        self
    }

    /// Set the label
    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// Short label for log lines: `desc[branch]`, or `path[branch]` without a desc
    pub fn label(&self) -> String {
        match &self.desc {
            Some(desc) => format!("{}[{}]", desc, self.branch),
            None => format!("{}[{}]", self.cache_path.display(), self.branch),
        }
    }
}

/// State derived by the sync worker, one per mirror
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorState {
    /// Start of the cycle that last touched this mirror
    pub last_updated: Option<DateTime<Utc>>,

    /// Remote head recorded for the mirror (see `CommitRecording`)
    pub latest_commit: Option<String>,

    /// Outcome of the last successful cycle
    pub last_outcome: Option<SyncOutcome>,

    /// Error of the last cycle, cleared on success
    pub last_error: Option<String>,

    /// Failed cycles since the last success
    pub consecutive_failures: u32,

    /// Where the worker currently is, `Recorded` between cycles
    pub phase: Option<SyncPhase>,
}

/// A configured mirror together with its state and mutation lock
#[derive(Debug)]
pub struct Mirror {
    spec: MirrorSpec,
    state: RwLock<MirrorState>,
    /// Held for the duration of anything that may mutate `cache_path`
    lock: Mutex<()>,
}

impl Mirror {
    /// Wrap a spec with a fresh, empty state
    pub fn new(spec: MirrorSpec) -> Self {
        Self {
            spec,
            state: RwLock::new(MirrorState::default()),
            lock: Mutex::new(()),
        }
    }

    /// The configured spec
    pub fn spec(&self) -> &MirrorSpec {
        &self.spec
    }

    /// Shortcut for the mirror's path
    pub fn cache_path(&self) -> &Path {
        &self.spec.cache_path
    }

    /// Copy of the current state
    pub async fn state(&self) -> MirrorState {
        self.state.read().await.clone()
    }

    /// Acquire the per-mirror mutation lock
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Note the phase the worker entered
    pub(crate) async fn enter(&self, phase: SyncPhase) {
        tracing::trace!(cache_path = %self.spec.cache_path.display(), %phase, "phase");
        self.state.write().await.phase = Some(phase);
    }

    /// Mutate the state under the write lock
    pub(crate) async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut MirrorState),
    {
        let mut state = self.state.write().await;
        f(&mut state);
    }

    /// Record a failure that escaped the worker (e.g. a panic)
    pub(crate) async fn record_failure(&self, at: DateTime<Utc>, error: impl Into<String>) {
        self.update(|state| {
            state.last_updated = Some(at);
            state.last_error = Some(error.into());
            state.consecutive_failures += 1;
            state.phase = Some(SyncPhase::Recorded);
        })
        .await;
    }

    /// Snapshot row for the status view
    pub async fn status(&self) -> MirrorStatus {
        let state = self.state.read().await;
        MirrorStatus {
            cache_path: self.spec.cache_path.display().to_string(),
            remote_url: redact_url(&self.spec.remote_url),
            branch: self.spec.branch.clone(),
            desc: self.spec.desc.clone(),
            last_updated: state
                .last_updated
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
            latest_commit: state.latest_commit.clone().unwrap_or_default(),
            last_error: state.last_error.clone(),
        }
    }
}

/// Read-only row published to the status view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorStatus {
    pub cache_path: String,
    pub remote_url: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Human-readable, empty until the first cycle
    pub last_updated: String,
    /// Commit hash, empty when unknown
    pub latest_commit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
