//! Gitcache Core - reconciliation engine for local bare git mirrors
//!
//! This crate keeps a set of bare mirrors fresh on a fixed cadence. Each
//! cycle compares the remote and local head of the tracked branch for every
//! mirror and only fetches when they diverge, recloning mirrors whose
//! directory is no longer a valid repository.

pub mod config;
pub mod error;
pub mod git;
pub mod mirror;
pub mod sync;

#[cfg(test)]
mod testing;

pub use config::{CommitRecording, Config, RemoteUnavailablePolicy};
pub use error::{Error, Result};
pub use git::{redact_url, Git2Inspector, GitBackend, LocalHead, LocalInspector, SystemGit};
pub use mirror::{Mirror, MirrorSpec, MirrorState, MirrorStatus};
pub use sync::{CycleReport, Scheduler, SyncOutcome, SyncPhase, SyncSettings, SyncWorker};
