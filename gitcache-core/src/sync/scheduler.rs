//! Fixed-interval reconciliation loop

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::Config;
use crate::git::{Git2Inspector, GitBackend, LocalInspector, SystemGit};
use crate::mirror::{Mirror, MirrorStatus};

use super::{SyncOutcome, SyncSettings, SyncWorker};

/// How long to sleep after a cycle so cycle starts are `interval` apart
///
/// Zero when the cycle overran; cycles are never skipped.
pub fn sleep_for(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Result of one mirror within a cycle
#[derive(Debug, Clone)]
pub struct MirrorResult {
    pub cache_path: PathBuf,
    pub result: std::result::Result<SyncOutcome, String>,
}

/// Summary of one pass over all mirrors
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Wall-clock start, also the `last_updated` of every mirror touched
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// One entry per mirror, in config order
    pub results: Vec<MirrorResult>,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Mirrors that were cloned or fetched
    pub fn mutated(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(&r.result, Ok(outcome) if outcome.mutated()))
            .count()
    }
}

/// Owns every mirror and drives the reconciliation cycles
#[derive(Debug)]
pub struct Scheduler {
    mirrors: Vec<Arc<Mirror>>,
    worker: Arc<SyncWorker>,
    interval: Duration,
}

impl Scheduler {
    /// Create a scheduler over custom git collaborators
    pub fn new(
        config: &Config,
        git: Arc<dyn GitBackend>,
        inspector: Arc<dyn LocalInspector>,
    ) -> Self {
        let mirrors = config
            .repos
            .iter()
            .cloned()
            .map(|spec| Arc::new(Mirror::new(spec)))
            .collect();

        Self {
            mirrors,
            worker: Arc::new(SyncWorker::new(git, inspector, SyncSettings::from_config(config))),
            interval: config.sync_interval(),
        }
    }

    /// Create a scheduler using the system git and git2
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config,
            Arc::new(SystemGit::new().with_path(&config.git_path)),
            Arc::new(Git2Inspector::new()),
        )
    }

    /// Mirrors in config order
    pub fn mirrors(&self) -> &[Arc<Mirror>] {
        &self.mirrors
    }

    /// Target time between cycle starts
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Status rows for every mirror, in config order
    pub async fn snapshot(&self) -> Vec<MirrorStatus> {
        let mut rows = Vec::with_capacity(self.mirrors.len());
        for mirror in &self.mirrors {
            rows.push(mirror.status().await);
        }
        rows
    }

    /// Reclone every mirror flagged `force_clone`
    ///
    /// Returns how many reclones succeeded. Failures are recorded on the mirror
    /// and retried as plain clones by the next cycle.
    pub async fn force_clone_pass(&self) -> usize {
        let flagged: Vec<_> = self
            .mirrors
            .iter()
            .filter(|m| m.spec().force_clone)
            .cloned()
            .collect();

        if flagged.is_empty() {
            return 0;
        }

        tracing::info!(count = flagged.len(), "Force cloning flagged mirrors");
        let handles: Vec<_> = flagged
            .iter()
            .map(|mirror| {
                let mirror = Arc::clone(mirror);
                let worker = Arc::clone(&self.worker);
                tokio::spawn(async move { worker.force_reclone(&mirror).await })
            })
            .collect();

        let mut recloned = 0;
        for (mirror, handle) in flagged.iter().zip(handles) {
            let error = match handle.await {
                Ok(Ok(())) => {
                    recloned += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(join_err) => format!("Reclone task failed: {}", join_err),
            };
            tracing::error!(
                cache_path = %mirror.cache_path().display(),
                error = %error,
                "Force clone failed"
            );
            mirror.record_failure(Utc::now(), error).await;
        }
        recloned
    }

    /// Run one reconciliation cycle over all mirrors
    ///
    /// Every worker runs as its own task; the cycle ends only after all of
    /// them finished, failed or panicked.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        let started = Instant::now();
        tracing::info!(mirrors = self.mirrors.len(), "Processing...");

        let handles: Vec<_> = self
            .mirrors
            .iter()
            .map(|mirror| {
                let mirror = Arc::clone(mirror);
                let worker = Arc::clone(&self.worker);
                tokio::spawn(async move { worker.sync(&mirror, started_at).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (mirror, handle) in self.mirrors.iter().zip(handles) {
            let result = match handle.await {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(e)) => Err(e.to_string()),
                Err(join_err) => {
                    let message = format!("Sync worker failed: {}", join_err);
                    tracing::error!(
                        cache_path = %mirror.cache_path().display(),
                        error = %message,
                        "Contained worker failure"
                    );
                    mirror.record_failure(started_at, message.clone()).await;
                    Err(message)
                }
            };
            results.push(MirrorResult {
                cache_path: mirror.cache_path().to_path_buf(),
                result,
            });
        }

        let report = CycleReport {
            started_at,
            elapsed: started.elapsed(),
            results,
        };
        tracing::info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            succeeded = report.succeeded(),
            failed = report.failed(),
            mutated = report.mutated(),
            "Cycle complete"
        );
        report
    }

    /// Run the startup pass, then up to `limit` cycles (forever with `None`)
    ///
    /// Returns the number of cycles run.
    pub async fn run_cycles(&self, limit: Option<usize>) -> usize {
        self.force_clone_pass().await;

        let mut completed = 0;
        loop {
            if limit.is_some_and(|limit| completed >= limit) {
                return completed;
            }

            let report = self.run_cycle().await;
            completed += 1;

            if limit.is_some_and(|limit| completed >= limit) {
                return completed;
            }

            let sleep = sleep_for(self.interval, report.elapsed);
            if sleep.is_zero() {
                tracing::warn!(
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    interval_secs = self.interval.as_secs(),
                    "Cycle overran the sync interval, starting next cycle immediately"
                );
            } else {
                tracing::info!(
                    "Sleeping for {:.2} seconds before restarting...",
                    sleep.as_secs_f64()
                );
                tokio::time::sleep(sleep).await;
            }
        }
    }

    /// Reconcile forever
    pub async fn run(&self) {
        self.run_cycles(None).await;
    }
}
