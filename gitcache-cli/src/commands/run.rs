//! Run command - reconcile mirrors until interrupted

use clap::Args;
use gitcache_core::{Config, Scheduler};

/// Arguments for the run command
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Stop after this many cycles instead of running forever
    #[arg(long)]
    pub cycles: Option<usize>,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        if config.enable_status_server {
            tracing::warn!(
                port = config.status_server_port,
                "Status server is not built into gitcache; use `gitcache once --json` for a snapshot"
            );
        }

        let scheduler = Scheduler::from_config(config);
        tracing::info!(
            mirrors = scheduler.mirrors().len(),
            interval_secs = scheduler.interval().as_secs(),
            "Starting reconciliation loop"
        );

        tokio::select! {
            cycles = scheduler.run_cycles(self.cycles) => {
                tracing::info!(cycles, "Reconciliation loop finished");
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("received ctrl-c, shutting down");
            }
        }

        Ok(())
    }
}
