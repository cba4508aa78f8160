//! Once command - a single reconciliation cycle

use clap::Args;
use gitcache_core::{Config, MirrorStatus, Scheduler};

/// Width of the abbreviated commit column
const SHORT_COMMIT: usize = 12;

/// Arguments for the once command
#[derive(Args, Debug)]
pub struct OnceArgs {
    /// Print the status snapshot as JSON
    #[arg(long)]
    pub json: bool,

    /// Skip the startup force-clone pass
    #[arg(long)]
    pub skip_startup: bool,
}

impl OnceArgs {
    /// Execute the once command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let scheduler = Scheduler::from_config(config);

        if !self.skip_startup {
            scheduler.force_clone_pass().await;
        }
        let report = scheduler.run_cycle().await;
        let rows = scheduler.snapshot().await;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        print_table(&rows);
        println!();
        println!(
            "{} mirror(s): {} ok, {} failed, {} updated in {:.2}s",
            report.results.len(),
            report.succeeded(),
            report.failed(),
            report.mutated(),
            report.elapsed.as_secs_f64()
        );

        Ok(())
    }
}

fn print_table(rows: &[MirrorStatus]) {
    let path_width = rows
        .iter()
        .map(|r| r.cache_path.len())
        .max()
        .unwrap_or(0)
        .max("CACHE PATH".len());
    let branch_width = rows
        .iter()
        .map(|r| r.branch.len())
        .max()
        .unwrap_or(0)
        .max("BRANCH".len());

    println!(
        "{:<path_width$}  {:<branch_width$}  {:<23}  {:<SHORT_COMMIT$}  ERROR",
        "CACHE PATH", "BRANCH", "LAST UPDATED", "COMMIT"
    );
    for row in rows {
        let commit: String = row.latest_commit.chars().take(SHORT_COMMIT).collect();
        println!(
            "{:<path_width$}  {:<branch_width$}  {:<23}  {:<SHORT_COMMIT$}  {}",
            row.cache_path,
            row.branch,
            row.last_updated,
            commit,
            row.last_error.as_deref().unwrap_or("")
        );
    }
}
