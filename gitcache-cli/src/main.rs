//! Gitcache CLI - keeps local bare git mirrors fresh
//!
//! Loads the mirror configuration and drives the reconciliation scheduler.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gitcache_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{OnceArgs, RunArgs};

/// gitcache: keep local bare mirrors of remote repositories fresh
#[derive(Parser, Debug)]
#[command(name = "gitcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to /etc/gitcache/config.toml, then ./config.toml)
    #[arg(short, long, global = true, env = "GITCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between cycle starts (overrides config and env)
    #[arg(long, global = true)]
    sync_interval: Option<u64>,

    /// Path to git executable (overrides config and env)
    #[arg(long, global = true)]
    git_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Reconcile mirrors on the configured interval (default)
    Run(RunArgs),

    /// Run a single reconciliation cycle and print mirror status
    Once(OnceArgs),

    /// Show the resolved configuration
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Some(Commands::Version) => {
            println!("gitcache {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run(ref args)) => args.execute(&load_config(&cli)?.1).await?,
        None => RunArgs::default().execute(&load_config(&cli)?.1).await?,
        Some(Commands::Once(ref args)) => args.execute(&load_config(&cli)?.1).await?,
        Some(Commands::Config) => {
            let (path, config) = load_config(&cli)?;
            print_config(&path, &config);
        }
    }

    Ok(())
}

/// Resolve, override and validate the configuration from the global flags
fn load_config(cli: &Cli) -> anyhow::Result<(PathBuf, Config)> {
    let (path, config) = Config::load_with_overrides(
        cli.config.as_deref(),
        cli.sync_interval,
        cli.git_path.clone(),
    )?;

    tracing::info!(
        path = %path.display(),
        repos = config.repos.len(),
        sync_interval = config.sync_interval,
        "Configuration loaded"
    );

    Ok((path, config))
}

fn print_config(path: &std::path::Path, config: &Config) {
    println!("gitcache Configuration");
    println!("======================");
    println!();
    println!("Config file: {}", path.display());
    println!();
    println!("Sync Settings:");
    println!("  sync_interval: {}s", config.sync_interval);
    println!("  operation_timeout: {:?}", config.operation_timeout);
    println!("  git_path: {}", config.git_path);
    println!("  on_remote_unavailable: {:?}", config.on_remote_unavailable);
    println!("  record_commit: {:?}", config.record_commit);
    println!(
        "  status_server: {}",
        if config.enable_status_server {
            format!("enabled (port {})", config.status_server_port)
        } else {
            "disabled".to_string()
        }
    );
    println!();
    println!("Repos:");
    for repo in &config.repos {
        println!("  {}", repo.cache_path.display());
        println!("    remote_url: {}", gitcache_core::redact_url(&repo.remote_url));
        println!("    branch: {}", repo.branch);
        if repo.force_clone {
            println!("    force_clone: true");
        }
        if let Some(desc) = &repo.desc {
            println!("    desc: {}", desc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["gitcache"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_global_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gitcache",
            "once",
            "--json",
            "--sync-interval",
            "30",
            "--git-path",
            "/usr/local/bin/git",
        ])
        .unwrap();
        assert_eq!(cli.sync_interval, Some(30));
        assert_eq!(cli.git_path.as_deref(), Some("/usr/local/bin/git"));
        match cli.command {
            Some(Commands::Once(args)) => {
                assert!(args.json);
                assert!(!args.skip_startup);
            }
            other => panic!("expected once, got {:?}", other),
        }
    }
}
