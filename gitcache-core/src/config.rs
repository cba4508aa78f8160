//! Configuration management for gitcache
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (GITCACHE_*)
//! 3. Config file (first found of `--config`/`GITCACHE_CONFIG`,
//!    `/etc/gitcache/config.toml`, `./config.toml`,
//!    `~/.config/gitcache/config.toml`)
//! 4. Default values
//!
//! Unlike most settings files, a missing config is fatal: there is nothing to
//! mirror without one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mirror::MirrorSpec;
use crate::{Error, Result};

/// System-wide config location
pub const SYSTEM_CONFIG_PATH: &str = "/etc/gitcache/config.toml";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_PATH: &str = "config.toml";

/// What to do with a mirror when its remote head could not be probed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteUnavailablePolicy {
    /// Always attempt an update when the remote head is unknown
    #[default]
    Fetch,
    /// Leave a mirror alone when the remote is unknown but the local branch is readable
    SkipIfPresent,
}

/// When the published `latest_commit` of a mirror changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitRecording {
    /// Record the remote head observed during the cycle, whatever the fetch did
    #[default]
    Observed,
    /// Record the remote head only when the cycle left the mirror in sync
    OnSuccess,
}

fn default_status_server_port() -> u16 {
    8000
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_git_path() -> String {
    "git".to_string()
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Minimum seconds between the starts of two reconciliation cycles
    pub sync_interval: u64,

    /// Whether the external status page should be served
    #[serde(default)]
    pub enable_status_server: bool,

    /// Port of the external status page
    #[serde(default = "default_status_server_port")]
    pub status_server_port: u16,

    /// Status page template flavour
    #[serde(default)]
    pub use_bootstrap: bool,

    /// Upper bound for any single git operation
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Path to the git executable
    #[serde(default = "default_git_path")]
    pub git_path: String,

    /// Behaviour when the remote probe fails
    #[serde(default)]
    pub on_remote_unavailable: RemoteUnavailablePolicy,

    /// Semantics of the published `latest_commit`
    #[serde(default)]
    pub record_commit: CommitRecording,

    /// Mirrors to keep fresh, in display order
    #[serde(default)]
    pub repos: Vec<MirrorSpec>,
}

impl Config {
    /// Create a config with defaults for everything but the interval and mirrors
    pub fn new(sync_interval: u64, repos: Vec<MirrorSpec>) -> Self {
        Self {
            sync_interval,
            enable_status_server: false,
            status_server_port: default_status_server_port(),
            use_bootstrap: false,
            operation_timeout: default_operation_timeout(),
            git_path: default_git_path(),
            on_remote_unavailable: RemoteUnavailablePolicy::default(),
            record_commit: CommitRecording::default(),
            repos,
        }
    }

    /// Interval between cycle starts
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Candidate config locations, most specific first
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(SYSTEM_CONFIG_PATH),
            PathBuf::from(LOCAL_CONFIG_PATH),
        ];
        if let Some(user) = Self::user_config_path() {
            paths.push(user);
        }
        paths
    }

    /// Get the per-user config file path
    ///
    /// Returns `~/.config/gitcache/config.toml` on Unix
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gitcache").join("config.toml"))
    }

    /// Find the config file to use
    ///
    /// An explicit path must exist; otherwise the first existing candidate wins.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        Self::candidate_paths()
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| {
                Error::Config(format!(
                    "No config file found. Looked in {} and {}",
                    SYSTEM_CONFIG_PATH, LOCAL_CONFIG_PATH
                ))
            })
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - GITCACHE_SYNC_INTERVAL: seconds between cycle starts
    /// - GITCACHE_GIT_PATH: git executable
    /// - GITCACHE_OPERATION_TIMEOUT_SECS: per-operation timeout in seconds
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(interval) = lookup("GITCACHE_SYNC_INTERVAL") {
            self.sync_interval = parse_secs("GITCACHE_SYNC_INTERVAL", &interval)?;
        }

        if let Some(git_path) = lookup("GITCACHE_GIT_PATH") {
            self.git_path = git_path;
        }

        if let Some(timeout) = lookup("GITCACHE_OPERATION_TIMEOUT_SECS") {
            self.operation_timeout =
                Duration::from_secs(parse_secs("GITCACHE_OPERATION_TIMEOUT_SECS", &timeout)?);
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, sync_interval: Option<u64>, git_path: Option<String>) -> Self {
        if let Some(interval) = sync_interval {
            self.sync_interval = interval;
        }

        if let Some(path) = git_path {
            self.git_path = path;
        }

        self
    }

    /// Check the invariants the scheduler relies on
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval == 0 {
            return Err(Error::Config("sync_interval must be greater than zero".to_string()));
        }

        if self.operation_timeout.is_zero() {
            return Err(Error::Config(
                "operation_timeout must be greater than zero".to_string(),
            ));
        }

        if self.git_path.trim().is_empty() {
            return Err(Error::Config("git_path must not be empty".to_string()));
        }

        if self.repos.is_empty() {
            return Err(Error::Config("No repos configured".to_string()));
        }

        let mut seen = HashSet::new();
        for (index, repo) in self.repos.iter().enumerate() {
            if repo.cache_path.as_os_str().is_empty() {
                return Err(Error::Config(format!("repos[{}]: cache_path is empty", index)));
            }
            if repo.remote_url.trim().is_empty() {
                return Err(Error::Config(format!("repos[{}]: remote_url is empty", index)));
            }
            if repo.remote_url.starts_with('-') {
                return Err(Error::Config(format!(
                    "repos[{}]: remote_url must not start with '-'",
                    index
                )));
            }
            if repo.branch.trim().is_empty() {
                return Err(Error::Config(format!("repos[{}]: branch is empty", index)));
            }
            if !git2::Branch::name_is_valid(&repo.branch).unwrap_or(false) {
                return Err(Error::Config(format!(
                    "repos[{}]: '{}' is not a valid branch name",
                    index, repo.branch
                )));
            }
            if !seen.insert(repo.cache_path.as_path()) {
                return Err(Error::Config(format!(
                    "repos[{}]: cache_path {} is used by more than one repo",
                    index,
                    repo.cache_path.display()
                )));
            }
        }

        Ok(())
    }

    /// Load, override and validate configuration
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        explicit: Option<&Path>,
        sync_interval: Option<u64>,
        git_path: Option<String>,
    ) -> Result<(PathBuf, Self)> {
        let path = Self::locate(explicit)?;
        let config = Self::load_from_file(&path)?
            .with_env_overrides()?
            .with_cli_overrides(sync_interval, git_path);
        config.validate()?;
        Ok((path, config))
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a whole number of seconds, got '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
sync_interval = 30
enable_status_server = true

[[repos]]
cache_path = "/srv/cache/alpha.git"
remote_url = "https://example.com/alpha.git"
branch = "main"
desc = "Alpha"

[[repos]]
cache_path = "/srv/cache/beta.git"
remote_url = "https://example.com/beta.git"
branch = "develop"
force_clone = true
"#;

    #[test]
    fn test_parse_toml() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.sync_interval, 30);
        assert!(config.enable_status_server);
        assert_eq!(config.status_server_port, 8000);
        assert_eq!(config.operation_timeout, Duration::from_secs(300));
        assert_eq!(config.git_path, "git");
        assert_eq!(config.repos.len(), 2);
        assert_eq!(config.repos[0].desc.as_deref(), Some("Alpha"));
        assert!(!config.repos[0].force_clone);
        assert!(config.repos[1].force_clone);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_policies_and_timeout() {
        let toml = r#"
sync_interval = 10
operation_timeout = "90s"
on_remote_unavailable = "skip-if-present"
record_commit = "on-success"

[[repos]]
cache_path = "/tmp/a.git"
remote_url = "file:///tmp/a"
branch = "main"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.operation_timeout, Duration::from_secs(90));
        assert_eq!(
            config.on_remote_unavailable,
            RemoteUnavailablePolicy::SkipIfPresent
        );
        assert_eq!(config.record_commit, CommitRecording::OnSuccess);
    }

    #[test]
    fn test_missing_interval_is_rejected() {
        let toml = r#"
[[repos]]
cache_path = "/tmp/a.git"
remote_url = "file:///tmp/a"
branch = "main"
"#;
        assert!(matches!(Config::parse(toml), Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_cache_path_is_rejected() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.repos[1].cache_path = config.repos[0].cache_path.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than one repo"));
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.repos[0].branch = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::parse(SAMPLE).unwrap();
        config.sync_interval = 0;
        assert!(config.validate().is_err());

        let config = Config::new(10, Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unsafe_branch_and_url() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.repos[0].branch = "main:refs/heads/x".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::parse(SAMPLE).unwrap();
        config.repos[0].branch = "release/1.0".to_string();
        config.validate().unwrap();

        let mut config = Config::parse(SAMPLE).unwrap();
        config.repos[0].remote_url = "--upload-pack=touch /tmp/x".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must not start with '-'"));
    }

    #[test]
    fn test_candidate_paths_order() {
        let paths = Config::candidate_paths();
        assert_eq!(paths[0], PathBuf::from(SYSTEM_CONFIG_PATH));
        assert_eq!(paths[1], PathBuf::from(LOCAL_CONFIG_PATH));
        match Config::user_config_path() {
            Some(user) => assert_eq!(paths[2..], [user]),
            None => assert_eq!(paths.len(), 2),
        }
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::parse(SAMPLE)
            .unwrap()
            .with_overrides_from(|key| match key {
                "GITCACHE_SYNC_INTERVAL" => Some("120".to_string()),
                "GITCACHE_GIT_PATH" => Some("/opt/git/bin/git".to_string()),
                "GITCACHE_OPERATION_TIMEOUT_SECS" => Some("15".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.sync_interval, 120);
        assert_eq!(config.git_path, "/opt/git/bin/git");
        assert_eq!(config.operation_timeout, Duration::from_secs(15));

        let err = Config::parse(SAMPLE)
            .unwrap()
            .with_overrides_from(|key| (key == "GITCACHE_SYNC_INTERVAL").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::parse(SAMPLE)
            .unwrap()
            .with_cli_overrides(Some(5), Some("/usr/local/bin/git".to_string()));
        assert_eq!(config.sync_interval, 5);
        assert_eq!(config.git_path, "/usr/local/bin/git");
    }

    #[test]
    fn test_load_with_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gitcache.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let (found, config) = Config::load_with_overrides(Some(path.as_path()), Some(45), None).unwrap();
        assert_eq!(found, path);
        assert_eq!(config.sync_interval, 45);

        let missing = dir.path().join("absent.toml");
        assert!(Config::locate(Some(missing.as_path())).is_err());
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sync_interval = \"often\"").unwrap();
        assert!(matches!(Config::load_from_file(&path), Err(Error::Config(_))));
    }
}
