//! Git collaborators for the reconciliation engine
//!
//! Remote operations shell out to the `git` binary; local inspection reads the
//! mirror directly with git2.

mod cli;
mod local;
mod redact;

pub use cli::{parse_ls_remote, GitBackend, SystemGit};
pub use local::{inspect, Git2Inspector, LocalHead, LocalInspector};
pub use redact::redact_url;
