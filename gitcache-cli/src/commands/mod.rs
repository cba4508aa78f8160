//! CLI command implementations

pub mod once;
pub mod run;

pub use once::OnceArgs;
pub use run::RunArgs;
