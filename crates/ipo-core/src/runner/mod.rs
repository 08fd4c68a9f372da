//! External process execution for measurement tools
//!
//! Probes never spawn processes themselves. They hand an argument vector to
//! a `ProbeRunner`, which keeps tool invocation swappable (real processes
//! in the CLI, scripted outputs in tests). Commands are always argument
//! vectors; no shell is ever involved.

mod process;

pub use process::ProcessRunner;

use crate::error::ProbeError;
use async_trait::async_trait;
use std::time::Duration;

/// Captured result of one external tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for running measurement tools
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    /// Run `argv[0]` with the remaining arguments, waiting at most `timeout`.
    ///
    /// Fails with `ProbeError::Unavailable` if the program cannot be started
    /// and `ProbeError::Timeout` if it outlives `timeout`. A non-zero exit is
    /// not an error here; probes interpret exit codes themselves. Dropping
    /// the returned future terminates the process.
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput, ProbeError>;
}

/// Build an argument vector from string-like parts
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
