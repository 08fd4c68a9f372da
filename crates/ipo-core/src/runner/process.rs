//! `ProbeRunner` backed by real OS processes

use super::{CommandOutput, ProbeRunner};
use crate::error::ProbeError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Runs tools as child processes with captured stdout/stderr.
///
/// Children are spawned with `kill_on_drop`, so a timed-out or cancelled
/// invocation never leaves the tool running.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProbeRunner for ProcessRunner {
    async fn run(&self, argv: &[String], limit: Duration) -> Result<CommandOutput, ProbeError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ProbeError::Unavailable("empty command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProbeError::Unavailable(format!("{} not found in PATH", program)),
            ErrorKind::PermissionDenied => {
                ProbeError::Unavailable(format!("permission denied running {}", program))
            }
            _ => ProbeError::Unavailable(format!("failed to start {}: {}", program, e)),
        })?;

        let start = Instant::now();
        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| ProbeError::Unavailable(format!("failed to wait for {}: {}", program, e)))?,
            Err(_) => {
                debug!(program = %program, timeout_ms = limit.as_millis() as u64, "Tool timed out");
                return Err(ProbeError::Timeout(limit));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            program = %program,
            exit_code,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool finished"
        );

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
