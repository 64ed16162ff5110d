//! Executor backed by real processes

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{CommandExecutor, CommandResult, render_command};
use kubeforge_core::{ClusterError, Result};

/// Runs commands with `tokio::process`
///
/// Children are spawned with `kill_on_drop`, so losing the race against
/// cancellation kills the process instead of leaving it running.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    dry_run: bool,
    verbose: bool,
}

impl SystemExecutor {
    pub fn new(dry_run: bool, verbose: bool) -> Self {
        Self { dry_run, verbose }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn execute(
        &self,
        ctx: &CancellationToken,
        program: &str,
        args: &[String],
    ) -> Result<CommandResult> {
        let line = render_command(program, args);

        if self.dry_run {
            info!("would run: {}", line);
            return Ok(CommandResult::ok(""));
        }

        if ctx.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }

        if self.verbose {
            debug!(command = %line, "running");
        }

        let start = Instant::now();
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClusterError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = ctx.cancelled() => {
                debug!(command = %line, "cancelled, killing process");
                return Err(ClusterError::Cancelled);
            }
        };

        let result = CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            duration: start.elapsed(),
        };

        debug!(
            command = %line,
            exit_code = ?result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            "command finished"
        );

        if !output.status.success() {
            // Some tools report failures on stdout only
            let stderr = if result.stderr.trim().is_empty() {
                result.stdout.clone()
            } else {
                result.stderr.clone()
            };
            return Err(ClusterError::CommandFailed {
                command: line,
                code: result.exit_code,
                stderr,
            });
        }

        Ok(result)
    }
}
