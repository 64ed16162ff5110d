//! External command execution
//!
//! Every provider talks to its backend through a [`CommandExecutor`]:
//! - **System**: spawns real processes, with a dry-run mode that only logs
//! - **Mock**: records invocations and replays canned output, for tests
//! - **Retrying**: wraps another executor in a retry policy

mod mock;
mod retrying;
mod system;

pub use mock::MockExecutor;
pub use retrying::RetryingExecutor;
pub use system::SystemExecutor;

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use kubeforge_core::Result;

/// Captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl CommandResult {
    /// A successful result with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Default::default()
        }
    }

    /// A failed result with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr on its own line, when there is any
    pub fn output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs external programs on behalf of a provider
///
/// A non-zero exit status is the only failure signal and surfaces as
/// `ClusterError::CommandFailed`, with stderr preserved verbatim.
/// Implementations must abandon the process when `ctx` is cancelled.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        ctx: &CancellationToken,
        program: &str,
        args: &[String],
    ) -> Result<CommandResult>;
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<T> {
    async fn execute(
        &self,
        ctx: &CancellationToken,
        program: &str,
        args: &[String],
    ) -> Result<CommandResult> {
        (**self).execute(ctx, program, args).await
    }
}

/// Render an invocation as a single line for logs and errors
pub fn render_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Build an owned argument list from string literals
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
