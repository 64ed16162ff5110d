//! Mock executor for testing
//!
//! Records every invocation and replays canned results, so providers can be
//! exercised without k3d, kind or docker installed.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

use super::{CommandExecutor, CommandResult, render_command};
use kubeforge_core::{ClusterError, Result};

/// In-memory command executor for testing
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<RwLock<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Log of executed command lines
    commands: Vec<String>,
    /// Responses keyed by substring, checked in registration order
    responses: Vec<(String, Scripted)>,
    /// Result for commands matching no pattern
    default_result: Option<CommandResult>,
    /// When set, every command fails with this stderr
    fail_all: Option<String>,
}

enum Scripted {
    /// Played in order; the last one repeats forever
    Results(VecDeque<CommandResult>),
    /// Behave as if the program is not installed
    MissingBinary,
}

impl MockExecutor {
    /// Create a mock where every command succeeds with empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to commands containing `pattern` with `result`
    pub fn respond(&self, pattern: impl Into<String>, result: CommandResult) -> &Self {
        self.respond_sequence(pattern, vec![result])
    }

    /// Respond to successive matching commands with successive results
    pub fn respond_sequence(
        &self,
        pattern: impl Into<String>,
        results: Vec<CommandResult>,
    ) -> &Self {
        let mut state = self.state.write().unwrap();
        state
            .responses
            .push((pattern.into(), Scripted::Results(results.into())));
        self
    }

    /// Shorthand for a successful response with the given stdout
    pub fn respond_ok(&self, pattern: impl Into<String>, stdout: impl Into<String>) -> &Self {
        self.respond(pattern, CommandResult::ok(stdout))
    }

    /// Shorthand for a failing response with exit code 1
    pub fn respond_err(&self, pattern: impl Into<String>, stderr: impl Into<String>) -> &Self {
        self.respond(pattern, CommandResult::failed(1, stderr))
    }

    /// Make commands containing `pattern` fail to spawn
    pub fn missing_binary(&self, pattern: impl Into<String>) -> &Self {
        let mut state = self.state.write().unwrap();
        state.responses.push((pattern.into(), Scripted::MissingBinary));
        self
    }

    /// Set the result for commands matching no pattern
    pub fn set_default_result(&self, result: CommandResult) {
        self.state.write().unwrap().default_result = Some(result);
    }

    /// Make every command fail with `message` on stderr
    pub fn set_should_fail(&self, message: impl Into<String>) {
        self.state.write().unwrap().fail_all = Some(message.into());
    }

    /// Command lines executed so far, oldest first
    pub fn executed_commands(&self) -> Vec<String> {
        self.state.read().unwrap().commands.clone()
    }

    pub fn command_count(&self) -> usize {
        self.state.read().unwrap().commands.len()
    }

    /// Whether any executed command contains `pattern`
    pub fn was_executed(&self, pattern: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .commands
            .iter()
            .any(|c| c.contains(pattern))
    }

    /// Number of executed commands containing `pattern`
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.state
            .read()
            .unwrap()
            .commands
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    pub fn last_command(&self) -> Option<String> {
        self.state.read().unwrap().commands.last().cloned()
    }

    /// Clear recorded commands and scripted responses
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap();
        *state = MockState::default();
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(
        &self,
        ctx: &CancellationToken,
        program: &str,
        args: &[String],
    ) -> Result<CommandResult> {
        if ctx.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }

        let line = render_command(program, args);
        let mut state = self.state.write().unwrap();
        state.commands.push(line.clone());

        if let Some(message) = &state.fail_all {
            return Err(ClusterError::CommandFailed {
                command: line,
                code: Some(1),
                stderr: message.clone(),
            });
        }

        let scripted = state
            .responses
            .iter_mut()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, scripted)| scripted);

        let result = match scripted {
            Some(Scripted::MissingBinary) => {
                return Err(ClusterError::Spawn {
                    program: program.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{} not found in PATH", program),
                    ),
                });
            }
            Some(Scripted::Results(queue)) => {
                if queue.len() > 1 {
                    queue.pop_front().unwrap_or_default()
                } else {
                    queue.front().cloned().unwrap_or_default()
                }
            }
            None => state
                .default_result
                .clone()
                .unwrap_or_else(|| CommandResult::ok("")),
        };

        if !result.success() {
            return Err(ClusterError::CommandFailed {
                command: line,
                code: result.exit_code,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::args;

    #[tokio::test]
    async fn test_records_commands() {
        let mock = MockExecutor::new();
        let ctx = CancellationToken::new();

        mock.execute(&ctx, "k3d", &args(["cluster", "list"])).await.unwrap();
        mock.execute(&ctx, "kind", &args(["get", "clusters"])).await.unwrap();

        assert_eq!(mock.command_count(), 2);
        assert!(mock.was_executed("k3d cluster list"));
        assert_eq!(mock.last_command().as_deref(), Some("kind get clusters"));
    }

    #[tokio::test]
    async fn test_pattern_response_and_failure() {
        let mock = MockExecutor::new();
        mock.respond_ok("cluster list", "[]")
            .respond_err("cluster get", "no such cluster");
        let ctx = CancellationToken::new();

        let listed = mock.execute(&ctx, "k3d", &args(["cluster", "list"])).await.unwrap();
        assert_eq!(listed.stdout, "[]");

        let err = mock
            .execute(&ctx, "k3d", &args(["cluster", "get", "dev"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such cluster"));
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let mock = MockExecutor::new();
        mock.respond_sequence(
            "version",
            vec![CommandResult::failed(1, "first"), CommandResult::ok("v5")],
        );
        let ctx = CancellationToken::new();

        assert!(mock.execute(&ctx, "k3d", &args(["version"])).await.is_err());
        for _ in 0..3 {
            let result = mock.execute(&ctx, "k3d", &args(["version"])).await.unwrap();
            assert_eq!(result.stdout, "v5");
        }
    }

    #[tokio::test]
    async fn test_missing_binary_and_global_failure() {
        let mock = MockExecutor::new();
        mock.missing_binary("kind");
        let ctx = CancellationToken::new();

        let err = mock.execute(&ctx, "kind", &args(["version"])).await.unwrap_err();
        assert!(matches!(err, ClusterError::Spawn { .. }));

        mock.set_should_fail("docker daemon not running");
        let err = mock.execute(&ctx, "k3d", &args(["version"])).await.unwrap_err();
        assert!(err.to_string().contains("docker daemon not running"));

        mock.reset();
        assert_eq!(mock.command_count(), 0);
        assert!(mock.execute(&ctx, "kind", &args(["version"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_context_is_not_recorded() {
        let mock = MockExecutor::new();
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = mock.execute(&ctx, "k3d", &args(["version"])).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(mock.command_count(), 0);
    }
}
