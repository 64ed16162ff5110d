//! Retry decorator for command executors

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{CommandExecutor, CommandResult};
use crate::retry::{RetryExecutor, RetryPolicy};
use kubeforge_core::Result;

/// Re-runs failed commands under a retry policy
///
/// Applies at the provider's command-invocation boundary, so a transient
/// failure of a single `k3d` or `docker` call is absorbed without the
/// manager knowing about it.
#[derive(Debug, Clone)]
pub struct RetryingExecutor<X> {
    inner: X,
    retry: RetryExecutor,
}

impl<X: CommandExecutor> RetryingExecutor<X> {
    pub fn new(inner: X, policy: impl RetryPolicy + 'static) -> Self {
        Self::with_policy(inner, Arc::new(policy))
    }

    pub fn with_policy(inner: X, policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            inner,
            retry: RetryExecutor::from_arc(policy),
        }
    }

    pub fn inner(&self) -> &X {
        &self.inner
    }
}

#[async_trait]
impl<X: CommandExecutor> CommandExecutor for RetryingExecutor<X> {
    async fn execute(
        &self,
        ctx: &CancellationToken,
        program: &str,
        args: &[String],
    ) -> Result<CommandResult> {
        self.retry
            .execute(ctx, || self.inner.execute(ctx, program, args))
            .await
    }
}
