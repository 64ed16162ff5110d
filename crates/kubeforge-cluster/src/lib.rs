//! Kubeforge Cluster - local cluster lifecycle orchestration
//!
//! This crate turns lifecycle verbs into backend tool invocations:
//! - **Executor**: runs `k3d`, `kind` and `docker`, or only logs them in dry-run mode
//! - **Providers**: one per backend, parsing tool output into `ClusterInfo`
//! - **Manager**: the provider registry, with idempotent create, aggregate
//!   listing and cluster type detection
//! - **Retry**: opt-in bounded retries for transient failures
//!
//! Every entry point takes a `CancellationToken`; cancelling it kills the
//! running tool and interrupts any pending retry sleep.

pub mod executor;
pub mod manager;
pub mod provider;
pub mod retry;

pub use executor::{CommandExecutor, CommandResult, MockExecutor, RetryingExecutor, SystemExecutor};
pub use manager::{ClusterManager, CreateOutcome};
pub use provider::{
    CleanupReport, ClusterProvider, K3dOptions, K3dProvider, KindOptions, KindProvider,
    MockClusterProvider, ProviderCalls,
};
pub use retry::{
    Cancelled, ExponentialBackoffPolicy, LinearBackoffPolicy, Recoverable, RetryExecutor,
    RetryPolicy, RetryPreset, TransientError, installation_policy, network_policy, resource_policy,
};

pub use tokio_util::sync::CancellationToken;
