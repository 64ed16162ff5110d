//! Cluster providers
//!
//! A provider translates lifecycle verbs into invocations of one backend tool
//! and parses the output back into [`ClusterInfo`]:
//! - **k3d**: k3s in docker, the reference backend
//! - **kind**: Kubernetes in docker, no start/stop support
//! - **Mock**: in-memory clusters for tests

mod k3d;
mod kind;
mod mock;
mod nodes;

pub use k3d::{K3dOptions, K3dProvider};
pub use kind::{KindOptions, KindProvider};
pub use mock::{MockClusterProvider, ProviderCalls};

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use kubeforge_core::{ClusterConfig, ClusterError, ClusterInfo, ClusterType, Result};

/// Outcome of pruning unused images from the nodes of a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Running node containers found for the cluster
    pub nodes_found: usize,
    /// Nodes where the prune succeeded
    pub nodes_cleaned: usize,
    /// Nodes where the prune failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Lifecycle capabilities of one cluster backend
///
/// Implementations must be Send + Sync; the manager shares them across
/// concurrent aggregate queries.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Tag this provider is registered under
    fn cluster_type(&self) -> ClusterType;

    /// Whether the backend tool is installed and answering
    async fn is_available(&self, ctx: &CancellationToken) -> bool;

    /// Create a cluster
    async fn create(&self, ctx: &CancellationToken, config: &ClusterConfig) -> Result<()>;

    /// Delete a cluster; `force` is passed through untouched
    async fn delete(&self, ctx: &CancellationToken, name: &str, force: bool) -> Result<()>;

    /// Start a stopped cluster
    ///
    /// Backends without a stop/start concept return
    /// [`ClusterError::Unsupported`].
    async fn start(&self, ctx: &CancellationToken, name: &str) -> Result<()>;

    /// List every cluster the backend knows, in the backend's order
    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<ClusterInfo>>;

    /// Status of one cluster
    ///
    /// Always derived from [`list`](Self::list), so the two views can never
    /// disagree.
    async fn status(&self, ctx: &CancellationToken, name: &str) -> Result<ClusterInfo> {
        let clusters = self
            .list(ctx)
            .await
            .map_err(|e| ClusterError::operation("status", name, e))?;

        clusters
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ClusterError::operation("status", name, ClusterError::not_found(name)))
    }

    /// Cheap existence probe used for type detection
    ///
    /// Returns this provider's type when it manages `name`, and
    /// [`ClusterError::ClusterNotFound`] when it does not.
    async fn detect_type(&self, ctx: &CancellationToken, name: &str) -> Result<ClusterType>;

    /// Raw kubeconfig text for a cluster
    async fn kubeconfig(&self, ctx: &CancellationToken, name: &str) -> Result<String>;

    /// Prune unused images on every running node of a cluster
    async fn cleanup(&self, ctx: &CancellationToken, name: &str) -> Result<CleanupReport>;
}
