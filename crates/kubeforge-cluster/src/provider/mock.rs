//! Mock cluster provider for testing
//!
//! Keeps clusters in memory so manager behavior can be tested without any
//! backend tool.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

use super::{CleanupReport, ClusterProvider};
use kubeforge_core::{ClusterConfig, ClusterError, ClusterInfo, ClusterType, NodeInfo, NodeRole, Result};

/// In-memory cluster provider for testing
#[derive(Clone)]
pub struct MockClusterProvider {
    cluster_type: ClusterType,
    clusters: Arc<RwLock<Vec<ClusterInfo>>>,
    behavior: Arc<RwLock<Behavior>>,
    calls: Arc<RwLock<ProviderCalls>>,
}

#[derive(Debug, Clone)]
struct Behavior {
    available: bool,
    list_error: Option<String>,
    supports_start: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            available: true,
            list_error: None,
            supports_start: true,
        }
    }
}

/// Counts of provider calls for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProviderCalls {
    pub availability_checks: usize,
    pub creates: usize,
    pub deletes: usize,
    pub starts: usize,
    pub lists: usize,
    pub detects: usize,
    pub kubeconfigs: usize,
    pub cleanups: usize,
}

impl ProviderCalls {
    /// Calls that would have invoked the backend tool
    pub fn total(&self) -> usize {
        self.availability_checks
            + self.creates
            + self.deletes
            + self.starts
            + self.lists
            + self.detects
            + self.kubeconfigs
            + self.cleanups
    }
}

impl MockClusterProvider {
    /// Create an empty, available provider
    pub fn new(cluster_type: ClusterType) -> Self {
        Self {
            cluster_type,
            clusters: Arc::new(RwLock::new(Vec::new())),
            behavior: Arc::new(RwLock::new(Behavior::default())),
            calls: Arc::new(RwLock::new(ProviderCalls::default())),
        }
    }

    /// Create with pre-populated clusters named `names`
    pub fn with_clusters(cluster_type: ClusterType, names: &[&str]) -> Self {
        let provider = Self::new(cluster_type);
        for name in names {
            provider.insert(name, 1);
        }
        provider
    }

    /// Add a cluster with `nodes` nodes, one of them control plane
    pub fn insert(&self, name: &str, nodes: u32) {
        let info = self.make_info(name, nodes);
        self.clusters.write().unwrap().push(info);
    }

    pub fn set_available(&self, available: bool) {
        self.behavior.write().unwrap().available = available;
    }

    /// Make `list` fail with `message` (`None` restores it)
    pub fn set_list_error(&self, message: Option<&str>) {
        self.behavior.write().unwrap().list_error = message.map(String::from);
    }

    pub fn set_supports_start(&self, supports: bool) {
        self.behavior.write().unwrap().supports_start = supports;
    }

    pub fn calls(&self) -> ProviderCalls {
        self.calls.read().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        *self.calls.write().unwrap() = ProviderCalls::default();
    }

    pub fn cluster_names(&self) -> Vec<String> {
        self.clusters
            .read()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clusters.read().unwrap().iter().any(|c| c.name == name)
    }

    fn make_info(&self, name: &str, node_count: u32) -> ClusterInfo {
        let nodes = (0..node_count)
            .map(|i| NodeInfo {
                name: format!("{}-node-{}", name, i),
                role: if i == 0 { NodeRole::ControlPlane } else { NodeRole::Worker },
                status: "running".to_string(),
                age: None,
            })
            .collect();

        ClusterInfo {
            name: name.to_string(),
            cluster_type: self.cluster_type.clone(),
            status: ClusterInfo::status_string(1, 1),
            node_count,
            image: None,
            nodes,
            created_at: Utc::now(),
        }
    }

    fn record(&self, f: impl FnOnce(&mut ProviderCalls)) {
        f(&mut *self.calls.write().unwrap());
    }

    fn check_cancelled(ctx: &CancellationToken) -> Result<()> {
        if ctx.is_cancelled() {
            Err(ClusterError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClusterProvider for MockClusterProvider {
    fn cluster_type(&self) -> ClusterType {
        self.cluster_type.clone()
    }

    async fn is_available(&self, _ctx: &CancellationToken) -> bool {
        self.record(|c| c.availability_checks += 1);
        self.behavior.read().unwrap().available
    }

    async fn create(&self, ctx: &CancellationToken, config: &ClusterConfig) -> Result<()> {
        Self::check_cancelled(ctx)?;
        self.record(|c| c.creates += 1);

        if self.contains(&config.name) {
            return Err(ClusterError::ClusterAlreadyExists {
                name: config.name.clone(),
            });
        }
        self.insert(&config.name, config.node_count);
        Ok(())
    }

    async fn delete(&self, ctx: &CancellationToken, name: &str, _force: bool) -> Result<()> {
        Self::check_cancelled(ctx)?;
        self.record(|c| c.deletes += 1);

        let mut clusters = self.clusters.write().unwrap();
        let before = clusters.len();
        clusters.retain(|c| c.name != name);
        if clusters.len() == before {
            return Err(ClusterError::operation("delete", name, ClusterError::not_found(name)));
        }
        Ok(())
    }

    async fn start(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        Self::check_cancelled(ctx)?;
        self.record(|c| c.starts += 1);

        if !self.behavior.read().unwrap().supports_start {
            return Err(ClusterError::operation(
                "start",
                name,
                ClusterError::Unsupported {
                    cluster_type: self.cluster_type.clone(),
                    verb: "start".to_string(),
                },
            ));
        }
        if !self.contains(name) {
            return Err(ClusterError::operation("start", name, ClusterError::not_found(name)));
        }
        Ok(())
    }

    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<ClusterInfo>> {
        Self::check_cancelled(ctx)?;
        self.record(|c| c.lists += 1);

        if let Some(message) = self.behavior.read().unwrap().list_error.clone() {
            return Err(ClusterError::CommandFailed {
                command: format!("{} list", self.cluster_type),
                code: Some(1),
                stderr: message,
            });
        }
        Ok(self.clusters.read().unwrap().clone())
    }

    async fn detect_type(&self, ctx: &CancellationToken, name: &str) -> Result<ClusterType> {
        Self::check_cancelled(ctx)?;
        self.record(|c| c.detects += 1);

        if self.contains(name) {
            Ok(self.cluster_type.clone())
        } else {
            Err(ClusterError::not_found(name))
        }
    }

    async fn kubeconfig(&self, ctx: &CancellationToken, name: &str) -> Result<String> {
        Self::check_cancelled(ctx)?;
        self.record(|c| c.kubeconfigs += 1);

        if !self.contains(name) {
            return Err(ClusterError::operation("kubeconfig", name, ClusterError::not_found(name)));
        }
        Ok(format!(
            "apiVersion: v1\nkind: Config\ncurrent-context: {}-{}\n",
            self.cluster_type, name
        ))
    }

    async fn cleanup(&self, ctx: &CancellationToken, name: &str) -> Result<CleanupReport> {
        Self::check_cancelled(ctx)?;
        self.record(|c| c.cleanups += 1);

        let clusters = self.clusters.read().unwrap();
        let nodes = clusters
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.nodes.len())
            .unwrap_or(0);
        Ok(CleanupReport {
            nodes_found: nodes,
            nodes_cleaned: nodes,
            failed: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_list() {
        let provider = MockClusterProvider::new(ClusterType::K3D);
        let ctx = CancellationToken::new();

        provider
            .create(&ctx, &ClusterConfig::new("dev", ClusterType::K3D))
            .await
            .unwrap();

        let clusters = provider.list(&ctx).await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].node_count, 3);
        assert_eq!(clusters[0].nodes[0].role, NodeRole::ControlPlane);
        assert_eq!(provider.calls().creates, 1);
    }

    #[tokio::test]
    async fn test_status_uses_default_list_scan() {
        let provider = MockClusterProvider::with_clusters(ClusterType::K3D, &["a", "b"]);
        let ctx = CancellationToken::new();

        assert_eq!(provider.status(&ctx, "b").await.unwrap().name, "b");

        let err = provider.status(&ctx, "c").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.verb(), Some("status"));
        assert_eq!(provider.calls().lists, 2);
    }

    #[tokio::test]
    async fn test_list_error_and_availability() {
        let provider = MockClusterProvider::new(ClusterType::KIND);
        let ctx = CancellationToken::new();

        provider.set_list_error(Some("Cannot connect to the Docker daemon"));
        let err = provider.list(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("Docker daemon"));

        provider.set_available(false);
        assert!(!provider.is_available(&ctx).await);
    }

    #[tokio::test]
    async fn test_start_unsupported() {
        let provider = MockClusterProvider::with_clusters(ClusterType::KIND, &["dev"]);
        provider.set_supports_start(false);
        let ctx = CancellationToken::new();

        let err = provider.start(&ctx, "dev").await.unwrap_err();
        assert!(matches!(err.root_cause(), ClusterError::Unsupported { .. }));
    }
}
