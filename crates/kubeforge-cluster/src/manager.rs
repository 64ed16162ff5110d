//! Provider registry and lifecycle dispatch

use futures::future::join_all;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::executor::CommandExecutor;
use crate::provider::{CleanupReport, ClusterProvider, K3dOptions, K3dProvider, KindOptions, KindProvider};
use kubeforge_core::{
    ClusterConfig, ClusterError, ClusterInfo, ClusterType, Result, validate_cluster_config,
    validate_cluster_name,
};

/// What [`ClusterManager::create_cluster`] ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A cluster with that name already existed; nothing was run
    AlreadyExists,
}

/// Holds one provider per cluster type and dispatches lifecycle verbs
///
/// Providers are kept in registration order, which is also the order used
/// by aggregate queries and by type detection. The registry is filled once
/// at startup and only read afterwards.
#[derive(Default)]
pub struct ClusterManager {
    providers: IndexMap<ClusterType, Arc<dyn ClusterProvider>>,
}

impl ClusterManager {
    /// Create a manager with no providers
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager with k3d and kind registered, in that order
    pub fn with_default_providers(
        executor: Arc<dyn CommandExecutor>,
        k3d: K3dOptions,
        kind: KindOptions,
    ) -> Self {
        let mut manager = Self::new();
        manager.register_provider(
            ClusterType::K3D,
            Arc::new(K3dProvider::new(executor.clone(), k3d)),
        );
        manager.register_provider(ClusterType::KIND, Arc::new(KindProvider::new(executor, kind)));
        manager
    }

    /// Register `provider` for `cluster_type`
    ///
    /// Re-registering a type replaces the provider but keeps its position.
    pub fn register_provider(&mut self, cluster_type: ClusterType, provider: Arc<dyn ClusterProvider>) {
        debug!(provider = %cluster_type, "registering provider");
        self.providers.insert(cluster_type, provider);
    }

    /// Provider registered for `cluster_type`
    pub fn provider(&self, cluster_type: &ClusterType) -> Result<Arc<dyn ClusterProvider>> {
        self.providers
            .get(cluster_type)
            .cloned()
            .ok_or_else(|| ClusterError::ProviderNotFound {
                cluster_type: cluster_type.clone(),
            })
    }

    /// Registered types, in registration order
    pub fn provider_types(&self) -> Vec<ClusterType> {
        self.providers.keys().cloned().collect()
    }

    /// Providers whose backend tool answers, in registration order
    ///
    /// A cancelled `ctx` makes every check fail, so it is reported as
    /// `Cancelled` rather than as an empty registry.
    async fn available_providers(&self, ctx: &CancellationToken) -> Result<Vec<Arc<dyn ClusterProvider>>> {
        let checks = self.providers.values().map(|provider| async move {
            (provider.clone(), provider.is_available(ctx).await)
        });

        let available = join_all(checks)
            .await
            .into_iter()
            .filter_map(|(provider, available)| {
                if !available {
                    debug!(provider = %provider.cluster_type(), "provider unavailable, skipping");
                }
                available.then_some(provider)
            })
            .collect();

        if ctx.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }
        Ok(available)
    }

    /// Create a cluster unless one with the same name already exists
    ///
    /// The config is validated before anything runs. Existence is probed
    /// through the target provider's `status`: a not-found answer leads to
    /// `create`, any other failure is returned as is.
    pub async fn create_cluster(
        &self,
        ctx: &CancellationToken,
        config: &ClusterConfig,
    ) -> Result<CreateOutcome> {
        validate_cluster_config(config)?;
        let provider = self.provider(&config.cluster_type)?;

        match provider.status(ctx, &config.name).await {
            Ok(existing) => {
                info!(
                    cluster = %config.name,
                    status = %existing.status,
                    "cluster already exists, nothing to do"
                );
                return Ok(CreateOutcome::AlreadyExists);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        provider.create(ctx, config).await?;
        info!(cluster = %config.name, provider = %config.cluster_type, "cluster created");
        Ok(CreateOutcome::Created)
    }

    /// Delete a cluster through the provider for `cluster_type`
    pub async fn delete_cluster(
        &self,
        ctx: &CancellationToken,
        name: &str,
        cluster_type: &ClusterType,
        force: bool,
    ) -> Result<()> {
        validate_cluster_name(name)?;
        self.provider(cluster_type)?.delete(ctx, name, force).await
    }

    pub async fn start_cluster(
        &self,
        ctx: &CancellationToken,
        name: &str,
        cluster_type: &ClusterType,
    ) -> Result<()> {
        validate_cluster_name(name)?;
        self.provider(cluster_type)?.start(ctx, name).await
    }

    /// Clusters of every available provider; any listing failure fails the call
    pub async fn list_clusters(&self, ctx: &CancellationToken) -> Result<Vec<ClusterInfo>> {
        let providers = self.available_providers(ctx).await?;
        let listings = join_all(providers.iter().map(|p| p.list(ctx))).await;

        let mut clusters = Vec::new();
        for listing in listings {
            clusters.extend(listing?);
        }
        Ok(clusters)
    }

    /// Clusters of one provider
    pub async fn list_clusters_of(
        &self,
        ctx: &CancellationToken,
        cluster_type: &ClusterType,
    ) -> Result<Vec<ClusterInfo>> {
        self.provider(cluster_type)?.list(ctx).await
    }

    /// Clusters of every available provider, skipping providers that fail
    ///
    /// One unhealthy backend never hides the clusters of the others. A
    /// cancelled `ctx` yields an empty list; callers check the token.
    pub async fn list_all_clusters(&self, ctx: &CancellationToken) -> Vec<ClusterInfo> {
        let Ok(providers) = self.available_providers(ctx).await else {
            return Vec::new();
        };
        let listings = join_all(providers.iter().map(|p| async move {
            (p.cluster_type(), p.list(ctx).await)
        }))
        .await;

        let mut clusters = Vec::new();
        for (cluster_type, listing) in listings {
            match listing {
                Ok(found) => clusters.extend(found),
                Err(e) => warn!(provider = %cluster_type, error = %e, "skipping provider, list failed"),
            }
        }
        clusters
    }

    /// Status of a cluster from whichever available provider knows it
    ///
    /// Providers are asked in registration order and the first answer wins.
    /// When none knows the cluster, a real failure is preferred over a
    /// not-found.
    pub async fn get_cluster_status(&self, ctx: &CancellationToken, name: &str) -> Result<ClusterInfo> {
        validate_cluster_name(name)?;

        let mut not_found = None;
        let mut failure = None;

        for provider in self.available_providers(ctx).await? {
            match provider.status(ctx, name).await {
                Ok(info) => return Ok(info),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if e.is_not_found() => {
                    not_found.get_or_insert(e);
                }
                Err(e) => {
                    debug!(provider = %provider.cluster_type(), error = %e, "status probe failed");
                    failure.get_or_insert(e);
                }
            }
        }

        Err(failure
            .or(not_found)
            .unwrap_or_else(|| ClusterError::not_found(name)))
    }

    /// Type of the first available provider that manages `name`
    ///
    /// If two providers both claim the name, the one registered first wins;
    /// no further disambiguation is attempted.
    pub async fn detect_cluster_type(&self, ctx: &CancellationToken, name: &str) -> Result<ClusterType> {
        validate_cluster_name(name)?;

        for provider in self.available_providers(ctx).await? {
            match provider.detect_type(ctx, name).await {
                Ok(cluster_type) => {
                    debug!(cluster = %name, provider = %cluster_type, "cluster type detected");
                    return Ok(cluster_type);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    debug!(cluster = %name, provider = %provider.cluster_type(), error = %e, "no match");
                }
            }
        }

        Err(ClusterError::not_found(name))
    }

    pub async fn get_kubeconfig(
        &self,
        ctx: &CancellationToken,
        name: &str,
        cluster_type: &ClusterType,
    ) -> Result<String> {
        validate_cluster_name(name)?;
        self.provider(cluster_type)?.kubeconfig(ctx, name).await
    }

    /// Prune unused images on the nodes of a cluster
    pub async fn cleanup_cluster(
        &self,
        ctx: &CancellationToken,
        name: &str,
        cluster_type: &ClusterType,
    ) -> Result<CleanupReport> {
        validate_cluster_name(name)?;
        self.provider(cluster_type)?.cleanup(ctx, name).await
    }
}
