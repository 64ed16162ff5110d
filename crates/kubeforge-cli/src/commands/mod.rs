//! CLI commands

pub mod cleanup;
pub mod create;
pub mod delete;
pub mod kubeconfig;
pub mod list;
pub mod start;
pub mod status;

use console::style;
use kubeforge_cluster::{
    CancellationToken, ClusterManager, CommandExecutor, RetryingExecutor, SystemExecutor,
};
use kubeforge_core::ClusterType;
use std::sync::Arc;
use tracing::debug;

use crate::config::{GlobalOptions, Settings};
use crate::error::{CliError, Result};

/// Everything a command needs, built once per invocation
pub struct App {
    pub manager: ClusterManager,
    pub settings: Settings,
    pub options: GlobalOptions,
    pub ctx: CancellationToken,
}

impl App {
    /// Load settings and wire the executor and providers
    pub fn new(options: GlobalOptions, ctx: CancellationToken) -> Result<Self> {
        let settings = Settings::load(options.config_path.as_deref())?;

        let system = SystemExecutor::new(options.dry_run, options.verbose);
        let executor: Arc<dyn CommandExecutor> = match settings.retry.preset.policy() {
            Some(policy) => {
                debug!(preset = %settings.retry.preset, "retrying tool invocations");
                Arc::new(RetryingExecutor::new(system, policy))
            }
            None => Arc::new(system),
        };

        let mut k3d = settings.k3d.clone();
        k3d.verbose = options.verbose;
        let manager = ClusterManager::with_default_providers(executor, k3d, settings.kind.clone());

        Ok(Self {
            manager,
            settings,
            options,
            ctx,
        })
    }

    /// The explicit type if it has a provider, otherwise whoever knows `name`
    pub async fn resolve_type(&self, name: &str, explicit: Option<ClusterType>) -> Result<ClusterType> {
        match explicit {
            Some(cluster_type) => {
                self.require_provider(&cluster_type)?;
                Ok(cluster_type)
            }
            None => {
                let detected = self.manager.detect_cluster_type(&self.ctx, name).await?;
                debug!(cluster = %name, provider = %detected, "detected cluster type");
                Ok(detected)
            }
        }
    }

    /// Fail with a suggestion when no provider handles `cluster_type`
    pub fn require_provider(&self, cluster_type: &ClusterType) -> Result<()> {
        self.manager
            .provider(cluster_type)
            .map(|_| ())
            .map_err(|_| CliError::unknown_type(cluster_type, &self.manager.provider_types()))
    }
}

/// Turn "cluster not found" into a warning
///
/// Verbs on a missing cluster are not fatal: the warning is printed and the
/// command exits successfully.
pub fn tolerate_not_found<T>(name: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            eprintln!(
                "{} Cluster {} not found",
                style("!").yellow().bold(),
                style(name).cyan()
            );
            eprintln!("  Run 'kubeforge list' to see existing clusters");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
