//! k3d provider
//!
//! Runs k3s clusters in docker through the `k3d` CLI. Cluster state is read
//! back from `k3d cluster list --output json` on every call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::nodes::{self, NodeContainer};
use super::{CleanupReport, ClusterProvider};
use crate::executor::CommandExecutor;
use kubeforge_core::{
    ClusterConfig, ClusterError, ClusterInfo, ClusterType, NodeInfo, NodeRole, Result,
};

const K3D: &str = "k3d";
const CLUSTER_LABEL: &str = "k3d.cluster";
const ROLE_LABEL: &str = "k3d.role";

/// Knobs for `k3d cluster create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct K3dOptions {
    /// Host port of the Kubernetes API
    pub api_port: u16,
    /// Host port mapped to the load balancer's port 80
    pub http_port: u16,
    /// Host port mapped to the load balancer's port 443
    pub https_port: u16,
    /// How long k3d waits for the cluster to come up
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Skip the bundled traefik ingress controller
    pub disable_traefik: bool,
    /// Pass `--verbose` to k3d
    #[serde(skip)]
    pub verbose: bool,
}

impl Default for K3dOptions {
    fn default() -> Self {
        Self {
            api_port: 6550,
            http_port: 8080,
            https_port: 8443,
            timeout: Duration::from_secs(180),
            disable_traefik: true,
            verbose: false,
        }
    }
}

/// Provider for k3d clusters
pub struct K3dProvider {
    executor: Arc<dyn CommandExecutor>,
    options: K3dOptions,
}

impl K3dProvider {
    pub fn new(executor: Arc<dyn CommandExecutor>, options: K3dOptions) -> Self {
        Self { executor, options }
    }

    pub fn options(&self) -> &K3dOptions {
        &self.options
    }

    async fn k3d<I, S>(&self, ctx: &CancellationToken, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        Ok(self.executor.execute(ctx, K3D, &args).await?.stdout)
    }

    fn verbose_flag(&self, args: &mut Vec<String>) {
        if self.options.verbose {
            args.push("--verbose".to_string());
        }
    }

    /// Arguments for `k3d cluster create`
    ///
    /// One server plus `node_count - 1` agents, so the cluster has exactly
    /// `node_count` nodes.
    pub fn create_args(&self, config: &ClusterConfig) -> Vec<String> {
        let agents = config.node_count.saturating_sub(1);
        let mut args = vec![
            "cluster".to_string(),
            "create".to_string(),
            config.name.clone(),
            "--servers".to_string(),
            "1".to_string(),
            "--agents".to_string(),
            agents.to_string(),
            "--api-port".to_string(),
            self.options.api_port.to_string(),
            "--port".to_string(),
            format!("{}:80@loadbalancer", self.options.http_port),
            "--port".to_string(),
            format!("{}:443@loadbalancer", self.options.https_port),
        ];

        if !config.k8s_version.trim().is_empty() {
            args.push("--image".to_string());
            args.push(k3s_image(&config.k8s_version));
        }

        if self.options.disable_traefik {
            args.push("--k3s-arg".to_string());
            args.push("--disable=traefik@server:*".to_string());
        }

        args.push("--timeout".to_string());
        args.push(format!("{}s", self.options.timeout.as_secs()));

        self.verbose_flag(&mut args);
        args
    }
}

/// `rancher/k3s` image for a version, adding the `-k3s1` build suffix when missing
fn k3s_image(version: &str) -> String {
    let version = version.trim();
    if version.contains("-k3s") {
        format!("rancher/k3s:{}", version)
    } else {
        format!("rancher/k3s:{}-k3s1", version)
    }
}

#[async_trait]
impl ClusterProvider for K3dProvider {
    fn cluster_type(&self) -> ClusterType {
        ClusterType::K3D
    }

    async fn is_available(&self, ctx: &CancellationToken) -> bool {
        match self.k3d(ctx, ["version"]).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "k3d is not available");
                false
            }
        }
    }

    async fn create(&self, ctx: &CancellationToken, config: &ClusterConfig) -> Result<()> {
        let args = self.create_args(config);
        info!(cluster = %config.name, nodes = config.node_count, "creating k3d cluster");

        self.k3d(ctx, args)
            .await
            .map_err(|e| ClusterError::operation("create", &config.name, e))?;
        Ok(())
    }

    async fn delete(&self, ctx: &CancellationToken, name: &str, force: bool) -> Result<()> {
        let mut args = vec!["cluster".to_string(), "delete".to_string(), name.to_string()];
        self.verbose_flag(&mut args);
        debug!(cluster = %name, force, "deleting k3d cluster");

        self.k3d(ctx, args)
            .await
            .map_err(|e| ClusterError::operation("delete", name, e))?;
        Ok(())
    }

    async fn start(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        let mut args = vec!["cluster".to_string(), "start".to_string(), name.to_string()];
        self.verbose_flag(&mut args);

        self.k3d(ctx, args)
            .await
            .map_err(|e| ClusterError::operation("start", name, e))?;
        Ok(())
    }

    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<ClusterInfo>> {
        let stdout = self
            .k3d(ctx, ["cluster", "list", "--output", "json"])
            .await?;
        parse_cluster_list(&stdout, Utc::now())
    }

    async fn detect_type(&self, ctx: &CancellationToken, name: &str) -> Result<ClusterType> {
        match self.k3d(ctx, ["cluster", "get", name]).await {
            Ok(_) => Ok(ClusterType::K3D),
            Err(ClusterError::CommandFailed { stderr, .. }) => {
                debug!(cluster = %name, stderr = %stderr.trim(), "not a k3d cluster");
                Err(ClusterError::not_found(name))
            }
            Err(e) => Err(e),
        }
    }

    async fn kubeconfig(&self, ctx: &CancellationToken, name: &str) -> Result<String> {
        self.k3d(ctx, ["kubeconfig", "get", name])
            .await
            .map_err(|e| ClusterError::operation("kubeconfig", name, e))
    }

    async fn cleanup(&self, ctx: &CancellationToken, name: &str) -> Result<CleanupReport> {
        let nodes: Vec<NodeContainer> =
            nodes::running_nodes(self.executor.as_ref(), ctx, CLUSTER_LABEL, ROLE_LABEL, name)
                .await
                .map_err(|e| ClusterError::operation("cleanup", name, e))?
                .into_iter()
                .filter(|n| n.role == "server" || n.role == "agent")
                .collect();

        if nodes.is_empty() {
            info!(cluster = %name, "no running k3d nodes to clean up");
            return Ok(CleanupReport::default());
        }

        nodes::prune_images(self.executor.as_ref(), ctx, name, &nodes).await
    }
}

// Wire shape of `k3d cluster list --output json`

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCluster {
    name: String,
    #[serde(default, deserialize_with = "lenient_count")]
    servers_count: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    servers_running: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    agents_count: u32,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    nodes: Vec<WireNode>,
}

#[derive(Debug, Deserialize)]
struct WireNode {
    name: String,
    #[serde(default)]
    role: String,
    #[serde(rename = "State", default)]
    state: WireNodeState,
    #[serde(default)]
    created: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireNodeState {
    #[serde(rename = "Running", default)]
    running: bool,
    #[serde(rename = "Status", default)]
    status: String,
}

/// Accept counts as numbers or numeric strings; anything else counts as zero
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let count = match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    };
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

/// Map k3d's JSON listing into the domain model
///
/// Empty output (as produced by a dry run) means no clusters.
pub(crate) fn parse_cluster_list(stdout: &str, now: DateTime<Utc>) -> Result<Vec<ClusterInfo>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let wire: Vec<WireCluster> = serde_json::from_str(stdout)
        .map_err(|e| ClusterError::parse("k3d cluster list", e))?;

    Ok(wire.into_iter().map(|c| to_cluster_info(c, now)).collect())
}

fn to_cluster_info(wire: WireCluster, now: DateTime<Utc>) -> ClusterInfo {
    let mut created_at: Option<DateTime<Utc>> = None;
    let mut nodes = Vec::with_capacity(wire.nodes.len());

    for node in wire.nodes {
        let role = match node.role.as_str() {
            "server" => NodeRole::ControlPlane,
            "agent" => NodeRole::Worker,
            _ => continue,
        };

        let created = node
            .created
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc));
        if let Some(ts) = created {
            created_at = Some(created_at.map_or(ts, |earliest| earliest.min(ts)));
        }

        let status = if !node.state.status.is_empty() {
            node.state.status
        } else if node.state.running {
            "running".to_string()
        } else {
            "stopped".to_string()
        };

        nodes.push(NodeInfo {
            name: node.name,
            role,
            status,
            age: created.and_then(|ts| (now - ts).to_std().ok()),
        });
    }

    ClusterInfo {
        name: wire.name,
        cluster_type: ClusterType::K3D,
        status: ClusterInfo::status_string(wire.servers_running, wire.servers_count),
        node_count: wire.servers_count.saturating_add(wire.agents_count),
        image: wire.image.filter(|i| !i.trim().is_empty()),
        nodes,
        created_at: created_at.unwrap_or(now),
    }
}
