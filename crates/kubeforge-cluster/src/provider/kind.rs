//! kind provider
//!
//! kind has no stop/start concept and no JSON listing, so cluster state is
//! assembled from `kind get clusters` plus the docker labels kind puts on
//! every node container.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::nodes::{self, DOCKER};
use super::{CleanupReport, ClusterProvider};
use crate::executor::CommandExecutor;
use kubeforge_core::{
    ClusterConfig, ClusterError, ClusterInfo, ClusterType, NodeInfo, NodeRole, Result,
};

const KIND: &str = "kind";
const CLUSTER_LABEL: &str = "io.x-k8s.kind.cluster";
const ROLE_LABEL: &str = "io.x-k8s.kind.role";

/// Knobs for `kind create cluster`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KindOptions {
    /// Host port mapped to the control plane's port 80
    pub http_port: u16,
    /// Host port mapped to the control plane's port 443
    pub https_port: u16,
    /// How long kind waits for the control plane
    #[serde(with = "humantime_serde")]
    pub wait: Duration,
}

impl Default for KindOptions {
    fn default() -> Self {
        Self {
            http_port: 8080,
            https_port: 8443,
            wait: Duration::from_secs(180),
        }
    }
}

// kind's cluster config file (kind.x-k8s.io/v1alpha4)

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KindClusterConfig {
    kind: &'static str,
    api_version: &'static str,
    nodes: Vec<KindNode>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct KindNode {
    role: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extra_port_mappings: Vec<PortMapping>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PortMapping {
    container_port: u16,
    host_port: u16,
}

/// Provider for kind clusters
pub struct KindProvider {
    executor: Arc<dyn CommandExecutor>,
    options: KindOptions,
}

impl KindProvider {
    pub fn new(executor: Arc<dyn CommandExecutor>, options: KindOptions) -> Self {
        Self { executor, options }
    }

    async fn kind<I, S>(&self, ctx: &CancellationToken, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        Ok(self.executor.execute(ctx, KIND, &args).await?.stdout)
    }

    /// kind cluster config: one control plane with the ingress ports, the
    /// rest workers
    pub fn cluster_config_yaml(&self, config: &ClusterConfig) -> Result<String> {
        let mut nodes = vec![KindNode {
            role: "control-plane",
            extra_port_mappings: vec![
                PortMapping {
                    container_port: 80,
                    host_port: self.options.http_port,
                },
                PortMapping {
                    container_port: 443,
                    host_port: self.options.https_port,
                },
            ],
        }];
        for _ in 1..config.node_count {
            nodes.push(KindNode {
                role: "worker",
                extra_port_mappings: Vec::new(),
            });
        }

        let doc = KindClusterConfig {
            kind: "Cluster",
            api_version: "kind.x-k8s.io/v1alpha4",
            nodes,
        };
        serde_yaml::to_string(&doc).map_err(|e| ClusterError::parse("kind cluster config", e))
    }

    /// Arguments for `kind create cluster`, given the written config path
    pub fn create_args(&self, config: &ClusterConfig, config_path: &str) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            config.name.clone(),
            "--config".to_string(),
            config_path.to_string(),
        ];
        if !config.k8s_version.trim().is_empty() {
            args.push("--image".to_string());
            args.push(format!("kindest/node:{}", strip_k3s_suffix(&config.k8s_version)));
        }
        args.push("--wait".to_string());
        args.push(format!("{}s", self.options.wait.as_secs()));
        args
    }

    async fn cluster_names(&self, ctx: &CancellationToken) -> Result<Vec<String>> {
        let stdout = self.kind(ctx, ["get", "clusters"]).await?;
        Ok(parse_cluster_names(&stdout))
    }

    async fn describe(&self, ctx: &CancellationToken, name: &str, now: DateTime<Utc>) -> Result<ClusterInfo> {
        let args = vec![
            "ps".to_string(),
            "-a".to_string(),
            "--filter".to_string(),
            format!("label={}={}", CLUSTER_LABEL, name),
            "--format".to_string(),
            format!(
                "{{{{.Names}}}}\t{{{{.Label \"{}\"}}}}\t{{{{.State}}}}\t{{{{.CreatedAt}}}}",
                ROLE_LABEL
            ),
        ];
        let stdout = self.executor.execute(ctx, DOCKER, &args).await?.stdout;
        Ok(cluster_from_containers(name, &stdout, now))
    }
}

/// kind node images carry no k3s build suffix (`v1.31.5-k3s1` → `v1.31.5`)
fn strip_k3s_suffix(version: &str) -> &str {
    let version = version.trim();
    match version.find("-k3s") {
        Some(idx) => &version[..idx],
        None => version,
    }
}

fn parse_cluster_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        // kind prints this on stderr, but older releases used stdout
        .filter(|line| !line.is_empty() && !line.starts_with("No kind clusters found"))
        .map(String::from)
        .collect()
}

/// Docker prints `2025-03-01 11:00:00 +0000 UTC`; the zone name is dropped
fn parse_docker_time(raw: &str) -> Option<DateTime<Utc>> {
    let head: Vec<&str> = raw.split_whitespace().take(3).collect();
    if head.len() < 3 {
        return None;
    }
    DateTime::parse_from_str(&head.join(" "), "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn cluster_from_containers(name: &str, stdout: &str, now: DateTime<Utc>) -> ClusterInfo {
    let mut nodes = Vec::new();
    let mut created_at: Option<DateTime<Utc>> = None;
    let (mut cp_running, mut cp_total) = (0u32, 0u32);

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split('\t').collect();
        let role = match fields.get(1).copied().unwrap_or("") {
            "control-plane" => NodeRole::ControlPlane,
            "worker" => NodeRole::Worker,
            _ => continue,
        };
        let state = fields.get(2).copied().unwrap_or("").to_string();
        let created = fields.get(3).and_then(|raw| parse_docker_time(raw));

        if role == NodeRole::ControlPlane {
            cp_total += 1;
            if state == "running" {
                cp_running += 1;
            }
        }
        if let Some(ts) = created {
            created_at = Some(created_at.map_or(ts, |earliest| earliest.min(ts)));
        }

        nodes.push(NodeInfo {
            name: fields[0].to_string(),
            role,
            status: state,
            age: created.and_then(|ts| (now - ts).to_std().ok()),
        });
    }

    ClusterInfo {
        name: name.to_string(),
        cluster_type: ClusterType::KIND,
        status: ClusterInfo::status_string(cp_running, cp_total),
        node_count: nodes.len() as u32,
        image: None,
        nodes,
        created_at: created_at.unwrap_or(now),
    }
}

#[async_trait]
impl ClusterProvider for KindProvider {
    fn cluster_type(&self) -> ClusterType {
        ClusterType::KIND
    }

    async fn is_available(&self, ctx: &CancellationToken) -> bool {
        match self.kind(ctx, ["version"]).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "kind is not available");
                false
            }
        }
    }

    async fn create(&self, ctx: &CancellationToken, config: &ClusterConfig) -> Result<()> {
        let wrap = |e: ClusterError| ClusterError::operation("create", &config.name, e);

        let yaml = self.cluster_config_yaml(config).map_err(wrap)?;
        let mut file = tempfile::Builder::new()
            .prefix("kubeforge-kind-")
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| wrap(e.into()))?;
        file.write_all(yaml.as_bytes()).map_err(|e| wrap(e.into()))?;
        file.flush().map_err(|e| wrap(e.into()))?;

        let args = self.create_args(config, &file.path().to_string_lossy());
        info!(cluster = %config.name, nodes = config.node_count, "creating kind cluster");

        // `file` stays alive until kind has read it
        self.kind(ctx, args).await.map_err(wrap)?;
        Ok(())
    }

    async fn delete(&self, ctx: &CancellationToken, name: &str, force: bool) -> Result<()> {
        debug!(cluster = %name, force, "deleting kind cluster");
        self.kind(ctx, ["delete", "cluster", "--name", name])
            .await
            .map_err(|e| ClusterError::operation("delete", name, e))?;
        Ok(())
    }

    async fn start(&self, _ctx: &CancellationToken, name: &str) -> Result<()> {
        Err(ClusterError::operation(
            "start",
            name,
            ClusterError::Unsupported {
                cluster_type: ClusterType::KIND,
                verb: "start".to_string(),
            },
        ))
    }

    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<ClusterInfo>> {
        let now = Utc::now();
        let mut clusters = Vec::new();
        for name in self.cluster_names(ctx).await? {
            clusters.push(self.describe(ctx, &name, now).await?);
        }
        Ok(clusters)
    }

    async fn detect_type(&self, ctx: &CancellationToken, name: &str) -> Result<ClusterType> {
        if self.cluster_names(ctx).await?.iter().any(|n| n == name) {
            Ok(ClusterType::KIND)
        } else {
            Err(ClusterError::not_found(name))
        }
    }

    async fn kubeconfig(&self, ctx: &CancellationToken, name: &str) -> Result<String> {
        self.kind(ctx, ["get", "kubeconfig", "--name", name])
            .await
            .map_err(|e| ClusterError::operation("kubeconfig", name, e))
    }

    async fn cleanup(&self, ctx: &CancellationToken, name: &str) -> Result<CleanupReport> {
        let nodes =
            nodes::running_nodes(self.executor.as_ref(), ctx, CLUSTER_LABEL, ROLE_LABEL, name)
                .await
                .map_err(|e| ClusterError::operation("cleanup", name, e))?;

        if nodes.is_empty() {
            info!(cluster = %name, "no running kind nodes to clean up");
            return Ok(CleanupReport::default());
        }

        nodes::prune_images(self.executor.as_ref(), ctx, name, &nodes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use chrono::TimeZone;

    fn provider(mock: &MockExecutor) -> KindProvider {
        KindProvider::new(Arc::new(mock.clone()), KindOptions::default())
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_cluster_config_yaml() {
        let mock = MockExecutor::new();
        let config = ClusterConfig::new("dev", ClusterType::KIND);
        let yaml = provider(&mock).cluster_config_yaml(&config).unwrap();

        insta::assert_snapshot!(yaml, @r"
        kind: Cluster
        apiVersion: kind.x-k8s.io/v1alpha4
        nodes:
        - role: control-plane
          extraPortMappings:
          - containerPort: 80
            hostPort: 8080
          - containerPort: 443
            hostPort: 8443
        - role: worker
        - role: worker
        ");
    }

    #[test]
    fn test_create_args_strip_k3s_suffix() {
        let mock = MockExecutor::new();
        let config = ClusterConfig::new("dev", ClusterType::KIND);
        let args = provider(&mock).create_args(&config, "/tmp/kind.yaml");

        assert_eq!(
            args.join(" "),
            "create cluster --name dev --config /tmp/kind.yaml --image kindest/node:v1.31.5 --wait 180s"
        );
        assert_eq!(strip_k3s_suffix("v1.29.0"), "v1.29.0");
    }

    #[test]
    fn test_cluster_from_containers() {
        let stdout = "dev-control-plane\tcontrol-plane\trunning\t2025-03-01 11:00:00 +0000 UTC\n\
                      dev-worker\tworker\texited\t2025-03-01 11:00:05 +0000 UTC\n\
                      dev-external-load-balancer\texternal-load-balancer\trunning\t2025-03-01 11:00:00 +0000 UTC\n";
        let info = cluster_from_containers("dev", stdout, fixed_now());

        assert_eq!(info.node_count, 2);
        assert_eq!(info.status, "1/1");
        assert_eq!(info.nodes[1].status, "exited");
        assert_eq!(info.nodes[0].age, Some(Duration::from_secs(3600)));
        assert_eq!(info.created_at, Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_cluster_names() {
        assert_eq!(parse_cluster_names("dev\nstaging\n"), vec!["dev", "staging"]);
        assert!(parse_cluster_names("No kind clusters found.\n").is_empty());
        assert!(parse_cluster_names("").is_empty());
    }

    #[tokio::test]
    async fn test_start_is_unsupported() {
        let mock = MockExecutor::new();
        let ctx = CancellationToken::new();

        let err = provider(&mock).start(&ctx, "dev").await.unwrap_err();
        assert!(matches!(err.root_cause(), ClusterError::Unsupported { .. }));
        assert_eq!(mock.command_count(), 0);
    }

    #[tokio::test]
    async fn test_create_writes_config_file() {
        let mock = MockExecutor::new();
        let ctx = CancellationToken::new();

        provider(&mock)
            .create(&ctx, &ClusterConfig::new("dev", ClusterType::KIND).with_node_count(1))
            .await
            .unwrap();

        let cmd = mock.last_command().unwrap();
        assert!(cmd.starts_with("kind create cluster --name dev --config "));
        assert!(cmd.contains("kubeforge-kind-"));
    }

    #[tokio::test]
    async fn test_list_and_detect() {
        let mock = MockExecutor::new();
        mock.respond_ok("get clusters", "dev\n")
            .respond_ok("docker ps", "dev-control-plane\tcontrol-plane\trunning\t2025-03-01 11:00:00 +0000 UTC\n");
        let ctx = CancellationToken::new();
        let kind = provider(&mock);

        let clusters = kind.list(&ctx).await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].cluster_type, ClusterType::KIND);
        assert!(mock.was_executed("--filter label=io.x-k8s.kind.cluster=dev"));

        assert_eq!(kind.detect_type(&ctx, "dev").await.unwrap(), ClusterType::KIND);
        assert!(kind.detect_type(&ctx, "prod").await.unwrap_err().is_not_found());
    }
}
