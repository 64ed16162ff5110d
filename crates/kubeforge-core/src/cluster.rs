//! Cluster domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;

/// Node count used when the caller did not ask for one
pub const DEFAULT_NODE_COUNT: u32 = 3;

/// Kubernetes version used when the caller did not pin one
pub const DEFAULT_K8S_VERSION: &str = "v1.31.5-k3s1";

/// Tag selecting the provider that manages a cluster
///
/// Any string is a valid tag. Only tags with a registered provider can be
/// dispatched; the others fail at lookup time, not at construction.
///
/// Deserialized tags go through [`ClusterType::new`], so `K3D` in a
/// settings file means `k3d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ClusterType(Cow<'static, str>);

impl ClusterType {
    pub const K3D: Self = Self(Cow::Borrowed("k3d"));
    pub const KIND: Self = Self(Cow::Borrowed("kind"));
    pub const GKE: Self = Self(Cow::Borrowed("gke"));
    pub const EKS: Self = Self(Cow::Borrowed("eks"));

    /// Create a tag from any string (trimmed and lowercased)
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(Cow::Owned(tag.as_ref().trim().to_lowercase()))
    }

    /// All tags kubeforge knows about, whether or not a provider is registered
    pub fn known() -> [ClusterType; 4] {
        [Self::K3D, Self::KIND, Self::GKE, Self::EKS]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ClusterType {
    fn default() -> Self {
        Self::K3D
    }
}

impl std::fmt::Display for ClusterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ClusterType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for ClusterType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ClusterType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<ClusterType> for String {
    fn from(t: ClusterType) -> Self {
        t.0.into_owned()
    }
}

/// Configuration for creating a cluster
///
/// Built by the configuration layer and handed to the manager; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Cluster name
    pub name: String,

    /// Provider that should own the cluster
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,

    /// Kubernetes version (backend specific image tag, e.g. "v1.31.5-k3s1")
    #[serde(default)]
    pub k8s_version: String,

    /// Total number of nodes, control plane included
    pub node_count: u32,
}

impl ClusterConfig {
    /// Create a config with the default node count and Kubernetes version
    pub fn new(name: impl Into<String>, cluster_type: ClusterType) -> Self {
        Self {
            name: name.into(),
            cluster_type,
            k8s_version: DEFAULT_K8S_VERSION.to_string(),
            node_count: DEFAULT_NODE_COUNT,
        }
    }

    pub fn with_node_count(mut self, node_count: u32) -> Self {
        self.node_count = node_count;
        self
    }

    pub fn with_k8s_version(mut self, version: impl Into<String>) -> Self {
        self.k8s_version = version.into();
        self
    }

    /// Fill in zero values the way the configuration boundary does
    ///
    /// A node count of zero becomes [`DEFAULT_NODE_COUNT`]. The validator
    /// itself never defaults, so callers run this before `create`.
    pub fn with_defaults(mut self) -> Self {
        if self.node_count == 0 {
            self.node_count = DEFAULT_NODE_COUNT;
        }
        self
    }
}

/// Role of a node inside a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ControlPlane => "control-plane",
            Self::Worker => "worker",
        };
        write!(f, "{}", s)
    }
}

/// A node of a cluster, as reported by the backend at query time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub name: String,
    pub role: NodeRole,
    /// Backend-reported state (e.g. "running", "exited")
    pub status: String,
    /// Time since the node was created, when the backend reports it
    #[serde(default, with = "humantime_serde")]
    pub age: Option<Duration>,
}

/// Live view of a cluster
///
/// Produced fresh on every query and never cached: the backend tool is the
/// only source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub name: String,

    #[serde(rename = "type")]
    pub cluster_type: ClusterType,

    /// Control-plane availability as `"<running>/<total>"`
    pub status: String,

    /// Control-plane plus worker nodes
    pub node_count: u32,

    /// Node image reported by the backend, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default)]
    pub nodes: Vec<NodeInfo>,

    pub created_at: DateTime<Utc>,
}

impl ClusterInfo {
    /// Synthesize the `"<running>/<total>"` status string
    pub fn status_string(running: u32, total: u32) -> String {
        format!("{}/{}", running, total)
    }

    /// Parse the status back into `(running, total)`
    pub fn control_plane_counts(&self) -> Option<(u32, u32)> {
        let (running, total) = self.status.split_once('/')?;
        Some((running.trim().parse().ok()?, total.trim().parse().ok()?))
    }

    /// Whether every control-plane node is running
    ///
    /// Partial availability (`"1/3"`) and empty clusters (`"0/0"`) are not ready.
    pub fn is_ready(&self) -> bool {
        matches!(self.control_plane_counts(), Some((running, total)) if total > 0 && running == total)
    }
}
