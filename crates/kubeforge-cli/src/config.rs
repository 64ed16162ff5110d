//! Settings file and per-invocation options

use kubeforge_cluster::{K3dOptions, KindOptions, RetryPreset};
use kubeforge_core::{ClusterConfig, ClusterType, DEFAULT_K8S_VERSION, DEFAULT_NODE_COUNT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

/// Name used by `create` when none is given
pub const DEFAULT_CLUSTER_NAME: &str = "kubeforge-dev";

/// Flags shared by every command, parsed once
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub verbose: bool,
    pub dry_run: bool,
    pub config_path: Option<PathBuf>,
}

/// Contents of `config.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub defaults: Defaults,
    pub k3d: K3dOptions,
    pub kind: KindOptions,
    pub retry: RetrySettings,
}

/// Values used when a command leaves them out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Defaults {
    pub cluster_name: String,
    pub cluster_type: ClusterType,
    pub node_count: u32,
    pub k8s_version: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            cluster_type: ClusterType::K3D,
            node_count: DEFAULT_NODE_COUNT,
            k8s_version: DEFAULT_K8S_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Retry preset wrapped around every tool invocation
    pub preset: RetryPreset,
}

impl Settings {
    /// Load settings for this invocation
    ///
    /// An explicit path must exist. The default location is optional and
    /// yields built-in defaults when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load settings from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CliError::Io {
            message: format!("{}: {}", path.display(), e),
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| CliError::config(format!("{}: {}", path.display(), e)))
    }

    /// `<config dir>/kubeforge/config.yaml`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kubeforge").join("config.yaml"))
    }

    /// Build the create request, filling gaps from `defaults`
    ///
    /// A node count of zero counts as "not given".
    pub fn cluster_config(
        &self,
        name: Option<&str>,
        cluster_type: Option<ClusterType>,
        nodes: Option<u32>,
        k8s_version: Option<&str>,
    ) -> ClusterConfig {
        let cluster_type = cluster_type.unwrap_or_else(|| self.defaults.cluster_type.clone());
        let name = name.unwrap_or(&self.defaults.cluster_name);

        let node_count = match nodes {
            Some(n) if n > 0 => n,
            _ if self.defaults.node_count > 0 => self.defaults.node_count,
            _ => DEFAULT_NODE_COUNT,
        };

        ClusterConfig::new(name, cluster_type)
            .with_node_count(node_count)
            .with_k8s_version(k8s_version.unwrap_or(&self.defaults.k8s_version))
    }
}
