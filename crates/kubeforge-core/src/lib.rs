//! Kubeforge Core - shared types for local Kubernetes cluster lifecycle
//!
//! This crate provides the foundational types used throughout kubeforge:
//! - `ClusterType`: The tag used to select a cluster provider
//! - `ClusterConfig`: What to create
//! - `ClusterInfo` / `NodeInfo`: A projection of live backend state
//! - `ClusterError`: The typed error taxonomy shared by providers and the manager
//! - `validate`: Pre-flight checks run before any mutating call

pub mod cluster;
pub mod error;
pub mod validate;

pub use cluster::{
    ClusterConfig, ClusterInfo, ClusterType, DEFAULT_K8S_VERSION, DEFAULT_NODE_COUNT, NodeInfo,
    NodeRole,
};
pub use error::{ClusterError, Result};
pub use validate::{validate_cluster_config, validate_cluster_name};
