//! Pre-flight validation for mutating cluster operations
//!
//! These checks are pure: they never touch a backend, so a rejected
//! configuration has no side effects. They only catch structurally
//! invalid values. An unregistered cluster type is still a valid config
//! and fails later at dispatch with `ProviderNotFound`.

use crate::cluster::ClusterConfig;
use crate::error::{ClusterError, Result};

/// Reject empty or whitespace-only cluster names
pub fn validate_cluster_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ClusterError::invalid_config(
            "name",
            name,
            "cluster name cannot be empty",
        ));
    }
    Ok(())
}

/// Validate a cluster configuration before it reaches a provider
///
/// A node count below one is a hard error here; defaulting belongs to
/// whoever builds the config (see [`ClusterConfig::with_defaults`]).
pub fn validate_cluster_config(config: &ClusterConfig) -> Result<()> {
    validate_cluster_name(&config.name)?;

    if config.cluster_type.is_empty() {
        return Err(ClusterError::invalid_config(
            "type",
            &config.cluster_type,
            "cluster type cannot be empty",
        ));
    }

    if config.node_count < 1 {
        return Err(ClusterError::invalid_config(
            "nodeCount",
            config.node_count,
            "node count must be at least 1",
        ));
    }

    Ok(())
}
