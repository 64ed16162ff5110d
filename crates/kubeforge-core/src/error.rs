//! Error types for cluster lifecycle operations

use thiserror::Error;

use crate::cluster::ClusterType;

/// Result type for kubeforge operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors produced by providers and the cluster manager
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClusterError {
    /// No registered provider knows a cluster with this name
    #[error("cluster '{name}' not found")]
    ClusterNotFound { name: String },

    /// No provider is registered for the requested type
    #[error("no provider registered for cluster type '{cluster_type}'")]
    ProviderNotFound { cluster_type: ClusterType },

    /// Configuration rejected before any tool was invoked
    #[error("invalid cluster configuration: {field} '{value}': {reason}")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    /// Cluster already exists (for providers that report it as an error)
    #[error("cluster '{name}' already exists")]
    ClusterAlreadyExists { name: String },

    /// A lifecycle verb failed for a named cluster
    #[error("cluster {verb} failed for '{name}': {source}")]
    Operation {
        verb: String,
        name: String,
        #[source]
        source: Box<ClusterError>,
    },

    /// External tool exited unsuccessfully
    #[error("`{command}` failed ({}): {}", exit_label(.code), .stderr.trim())]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// External tool could not be started at all
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend has no notion of this verb
    #[error("{cluster_type} clusters do not support '{verb}'")]
    Unsupported {
        cluster_type: ClusterType,
        verb: String,
    },

    /// Tool output could not be understood
    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    /// The surrounding context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl ClusterError {
    /// Wrap a cause with the verb and cluster name it happened under
    pub fn operation(verb: impl Into<String>, name: impl Into<String>, source: ClusterError) -> Self {
        Self::Operation {
            verb: verb.into(),
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn invalid_config(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::ClusterNotFound { name: name.into() }
    }

    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// True when the cluster is missing, however deeply the cause is wrapped
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ClusterNotFound { .. } => true,
            Self::Operation { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True when the operation was cancelled, however deeply wrapped
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Operation { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The verb of an operation error
    pub fn verb(&self) -> Option<&str> {
        match self {
            Self::Operation { verb, .. } => Some(verb),
            _ => None,
        }
    }

    /// The cluster an error is about, when it names one
    pub fn cluster_name(&self) -> Option<&str> {
        match self {
            Self::ClusterNotFound { name }
            | Self::ClusterAlreadyExists { name }
            | Self::Operation { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The innermost cause, skipping operation wrappers
    pub fn root_cause(&self) -> &ClusterError {
        match self {
            Self::Operation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_message_keeps_stderr() {
        let err = ClusterError::operation(
            "create",
            "dev",
            ClusterError::CommandFailed {
                command: "k3d cluster create dev".to_string(),
                code: Some(1),
                stderr: "FATA[0000] port 6550 already allocated\n".to_string(),
            },
        );

        let msg = err.to_string();
        assert!(msg.contains("cluster create failed for 'dev'"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("port 6550 already allocated"));
        assert_eq!(err.verb(), Some("create"));
    }

    #[test]
    fn test_not_found_through_wrapping() {
        let err = ClusterError::operation("status", "missing", ClusterError::not_found("missing"));
        assert!(err.is_not_found());
        assert!(!ClusterError::Cancelled.is_not_found());
        assert!(matches!(err.root_cause(), ClusterError::ClusterNotFound { name } if name == "missing"));
        assert_eq!(err.cluster_name(), Some("missing"));
    }

    #[test]
    fn test_signal_exit_label() {
        let err = ClusterError::CommandFailed {
            command: "k3d cluster list".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
