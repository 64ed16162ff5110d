//! CLI error types with exit code handling
//!
//! Library errors are mapped onto a small set of user-facing categories,
//! each with its own exit code and, where possible, a hint.

use kubeforge_core::{ClusterError, ClusterType};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Configuration rejected before any tool ran
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(kubeforge::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// No provider knows the cluster
    #[error("{message}")]
    #[diagnostic(code(kubeforge::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Backend tool failed or is missing
    #[error("{message}")]
    #[diagnostic(code(kubeforge::cli::provider))]
    Provider {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Bad arguments, such as an unknown cluster type
    #[error("{message}")]
    #[diagnostic(code(kubeforge::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (settings file unreadable, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(kubeforge::cli::io))]
    Io { message: String },

    /// Interrupted by the user
    #[error("Interrupted")]
    #[diagnostic(code(kubeforge::cli::cancelled))]
    Cancelled,

    /// Anything else
    #[error("{message}")]
    #[diagnostic(code(kubeforge::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Provider { .. } => exit_codes::PROVIDER_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Cancelled => exit_codes::CANCELLED,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a settings/config file error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: Some("Check the kubeforge settings file (see --config)".to_string()),
        }
    }

    /// Unknown cluster type, with a "did you mean" hint against `registered`
    pub fn unknown_type(cluster_type: &ClusterType, registered: &[ClusterType]) -> Self {
        let available = registered
            .iter()
            .map(ClusterType::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        let help = match suggest_type(cluster_type.as_str(), registered) {
            Some(close) => format!("Did you mean '{}'? Available types: {}", close, available),
            None => format!("Available types: {}", available),
        };

        Self::Usage {
            message: format!("No provider for cluster type '{}'", cluster_type),
            help: Some(help),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CliError::NotFound { .. })
    }
}

/// Closest registered type name, if one is close enough
pub fn suggest_type<'a>(input: &str, registered: &'a [ClusterType]) -> Option<&'a str> {
    registered
        .iter()
        .map(|t| (t.as_str(), strsim::damerau_levenshtein(input, t.as_str())))
        .filter(|(_, distance)| *distance <= 2)
        .min_by_key(|(_, distance)| *distance)
        .map(|(name, _)| name)
}

/// Troubleshooting hint for a failed tool invocation
fn provider_help(err: &ClusterError) -> Option<String> {
    match err.root_cause() {
        ClusterError::Spawn { program, .. } => Some(format!(
            "Is '{}' installed and on your PATH?",
            program
        )),
        ClusterError::Unsupported { cluster_type, verb } => Some(format!(
            "{} clusters cannot {}; delete and recreate the cluster instead",
            cluster_type, verb
        )),
        ClusterError::CommandFailed { stderr, .. } => {
            let stderr = stderr.to_lowercase();
            if stderr.contains("docker daemon") || stderr.contains("docker.sock") {
                Some("Is the Docker daemon running?".to_string())
            } else if stderr.contains("already allocated") || stderr.contains("address already in use") {
                Some("A port is taken; change the ports in the k3d/kind settings".to_string())
            } else {
                Some("Re-run with --verbose to see the full tool output".to_string())
            }
        }
        _ => None,
    }
}

impl From<ClusterError> for CliError {
    fn from(err: ClusterError) -> Self {
        if err.is_cancelled() {
            return CliError::Cancelled;
        }
        if err.is_not_found() {
            let help = err
                .cluster_name()
                .map(|_| "Run 'kubeforge list' to see existing clusters".to_string());
            return CliError::NotFound {
                message: err.to_string(),
                help,
            };
        }

        match err.root_cause() {
            ClusterError::InvalidConfig { field, .. } => CliError::Validation {
                message: err.to_string(),
                help: Some(format!("Fix the '{}' value and try again", field)),
            },
            ClusterError::ProviderNotFound { cluster_type } => {
                CliError::unknown_type(cluster_type, &ClusterType::known())
            }
            ClusterError::Io(io) => CliError::Io {
                message: io.to_string(),
            },
            _ => CliError::Provider {
                message: err.to_string(),
                help: provider_help(&err),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Other {
            message: format!("JSON serialization failed: {}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
