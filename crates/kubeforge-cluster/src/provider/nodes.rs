//! Docker helpers shared by the container-based providers

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::CleanupReport;
use crate::executor::CommandExecutor;
use kubeforge_core::{ClusterError, Result};

pub(crate) const DOCKER: &str = "docker";

/// A running node container
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeContainer {
    pub name: String,
    pub role: String,
}

/// Running containers carrying `label_key=cluster`, with their role label
pub(crate) async fn running_nodes<X: CommandExecutor + ?Sized>(
    executor: &X,
    ctx: &CancellationToken,
    label_key: &str,
    role_label: &str,
    cluster: &str,
) -> Result<Vec<NodeContainer>> {
    let args = vec![
        "ps".to_string(),
        "--filter".to_string(),
        format!("label={}={}", label_key, cluster),
        "--filter".to_string(),
        "status=running".to_string(),
        "--format".to_string(),
        format!("{{{{.Names}}}}\t{{{{.Label \"{}\"}}}}", role_label),
    ];
    let result = executor.execute(ctx, DOCKER, &args).await?;
    Ok(parse_node_lines(&result.stdout))
}

fn parse_node_lines(stdout: &str) -> Vec<NodeContainer> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (name, role) = line.split_once('\t').unwrap_or((line, ""));
            NodeContainer {
                name: name.trim().to_string(),
                role: role.trim().to_string(),
            }
        })
        .collect()
}

/// Run `crictl rmi --prune` inside each node of `cluster`
///
/// Per-node failures are recorded in the report. Cancellation is not a
/// node failure and aborts the whole cleanup.
pub(crate) async fn prune_images<X: CommandExecutor + ?Sized>(
    executor: &X,
    ctx: &CancellationToken,
    cluster: &str,
    nodes: &[NodeContainer],
) -> Result<CleanupReport> {
    let outcomes = join_all(nodes.iter().map(|node| async move {
        let args = vec![
            "exec".to_string(),
            node.name.clone(),
            "crictl".to_string(),
            "rmi".to_string(),
            "--prune".to_string(),
        ];
        (node, executor.execute(ctx, DOCKER, &args).await)
    }))
    .await;

    let interrupted = outcomes
        .iter()
        .any(|(_, outcome)| matches!(outcome, Err(e) if e.is_cancelled()));
    if interrupted || ctx.is_cancelled() {
        return Err(ClusterError::operation("cleanup", cluster, ClusterError::Cancelled));
    }

    let mut report = CleanupReport {
        nodes_found: nodes.len(),
        ..Default::default()
    };

    for (node, outcome) in outcomes {
        match outcome {
            Ok(_) => {
                debug!(node = %node.name, "pruned unused images");
                report.nodes_cleaned += 1;
            }
            Err(e) => {
                warn!(node = %node.name, error = %e, "image prune failed");
                report.failed.push((node.name.clone(), e.to_string()));
            }
        }
    }

    info!(
        found = report.nodes_found,
        cleaned = report.nodes_cleaned,
        "node cleanup finished"
    );
    Ok(report)
}
