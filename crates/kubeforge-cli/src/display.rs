//! Terminal rendering for clusters and nodes

use chrono::{DateTime, Utc};
use console::{StyledObject, style};
use kubeforge_cluster::CleanupReport;
use kubeforge_core::{ClusterInfo, NodeInfo};
use std::time::Duration;

/// Print the cluster table used by `list`
pub fn print_cluster_table(clusters: &[ClusterInfo]) {
    println!(
        "{:<24} {:<8} {:<10} {:<6} {:<10}",
        style("NAME").bold(),
        style("TYPE").bold(),
        style("STATUS").bold(),
        style("NODES").bold(),
        style("AGE").bold()
    );

    let now = Utc::now();
    for cluster in clusters {
        println!(
            "{:<24} {:<8} {:<10} {:<6} {:<10}",
            cluster.name,
            cluster.cluster_type.as_str(),
            status_style(cluster),
            cluster.node_count,
            format_age(since(cluster.created_at, now))
        );
    }
}

/// Print the detail view used by `status`
pub fn print_cluster_details(cluster: &ClusterInfo) {
    println!("{} {}", style("Cluster:").bold(), style(&cluster.name).cyan());
    println!("  Type:    {}", cluster.cluster_type);
    println!("  Status:  {}", status_style(cluster));
    println!("  Nodes:   {}", cluster.node_count);
    if let Some(image) = &cluster.image {
        println!("  Image:   {}", image);
    }
    println!(
        "  Created: {} ({} ago)",
        cluster.created_at.format("%Y-%m-%d %H:%M:%S"),
        format_age(since(cluster.created_at, Utc::now()))
    );

    if cluster.nodes.is_empty() {
        return;
    }

    println!();
    println!(
        "  {:<32} {:<14} {:<10} {:<10}",
        style("NODE").bold(),
        style("ROLE").bold(),
        style("STATUS").bold(),
        style("AGE").bold()
    );
    for node in &cluster.nodes {
        print_node(node);
    }
}

fn print_node(node: &NodeInfo) {
    let status = if node.status.eq_ignore_ascii_case("running") {
        style(node.status.as_str()).green()
    } else {
        style(node.status.as_str()).yellow()
    };
    println!(
        "  {:<32} {:<14} {:<10} {:<10}",
        node.name,
        node.role.to_string(),
        status,
        node.age.map(format_age).unwrap_or_else(|| "-".to_string())
    );
}

/// Print the outcome of `cleanup`
pub fn print_cleanup_report(name: &str, report: &CleanupReport) {
    if report.nodes_found == 0 {
        println!(
            "{} No running nodes found for {}",
            style("!").yellow().bold(),
            style(name).cyan()
        );
        return;
    }

    println!(
        "{} Pruned images on {}/{} nodes of {}",
        if report.is_clean() {
            style("✓").green().bold()
        } else {
            style("!").yellow().bold()
        },
        report.nodes_cleaned,
        report.nodes_found,
        style(name).cyan()
    );
    for (node, reason) in &report.failed {
        println!("  {} {}: {}", style("✗").red(), node, reason);
    }
}

fn status_style(cluster: &ClusterInfo) -> StyledObject<&str> {
    let status = cluster.status.as_str();
    match cluster.control_plane_counts() {
        _ if cluster.is_ready() => style(status).green(),
        Some((0, _)) => style(status).red(),
        Some(_) => style(status).yellow(),
        None => style(status).dim(),
    }
}

fn since(created: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - created).to_std().unwrap_or_default()
}

/// Compact age, kubectl style: `45s`, `12m`, `5h`, `3d`
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..60 => format!("{}s", secs),
        60..3600 => format!("{}m", secs / 60),
        3600..86400 => format!("{}h", secs / 3600),
        _ => format!("{}d", secs / 86400),
    }
}
