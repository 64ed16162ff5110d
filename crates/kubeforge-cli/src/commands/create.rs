//! Create command - provision a local cluster

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kubeforge_cluster::CreateOutcome;
use kubeforge_core::{ClusterConfig, ClusterType};
use std::time::Duration;

use super::App;
use crate::error::Result;

/// Run the create command
pub async fn run(
    app: &App,
    name: Option<&str>,
    cluster_type: Option<ClusterType>,
    nodes: Option<u32>,
    k8s_version: Option<&str>,
) -> Result<()> {
    let config = app.settings.cluster_config(name, cluster_type, nodes, k8s_version);
    app.require_provider(&config.cluster_type)?;

    print_plan(&config, app.options.dry_run);

    let spinner = spinner(app, &config);
    let outcome = app.manager.create_cluster(&app.ctx, &config).await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    match outcome? {
        CreateOutcome::AlreadyExists => {
            println!(
                "{} Cluster {} already exists",
                style("✓").green().bold(),
                style(&config.name).cyan()
            );
        }
        CreateOutcome::Created if app.options.dry_run => {
            println!(
                "{} Dry run - would create {}",
                style("✓").green().bold(),
                style(&config.name).cyan()
            );
        }
        CreateOutcome::Created => {
            println!(
                "{} Cluster {} is ready",
                style("✓").green().bold(),
                style(&config.name).cyan()
            );
            println!(
                "  Run 'kubeforge kubeconfig {}' to get its kubeconfig",
                config.name
            );
        }
    }

    Ok(())
}

fn print_plan(config: &ClusterConfig, dry_run: bool) {
    println!(
        "{} Creating {} cluster {} ({} nodes, Kubernetes {}){}",
        style("→").blue().bold(),
        style(&config.cluster_type).yellow(),
        style(&config.name).cyan(),
        config.node_count,
        config.k8s_version,
        if dry_run { " [dry run]" } else { "" }
    );
}

/// Spinner for interactive runs; logs would tear it apart otherwise
fn spinner(app: &App, config: &ClusterConfig) -> Option<ProgressBar> {
    if app.options.dry_run || app.options.verbose {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
        pb.set_style(template);
    }
    pb.set_message(format!("Waiting for {} to come up", config.name));
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}
