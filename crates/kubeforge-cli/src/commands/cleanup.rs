//! Cleanup command - prune unused images inside cluster nodes

use console::style;
use kubeforge_cluster::CleanupReport;
use kubeforge_core::ClusterType;

use super::{App, tolerate_not_found};
use crate::display;
use crate::error::Result;

/// Run the cleanup command
pub async fn run(app: &App, name: &str, cluster_type: Option<ClusterType>) -> Result<()> {
    let Some(report) = tolerate_not_found(name, cleanup(app, name, cluster_type).await)? else {
        return Ok(());
    };
    display::print_cleanup_report(name, &report);
    Ok(())
}

async fn cleanup(app: &App, name: &str, cluster_type: Option<ClusterType>) -> Result<CleanupReport> {
    let cluster_type = app.resolve_type(name, cluster_type).await?;
    println!(
        "{} Pruning unused images in {} cluster {}",
        style("→").blue().bold(),
        style(&cluster_type).yellow(),
        style(name).cyan()
    );
    Ok(app.manager.cleanup_cluster(&app.ctx, name, &cluster_type).await?)
}
