//! Start command - bring a stopped cluster back up

use console::style;
use kubeforge_core::ClusterType;

use super::{App, tolerate_not_found};
use crate::error::Result;

/// Run the start command
pub async fn run(app: &App, name: &str, cluster_type: Option<ClusterType>) -> Result<()> {
    let started = tolerate_not_found(name, start(app, name, cluster_type).await)?;
    if started.is_some() {
        println!("{} Cluster {} started", style("✓").green().bold(), style(name).cyan());
    }
    Ok(())
}

async fn start(app: &App, name: &str, cluster_type: Option<ClusterType>) -> Result<()> {
    let cluster_type = app.resolve_type(name, cluster_type).await?;
    app.manager.start_cluster(&app.ctx, name, &cluster_type).await?;
    Ok(())
}
