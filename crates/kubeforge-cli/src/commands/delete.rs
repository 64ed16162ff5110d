//! Delete command - tear down a cluster

use console::style;
use kubeforge_core::ClusterType;

use super::{App, tolerate_not_found};
use crate::error::Result;

/// Run the delete command
pub async fn run(app: &App, name: &str, cluster_type: Option<ClusterType>, force: bool) -> Result<()> {
    let deleted = tolerate_not_found(name, delete(app, name, cluster_type, force).await)?;
    let Some(cluster_type) = deleted else {
        return Ok(());
    };

    if app.options.dry_run {
        println!(
            "{} Dry run - would delete {} cluster {}",
            style("✓").green().bold(),
            cluster_type,
            style(name).cyan()
        );
    } else {
        println!(
            "{} Deleted {} cluster {}",
            style("✓").green().bold(),
            cluster_type,
            style(name).cyan()
        );
    }
    Ok(())
}

async fn delete(
    app: &App,
    name: &str,
    cluster_type: Option<ClusterType>,
    force: bool,
) -> Result<ClusterType> {
    let cluster_type = app.resolve_type(name, cluster_type).await?;
    println!(
        "{} Deleting {} cluster {}",
        style("→").blue().bold(),
        style(&cluster_type).yellow(),
        style(name).cyan()
    );
    app.manager
        .delete_cluster(&app.ctx, name, &cluster_type, force)
        .await?;
    Ok(cluster_type)
}
