//! List command - show clusters across providers

use kubeforge_core::ClusterType;

use super::App;
use crate::display;
use crate::error::Result;

/// Run the list command
///
/// Without `--type` every available provider is queried and a broken
/// backend only costs its own rows.
pub async fn run(
    app: &App,
    cluster_type: Option<ClusterType>,
    output_json: bool,
    quiet: bool,
) -> Result<()> {
    let clusters = match cluster_type {
        Some(cluster_type) => {
            app.require_provider(&cluster_type)?;
            app.manager.list_clusters_of(&app.ctx, &cluster_type).await?
        }
        None => app.manager.list_all_clusters(&app.ctx).await,
    };

    if app.ctx.is_cancelled() {
        return Err(crate::error::CliError::Cancelled);
    }

    if output_json {
        println!("{}", serde_json::to_string_pretty(&clusters)?);
        return Ok(());
    }

    if quiet {
        for cluster in &clusters {
            println!("{}", cluster.name);
        }
        return Ok(());
    }

    if clusters.is_empty() {
        println!("No clusters found");
        println!("  Run 'kubeforge create' to create one");
        return Ok(());
    }

    display::print_cluster_table(&clusters);
    Ok(())
}
