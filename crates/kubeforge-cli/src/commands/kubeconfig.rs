//! Kubeconfig command - print a cluster's kubeconfig to stdout

use kubeforge_core::ClusterType;

use super::{App, tolerate_not_found};
use crate::error::Result;

/// Run the kubeconfig command
pub async fn run(app: &App, name: &str, cluster_type: Option<ClusterType>) -> Result<()> {
    if let Some(kubeconfig) = tolerate_not_found(name, kubeconfig(app, name, cluster_type).await)? {
        print!("{}", kubeconfig);
        if !kubeconfig.ends_with('\n') && !kubeconfig.is_empty() {
            println!();
        }
    }
    Ok(())
}

async fn kubeconfig(app: &App, name: &str, cluster_type: Option<ClusterType>) -> Result<String> {
    let cluster_type = app.resolve_type(name, cluster_type).await?;
    Ok(app.manager.get_kubeconfig(&app.ctx, name, &cluster_type).await?)
}
