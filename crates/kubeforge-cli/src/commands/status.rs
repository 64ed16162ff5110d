//! Status command - show one cluster in detail

use super::{App, tolerate_not_found};
use crate::display;
use crate::error::Result;

/// Run the status command
pub async fn run(app: &App, name: &str, output_json: bool) -> Result<()> {
    let status = app.manager.get_cluster_status(&app.ctx, name).await;
    let Some(cluster) = tolerate_not_found(name, status.map_err(Into::into))? else {
        return Ok(());
    };

    if output_json {
        println!("{}", serde_json::to_string_pretty(&cluster)?);
    } else {
        display::print_cluster_details(&cluster);
    }
    Ok(())
}
