//! Rename command - Give a file or directory a new name in place

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::Context;
use crate::output::item_json;

#[derive(Debug, Args)]
pub struct RenameCommand {
    /// Current path, relative to the managed root
    pub path: String,

    /// New name (a single segment; a file keeps its extension)
    pub new_name: String,
}

impl RenameCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let path = ctx.path(&self.path)?;
        let new_name = ctx.name(&self.new_name)?;

        let (engine, actor) = ctx.open_engine().await?;
        info!(path = %path, new_name = %new_name, "Renaming");
        let item = engine.rename(&actor, &path, &new_name).await?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "item": item_json(&item),
            }));
        } else {
            formatter.success(&format!("Renamed to {}", item.canonical_path()));
            if item.name() != new_name {
                formatter.info(&format!("Extension kept: {}", item.name()));
            }
        }
        Ok(())
    }
}
