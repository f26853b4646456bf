//! Recycle bin commands - list recycled items and restore them

use anyhow::Result;
use clap::Args;
use fsmgr_core::domain::{format_size, ItemId};
use tracing::info;

use super::Context;
use crate::output::item_json;

#[derive(Debug, Args)]
pub struct RestoreCommand {
    /// ID of the recycled item (see `fsmgr trash`)
    pub id: i64,
}

impl RestoreCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let (engine, actor) = ctx.open_engine().await?;
        info!(id = self.id, "Restoring recycled item");
        let item = engine.restore(&actor, ItemId::new(self.id)).await?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "item": item_json(&item),
            }));
        } else {
            formatter.success(&format!("Restored {}", item.canonical_path()));
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct TrashCommand {}

impl TrashCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let (engine, _) = ctx.open_engine().await?;
        let items = engine.recycle_bin().await?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "count": items.len(),
                "items": items.iter().map(item_json).collect::<Vec<_>>(),
            }));
            return Ok(());
        }

        if items.is_empty() {
            formatter.info("Recycle bin is empty.");
            return Ok(());
        }

        formatter.success(&format!("Recycle bin ({} items)", items.len()));
        formatter.info("");
        formatter.info("  ID     Deleted              Size       Original path");
        formatter.info("  ------ -------------------- ---------- -------------");
        for item in &items {
            formatter.info(&format!(
                "  {:<6} {:<20} {:<10} {}",
                item.id(),
                item.date_modified().format("%Y-%m-%d %H:%M:%S"),
                if item.is_folder() {
                    "<dir>".to_string()
                } else {
                    format_size(item.size())
                },
                item.canonical_path()
            ));
        }
        Ok(())
    }
}
