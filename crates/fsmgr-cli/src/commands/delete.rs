//! Delete and purge commands
//!
//! `delete` moves entries into the recycle bin; `purge` removes a recycled
//! entry for good.

use anyhow::Result;
use clap::Args;
use fsmgr_core::domain::ItemId;
use tracing::info;

use super::Context;
use crate::output::item_json;

#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Paths to move to the recycle bin
    #[arg(required = true)]
    pub paths: Vec<String>,
}

impl DeleteCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let paths = self
            .paths
            .iter()
            .map(|p| ctx.path(p))
            .collect::<Result<Vec<_>>>()?;

        let (engine, actor) = ctx.open_engine().await?;
        info!(count = paths.len(), "Moving to recycle bin");
        let outcomes = engine.soft_delete_many(&actor, &paths).await;

        let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
        if ctx.is_json() {
            let results: Vec<serde_json::Value> = outcomes
                .iter()
                .map(|(path, outcome)| match outcome {
                    Ok(item) => serde_json::json!({
                        "path": path,
                        "success": true,
                        "item": item_json(item),
                    }),
                    Err(e) => serde_json::json!({
                        "path": path,
                        "success": false,
                        "code": e.code(),
                        "error": e.to_string(),
                    }),
                })
                .collect();
            formatter.print_json(&serde_json::json!({
                "success": failed == 0,
                "results": results,
            }));
        } else {
            for (path, outcome) in &outcomes {
                match outcome {
                    Ok(item) => formatter.success(&format!(
                        "Deleted {} (id {})",
                        item.canonical_path(),
                        item.id()
                    )),
                    Err(e) => formatter.error(&format!("{}: {}", path, e)),
                }
            }
        }

        if failed > 0 {
            anyhow::bail!("{} of {} deletions failed", failed, outcomes.len());
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct PurgeCommand {
    /// ID of the recycled item (see `fsmgr trash`)
    pub id: i64,
}

impl PurgeCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let (engine, actor) = ctx.open_engine().await?;
        info!(id = self.id, "Purging recycled item");
        let item = engine.permanent_delete(&actor, ItemId::new(self.id)).await?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "removed": item_json(&item),
            }));
        } else {
            formatter.success(&format!("Permanently removed {}", item.canonical_path()));
        }
        Ok(())
    }
}
