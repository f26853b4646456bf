//! Mkdir command - Create a directory under the managed root

use anyhow::{Context as _, Result};
use clap::Args;
use fsmgr_core::domain::CanonicalPath;
use tracing::info;

use super::Context;
use crate::output::{item_json, item_lines};

#[derive(Debug, Args)]
pub struct MkdirCommand {
    /// Path of the new directory, relative to the managed root
    pub path: String,
}

impl MkdirCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let target = CanonicalPath::parse(&ctx.path(&self.path)?)?;
        let parent = target
            .parent()
            .context("Cannot create the managed root itself")?;

        let (engine, actor) = ctx.open_engine().await?;
        info!(path = %target, "Creating directory");
        let item = engine
            .create_directory(&actor, parent.as_str(), target.name())
            .await?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "item": item_json(&item),
            }));
        } else {
            formatter.success(&format!("Created {}", item.canonical_path()));
            for line in item_lines(&item) {
                formatter.info(&line);
            }
        }
        Ok(())
    }
}
