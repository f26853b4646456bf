//! Info command - Describe a managed file or directory

use anyhow::Result;
use clap::Args;

use super::Context;

#[derive(Debug, Args)]
pub struct InfoCommand {
    /// Path relative to the managed root
    pub path: String,
}

impl InfoCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let path = ctx.path(&self.path)?;
        let (engine, _) = ctx.open_engine().await?;
        let info = engine.item_info(&path).await?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::to_value(&info)?);
            return Ok(());
        }

        let when = |t: Option<chrono::DateTime<chrono::Utc>>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Unknown".to_string())
        };

        formatter.success(&info.name);
        formatter.info(&format!("Location:    {}", info.location));
        formatter.info(&format!(
            "Type:        {}",
            if info.is_folder { "directory" } else { "file" }
        ));
        formatter.info(&format!("Size:        {}", info.size_display));
        formatter.info(&format!("Created:     {} by {}", when(info.created), info.created_by));
        formatter.info(&format!("Modified:    {} by {}", when(info.modified), info.modified_by));
        formatter.info(&format!("Issued by:   {}", info.issued_by));
        if let Some(expiry) = info.expiry_date {
            formatter.info(&format!("Expires:     {}", expiry.format("%Y-%m-%d")));
        }
        Ok(())
    }
}
