//! Upload command - Copy local files into a managed directory
//!
//! Files are uploaded in order. Without `--replace` the batch stops at the
//! first name that is already taken and reports a free alternative.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use fsmgr_sync::{BatchUpload, FileUpload};
use tracing::info;

use super::Context;
use crate::output::item_json;

#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Target directory, relative to the managed root
    pub dir: String,

    /// Local files to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Overwrite files that already exist in the target directory
    #[arg(long)]
    pub replace: bool,

    /// Issuer recorded on the uploaded items (defaults to the user)
    #[arg(long)]
    pub issued_by: Option<String>,

    /// Expiry date recorded on the uploaded items (e.g. "2025-12-31")
    #[arg(long)]
    pub expiry: Option<String>,
}

impl UploadCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let dir = ctx.path(&self.dir)?;
        let expiry = self.expiry.as_deref().map(parse_expiry).transpose()?;

        let mut uploads = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("Not a file name: {}", file.display()))?;
            let data = tokio::fs::read(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut upload = FileUpload::new(name, data);
            if let Some(issuer) = &self.issued_by {
                upload = upload.with_issued_by(issuer.clone());
            }
            if let Some(expiry) = expiry {
                upload = upload.with_expiry(expiry);
            }
            uploads.push(upload);
        }

        let (engine, actor) = ctx.open_engine().await?;
        info!(dir = %dir, count = uploads.len(), replace = self.replace, "Uploading files");

        let batch = if self.replace {
            let mut batch = BatchUpload::default();
            for upload in uploads {
                batch.uploaded.push(engine.replace(&actor, &dir, upload).await?);
            }
            batch
        } else {
            engine.upload_many(&actor, &dir, uploads).await?
        };

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": batch.conflict.is_none(),
                "uploaded": batch.uploaded.iter().map(item_json).collect::<Vec<_>>(),
                "conflict": batch.conflict,
            }));
        } else {
            for item in &batch.uploaded {
                formatter.success(&format!("Uploaded {}", item.canonical_path()));
            }
            if let Some(conflict) = &batch.conflict {
                formatter.error(&format!(
                    "'{}' already exists; {} file(s) not uploaded",
                    conflict.file_name,
                    self.files.len() - conflict.index
                ));
                if let Some(name) = &conflict.suggested_name {
                    formatter.info(&format!("Suggested name: {}", name));
                }
            }
        }

        if let Some(conflict) = batch.conflict {
            anyhow::bail!("Upload stopped at '{}'", conflict.file_name);
        }
        Ok(())
    }
}

/// Parse an expiry given as a date or an RFC 3339 timestamp
fn parse_expiry(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Invalid --expiry value: '{}'", input))?;
    let end_of_day = date
        .and_hms_opt(23, 59, 59)
        .context("Failed to create datetime from date")?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(end_of_day, Utc))
}
