//! Audit command - View audit log entries
//!
//! Shows either the full trail of one item (`fsmgr audit <ID>`) or recent
//! entries across all items, filtered by time and action.

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Args;
use fsmgr_core::domain::{AuditEntry, AuditResult, ItemId};
use tracing::info;

use super::Context;

#[derive(Debug, Args)]
pub struct AuditCommand {
    /// Show the full trail of this item instead of recent entries
    pub id: Option<i64>,

    /// Show entries since this time (e.g., "1h", "2d", "2024-01-01")
    #[arg(long)]
    pub since: Option<String>,

    /// Filter by action type (e.g., "rename", "soft_delete")
    #[arg(long)]
    pub action: Option<String>,

    /// Maximum number of entries to show
    #[arg(long, default_value = "50")]
    pub limit: u32,
}

impl AuditCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let (engine, _) = ctx.open_engine().await?;

        let (entries, since) = match self.id {
            Some(id) => {
                let entries = engine
                    .audit_trail(ItemId::new(id))
                    .await
                    .context("Failed to query audit trail")?;
                (entries, None)
            }
            None => {
                let since = match &self.since {
                    Some(since_str) => parse_since(since_str).with_context(|| {
                        format!("Invalid --since value: '{}'. Expected formats: '1h', '30m', '2d', '1w', '2024-01-01', '2024-01-01T12:00:00'", since_str)
                    })?,
                    None => Utc::now() - chrono::Duration::days(7),
                };
                info!(since = %since, "Filtering audit entries since");
                let entries = engine
                    .recent_audit(since, self.limit)
                    .await
                    .context("Failed to query audit entries")?;
                (entries, Some(since))
            }
        };

        let shown: Vec<&AuditEntry> = entries
            .iter()
            .filter(|entry| match &self.action {
                Some(action) => entry.action().as_str().contains(action.as_str()),
                None => true,
            })
            .collect();
        info!(count = shown.len(), "Retrieved audit entries");

        if ctx.is_json() {
            let entries_json: Vec<serde_json::Value> = shown
                .iter()
                .map(|entry| {
                    serde_json::json!({
                        "timestamp": entry.timestamp().to_rfc3339(),
                        "operation_id": entry.operation_id().map(|id| id.to_string()),
                        "action": entry.action().as_str(),
                        "item_id": entry.item_id(),
                        "actor": entry.actor(),
                        "result": entry.result(),
                        "details": entry.details(),
                        "duration_ms": entry.duration_ms(),
                    })
                })
                .collect();
            formatter.print_json(&serde_json::json!({
                "item_id": self.id,
                "since": since.map(|s| s.to_rfc3339()),
                "count": shown.len(),
                "entries": entries_json,
            }));
            return Ok(());
        }

        if shown.is_empty() {
            formatter.info("No audit entries found for the specified criteria.");
            return Ok(());
        }

        formatter.success(&format!("Audit Log ({} entries)", shown.len()));
        formatter.info("");
        formatter.info("  Timestamp           Action             Result          Actor      Details");
        formatter.info("  ------------------- ------------------ --------------- ---------- -------");

        for entry in &shown {
            formatter.info(&format!(
                "  {} {:<18} {:<15} {:<10} {}",
                entry.timestamp().format("%Y-%m-%d %H:%M:%S"),
                entry.action().as_str(),
                result_label(entry.result()),
                truncate_string(entry.actor().unwrap_or("-"), 10),
                format_details(entry.details())
            ));
        }

        if self.id.is_none() && entries.len() as u32 >= self.limit {
            formatter.info("");
            formatter.info(&format!(
                "Showing {} entries (limit). Use --limit to show more.",
                self.limit
            ));
        }

        Ok(())
    }
}

fn result_label(result: &AuditResult) -> String {
    match result {
        AuditResult::Success => "ok".to_string(),
        AuditResult::Failed { code, .. } => truncate_string(code, 15),
    }
}

/// Parse the --since argument into a DateTime<Utc>
///
/// Supports:
/// - Relative: "1h" (1 hour ago), "30m" (30 minutes), "2d" (2 days), "1w" (1 week)
/// - Absolute date: "2024-01-01"
/// - Absolute datetime: "2024-01-01T12:00:00"
fn parse_since(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Some(duration) = parse_relative_duration(input) {
        return Ok(Utc::now() - duration);
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let datetime = date
            .and_hms_opt(0, 0, 0)
            .context("Failed to create datetime from date")?;
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(datetime, Utc));
    }

    if let Ok(datetime) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(datetime, Utc));
    }

    anyhow::bail!(
        "Could not parse '{}' as a time. Use relative (1h, 30m, 2d, 1w) or absolute (2024-01-01) format.",
        input
    )
}

/// Parse relative duration strings like "1h", "30m", "2d", "1w"
fn parse_relative_duration(input: &str) -> Option<chrono::Duration> {
    if input.len() < 2 {
        return None;
    }

    let (num_str, unit) = input.split_at(input.len() - 1);
    let num: i64 = num_str.parse().ok()?;

    match unit {
        "m" => Some(chrono::Duration::minutes(num)),
        "h" => Some(chrono::Duration::hours(num)),
        "d" => Some(chrono::Duration::days(num)),
        "w" => Some(chrono::Duration::weeks(num)),
        _ => None,
    }
}

/// Short one-line summary of an entry's details
///
/// Moves show as `from -> to`; failures append their cause.
fn format_details(details: &serde_json::Value) -> String {
    let serde_json::Value::Object(map) = details else {
        return match details {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => truncate_string(s, 60),
            other => truncate_string(&other.to_string(), 60),
        };
    };

    let from = map.get("from").and_then(|v| v.as_str());
    let to = map.get("to").and_then(|v| v.as_str());
    let mut summary = match (from, to) {
        (Some(from), Some(to)) if from != to => format!(
            "{} -> {}",
            truncate_string(from, 30),
            truncate_string(to, 30)
        ),
        (_, Some(path)) | (Some(path), None) => truncate_string(path, 60),
        (None, None) => String::new(),
    };

    if let Some(cause) = map.get("cause").and_then(|v| v.as_str()) {
        if !summary.is_empty() {
            summary.push_str(": ");
        }
        summary.push_str(&truncate_string(cause, 40));
    }
    summary
}

/// Truncate a string to at most `max_len` characters
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
