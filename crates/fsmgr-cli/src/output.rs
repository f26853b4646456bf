use fsmgr_core::domain::{format_size, Item};
use fsmgr_sync::SyncError;
use serde_json::{json, Value};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &Value);
    fn is_json(&self) -> bool;
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &Value) {}
    fn is_json(&self) -> bool {
        false
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", json!({"success": true, "message": message}));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", json!({"success": false, "error": message}));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", json!({"level": "warning", "message": message}));
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
    fn is_json(&self) -> bool {
        true
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

/// Serialized item for JSON output
pub fn item_json(item: &Item) -> Value {
    serde_json::to_value(item).unwrap_or_default()
}

/// Indented detail lines for one item
pub fn item_lines(item: &Item) -> Vec<String> {
    let mut lines = vec![
        format!("ID:        {}", item.id()),
        format!("Path:      {}", item.canonical_path()),
        format!(
            "Type:      {}",
            if item.is_folder() { "directory" } else { "file" }
        ),
        format!("Size:      {}", format_size(item.size())),
        format!("Owner:     {}", item.owner()),
        format!(
            "Modified:  {} by {}",
            item.date_modified().format("%Y-%m-%d %H:%M:%S"),
            item.modified_by()
        ),
    ];
    if let Some(deleted_path) = item.deleted_path() {
        lines.push(format!("In bin at: {}", deleted_path.display()));
    }
    lines
}

/// Print a failed command to stderr, with the machine code and suggested
/// name when the failure came from the engine.
pub fn report_error(formatter: &dyn OutputFormatter, err: &anyhow::Error) {
    let sync_error = err.downcast_ref::<SyncError>();
    let suggested = match sync_error {
        Some(SyncError::Conflict { suggested_name, .. }) => suggested_name.clone(),
        _ => None,
    };

    if formatter.is_json() {
        eprintln!(
            "{}",
            json!({
                "success": false,
                "code": sync_error.map(SyncError::code),
                "error": format!("{:#}", err),
                "suggested_name": suggested,
            })
        );
        return;
    }

    formatter.error(&format!("{:#}", err));
    if let Some(name) = suggested {
        formatter.info(&format!("Suggested name: {}", name));
    }
    if let Some(SyncError::RollbackFailed { operation, .. }) = sync_error {
        formatter.warn(&format!(
            "Files and metadata disagree after operation {}; manual reconciliation needed",
            operation
        ));
    }
}

#[cfg(test)]
mod tests {
    use fsmgr_core::domain::{Actor, CanonicalPath, ItemId, NewItem};

    use super::*;

    fn sample() -> Item {
        let actor = Actor::new("alice").unwrap();
        NewItem::file(CanonicalPath::parse("docs/a.txt").unwrap(), 2048, &actor)
            .into_item(ItemId::new(7))
            .unwrap()
    }

    #[test]
    fn test_item_lines_show_path_and_size() {
        let lines = item_lines(&sample());
        assert!(lines.iter().any(|l| l.contains("/docs/a.txt")));
        assert!(lines.iter().any(|l| l.contains("2.00 KB")));
        assert!(!lines.iter().any(|l| l.starts_with("In bin")));
    }

    #[test]
    fn test_item_json_has_id() {
        let value = item_json(&sample());
        assert!(value.is_object());
        assert_eq!(value["owner"], "alice");
    }
}
