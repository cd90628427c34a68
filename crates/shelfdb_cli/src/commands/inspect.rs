//! Inspect command implementation.

use super::{format_size, open, CliResult};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Persisted schema version.
    pub version: u32,
    /// Value encoding.
    pub value_format: String,
    /// Log file size in bytes.
    pub log_bytes: u64,
    /// Log entries applied on open.
    pub replayed_entries: usize,
    /// Malformed log lines skipped on open.
    pub skipped_entries: usize,
    /// Live records across all stores.
    pub live_records: usize,
    /// Per-store details.
    pub stores: Vec<StoreInfo>,
}

/// Details of one object store.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfo {
    /// Store name.
    pub name: String,
    /// Key path, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<serde_json::Value>,
    /// Whether keys are generated.
    pub auto_increment: bool,
    /// Number of records.
    pub records: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let result = inspect(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Collects the inspection result.
pub fn inspect(path: &Path) -> CliResult<InspectResult> {
    let db = open(path)?;
    let stats = db.stats()?;

    let mut stores = Vec::new();
    for name in db.object_store_names() {
        let store = db.store(&name)?;
        let records = store.count(None)?.wait().map_err(|e| e.to_string())?;
        stores.push(StoreInfo {
            key_path: store.key_path().map(serde_json::to_value).transpose()?,
            auto_increment: store.auto_increment(),
            records,
            name,
        });
    }

    let result = InspectResult {
        path: path.display().to_string(),
        version: db.version(),
        value_format: serde_json::to_value(db.value_format())?
            .as_str()
            .unwrap_or_default()
            .to_string(),
        log_bytes: stats.log_bytes,
        replayed_entries: stats.replayed_entries,
        skipped_entries: stats.skipped_entries,
        live_records: stats.live_records,
        stores,
    };
    db.close();
    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("ShelfDB Database Inspection");
    println!("===========================");
    println!();
    println!("Path:    {}", result.path);
    println!("Version: {}", result.version);
    println!("Values:  {}", result.value_format);
    println!();
    println!("Log:");
    println!("  Size:            {} bytes", format_size(result.log_bytes));
    println!("  Entries applied: {}", result.replayed_entries);
    println!("  Lines skipped:   {}", result.skipped_entries);
    println!("  Live records:    {}", result.live_records);
    println!();
    println!("Stores:");
    if result.stores.is_empty() {
        println!("  (none)");
    }
    for store in &result.stores {
        let key_path = store
            .key_path
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        println!(
            "  {} ({} records, keyPath {}, autoIncrement {})",
            store.name, store.records, key_path, store.auto_increment
        );
    }
}
