//! Dump-log command implementation.

use super::{read_log, CliResult};
use serde::Serialize;
use shelfdb_codec::decode_key;
use shelfdb_core::wal::LogEntry;
use std::path::Path;

/// Log entry representation for output.
#[derive(Debug, Serialize)]
pub struct LogEntryInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Line number.
    pub line: usize,
    /// `put`, `del`, `batch` or `invalid`.
    pub op: String,
    /// Store name (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    /// Decoded key (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Value size in bytes (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
    /// Entries grouped in a batch.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ops: Vec<LogEntryInfo>,
    /// Parse error for invalid lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the dump-log command.
pub fn run(path: &Path, limit: Option<usize>, store: Option<&str>, format: &str) -> CliResult<()> {
    let entries = collect(path, limit, store)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => print_text_output(&entries),
    }
    Ok(())
}

/// Reads the log and describes up to `limit` entries, optionally only
/// those touching `store`.
pub fn collect(
    path: &Path,
    limit: Option<usize>,
    store: Option<&str>,
) -> CliResult<Vec<LogEntryInfo>> {
    let (lines, _) = read_log(path)?;
    let max_entries = limit.unwrap_or(usize::MAX);

    let mut entries = Vec::new();
    for line in lines {
        if entries.len() >= max_entries {
            break;
        }
        let info = match line.entry {
            Ok(entry) => {
                if store.is_some_and(|s| !touches(&entry, s)) {
                    continue;
                }
                describe(&entry, line.offset, line.number)
            }
            Err(e) => LogEntryInfo {
                offset: line.offset,
                line: line.number,
                op: "invalid".to_string(),
                store: None,
                key: None,
                value_size: None,
                ops: Vec::new(),
                error: Some(e),
            },
        };
        entries.push(info);
    }
    Ok(entries)
}

fn touches(entry: &LogEntry, name: &str) -> bool {
    match entry {
        LogEntry::Put { store, .. } | LogEntry::Del { store, .. } => store == name,
        LogEntry::Batch { ops } => ops.iter().any(|op| touches(op, name)),
    }
}

fn describe(entry: &LogEntry, offset: u64, line: usize) -> LogEntryInfo {
    let mut info = LogEntryInfo {
        offset,
        line,
        op: String::new(),
        store: None,
        key: None,
        value_size: None,
        ops: Vec::new(),
        error: None,
    };
    match entry {
        LogEntry::Put { store, key, value } => {
            info.op = "put".to_string();
            info.store = Some(store.clone());
            info.key = Some(show_key(key));
            info.value_size = Some(value.len());
        }
        LogEntry::Del { store, key } => {
            info.op = "del".to_string();
            info.store = Some(store.clone());
            info.key = Some(show_key(key));
        }
        LogEntry::Batch { ops } => {
            info.op = "batch".to_string();
            info.ops = ops.iter().map(|op| describe(op, offset, line)).collect();
        }
    }
    info
}

fn show_key(bytes: &[u8]) -> String {
    decode_key(bytes).map_or_else(
        |_| format!("<raw {}>", shelfdb_codec::to_hex(bytes)),
        |key| key.to_string(),
    )
}

fn print_text_output(entries: &[LogEntryInfo]) {
    println!("{:>8}  {:>5}  {:<6}  {:<16}  KEY", "OFFSET", "LINE", "OP", "STORE");
    println!("{}", "-".repeat(60));
    for entry in entries {
        print_entry(entry, "");
    }
    println!();
    println!("Total: {} entries", entries.len());
}

fn print_entry(entry: &LogEntryInfo, indent: &str) {
    let detail = match (&entry.key, entry.value_size, &entry.error) {
        (_, _, Some(error)) => error.clone(),
        (Some(key), Some(size), _) => format!("{key} ({size} bytes)"),
        (Some(key), None, _) => key.clone(),
        _ => format!("{} ops", entry.ops.len()),
    };
    println!(
        "{:>8}  {:>5}  {indent}{:<6}  {:<16}  {detail}",
        entry.offset,
        entry.line,
        entry.op,
        entry.store.as_deref().unwrap_or("-"),
    );
    for op in &entry.ops {
        print_entry(op, "  ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixture;

    #[test]
    fn entries_carry_decoded_keys() {
        let (_tmp, path) = fixture::database();
        let entries = collect(&path, None, None).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].op, "put");
        assert_eq!(entries[0].store.as_deref(), Some("kv"));
        assert_eq!(entries[0].key.as_deref(), Some("1"));
        assert_eq!(entries[0].offset, 0);
        assert!(entries[1].offset > 0);
    }

    #[test]
    fn limit_and_store_filter() {
        let (_tmp, path) = fixture::database();
        assert_eq!(collect(&path, Some(2), None).unwrap().len(), 2);
        assert!(collect(&path, None, Some("other")).unwrap().is_empty());
    }
}
