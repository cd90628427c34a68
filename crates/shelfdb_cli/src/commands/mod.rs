//! CLI command implementations.

pub mod compact;
pub mod delete;
pub mod dump_log;
pub mod inspect;
pub mod scan;
pub mod verify;

use shelfdb_core::wal::LogEntry;
use shelfdb_core::{Config, Database, Factory};
use shelfdb_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Command result.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Splits a database path into the factory root and the database name.
pub fn locate(path: &Path) -> CliResult<(Factory, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("not a database path: {}", path.display()))?
        .to_string();
    let root = path.parent().unwrap_or_else(|| Path::new("."));
    let config = Config::default().create_if_missing(false);
    Ok((Factory::new(root, config), name))
}

/// Opens an existing database at its persisted version.
pub fn open(path: &Path) -> CliResult<Database> {
    if !shelfdb_core::dir::is_database(path) {
        return Err(format!("No database found at {}", path.display()).into());
    }
    let (factory, name) = locate(path)?;
    let db = factory
        .open(&name, None)?
        .wait()
        .map_err(|e| e.to_string())?;
    tracing::debug!(name = %name, version = db.version(), "opened database");
    Ok(db)
}

/// One line of a log file as read from disk.
#[derive(Debug)]
pub struct LogLine {
    /// Byte offset of the line.
    pub offset: u64,
    /// 1-based line number.
    pub number: usize,
    /// The parsed entry, or why parsing failed.
    pub entry: Result<LogEntry, String>,
}

/// Reads the log at `<path>/wal.log` without locking or repairing it.
///
/// Returns the complete lines and the length of an unterminated tail.
pub fn read_log(path: &Path) -> CliResult<(Vec<LogLine>, u64)> {
    let wal_path = path.join("wal.log");
    if !wal_path.exists() {
        return Err(format!("Log file not found: {}", wal_path.display()).into());
    }
    let data = FileBackend::open(&wal_path)?.read_all()?;

    let complete = data.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    let mut lines = Vec::new();
    let mut offset = 0u64;
    for (index, line) in data[..complete].split(|&b| b == b'\n').enumerate() {
        let start = offset;
        offset += line.len() as u64 + 1;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        lines.push(LogLine {
            offset: start,
            number: index + 1,
            entry: LogEntry::parse_line(line).map_err(|e| e.to_string()),
        });
    }
    let tail = (data.len() - complete) as u64;
    tracing::debug!(lines = lines.len(), tail, "read log");
    Ok((lines, tail))
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn open_rejects_non_database() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(open(tmp.path()).is_err());
    }

    #[test]
    fn open_existing_database() {
        let (_tmp, path) = fixture::database();
        let db = open(&path).unwrap();
        assert_eq!(db.version(), 1);
        assert_eq!(db.object_store_names(), vec!["kv".to_string()]);
    }
}
