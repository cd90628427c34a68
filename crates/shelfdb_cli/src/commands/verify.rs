//! Verify command implementation.

use super::{read_log, CliResult};
use shelfdb_codec::decode_key;
use shelfdb_core::wal::LogEntry;
use shelfdb_core::Schema;
use std::fs;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of log lines checked.
    pub lines_checked: usize,
    /// Number of lines that parsed and carry decodable keys.
    pub valid_lines: usize,
    /// Number of lines replay would skip.
    pub corrupt_lines: usize,
    /// Bytes of an unterminated final line.
    pub torn_tail: u64,
    /// List of errors found.
    pub errors: Vec<String>,
    /// Findings that do not affect recovery.
    pub warnings: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.corrupt_lines == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying database at {}", path.display());
    println!();

    let result = verify(path)?;
    println!(
        "  Log lines checked: {}, valid: {}, corrupt: {}",
        result.lines_checked, result.valid_lines, result.corrupt_lines
    );
    if result.torn_tail > 0 {
        println!("  Unterminated tail: {} bytes", result.torn_tail);
    }
    for warning in &result.warnings {
        println!("    WARNING: {warning}");
    }
    for error in &result.errors {
        println!("    ERROR: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Database verification passed");
        Ok(())
    } else {
        println!("✗ Database verification failed");
        Err("Verification failed".into())
    }
}

/// Checks the sidecars and every log line.
pub fn verify(path: &Path) -> CliResult<VerifyResult> {
    let mut result = VerifyResult::default();

    if let Err(e) = shelfdb_core::dir::read_version(path) {
        result.errors.push(e.to_string());
    }

    let schema = match fs::read(path.join("schema.json")) {
        Ok(data) => match Schema::from_json_bytes(&data) {
            Ok(schema) => Some(schema),
            Err(e) => {
                result.errors.push(e.to_string());
                None
            }
        },
        Err(_) => None,
    };

    let (lines, torn_tail) = read_log(path)?;
    result.torn_tail = torn_tail;
    if torn_tail > 0 {
        result.warnings.push(format!(
            "{torn_tail} bytes after the last newline will be dropped on open"
        ));
    }

    for line in lines {
        result.lines_checked += 1;
        let entry = match line.entry {
            Ok(entry) => entry,
            Err(e) => {
                result.corrupt_lines += 1;
                result
                    .errors
                    .push(format!("line {} (offset {}): {e}", line.number, line.offset));
                continue;
            }
        };

        let mut line_ok = true;
        for (store, key) in primitive_ops(&entry) {
            if let Err(e) = decode_key(key) {
                line_ok = false;
                result
                    .errors
                    .push(format!("line {}: undecodable key: {e}", line.number));
            }
            if let Some(schema) = &schema {
                if !schema.contains(store) {
                    result.warnings.push(format!(
                        "line {}: store {store:?} is not in the schema",
                        line.number
                    ));
                }
            }
        }
        if line_ok {
            result.valid_lines += 1;
        } else {
            result.corrupt_lines += 1;
        }
    }

    Ok(result)
}

fn primitive_ops(entry: &LogEntry) -> Vec<(&str, &[u8])> {
    match entry {
        LogEntry::Put { store, key, .. } | LogEntry::Del { store, key } => {
            vec![(store.as_str(), key.as_slice())]
        }
        LogEntry::Batch { ops } => ops.iter().flat_map(primitive_ops).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixture;
    use std::io::Write;

    #[test]
    fn clean_database_passes() {
        let (_tmp, path) = fixture::database();
        let result = verify(&path).unwrap();
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.lines_checked, 3);
        assert_eq!(result.valid_lines, 3);
    }

    #[test]
    fn garbage_line_and_torn_tail_are_reported() {
        let (_tmp, path) = fixture::database();
        let mut log = fs::OpenOptions::new()
            .append(true)
            .open(path.join("wal.log"))
            .unwrap();
        log.write_all(b"not json\n{\"op\":\"put\"").unwrap();
        drop(log);

        let result = verify(&path).unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.corrupt_lines, 1);
        assert_eq!(result.torn_tail, 12);
    }
}
