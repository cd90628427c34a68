//! Scan command implementation.

use super::{open, CliResult};
use serde_json::Value as Json;
use shelfdb_core::{Direction, Key};
use std::path::Path;

/// Runs the scan command.
pub fn run(path: &Path, store: &str, limit: Option<usize>, reverse: bool) -> CliResult<()> {
    let records = scan(path, store, limit, reverse)?;
    for (key, value) in &records {
        println!("{key}\t{value}");
    }
    println!();
    println!("Total: {} records", records.len());
    Ok(())
}

/// Reads up to `limit` records of `store` by walking a cursor.
pub fn scan(
    path: &Path,
    store: &str,
    limit: Option<usize>,
    reverse: bool,
) -> CliResult<Vec<(Key, Json)>> {
    let db = open(path)?;
    let direction = if reverse {
        Direction::Prev
    } else {
        Direction::Next
    };
    let max_records = limit.unwrap_or(usize::MAX);

    let request = db.store(store)?.open_cursor(None, direction)?;
    let mut records = Vec::new();
    let mut current = request.wait().map_err(|e| e.to_string())?;
    while let Some(cursor) = current {
        if records.len() >= max_records {
            break;
        }
        if let (Some(key), Some(value)) = (cursor.key(), cursor.value::<Json>()?) {
            records.push((key, value));
        }
        cursor.continue_(None)?;
        current = request.wait().map_err(|e| e.to_string())?;
    }
    db.close();
    Ok(records)
}
