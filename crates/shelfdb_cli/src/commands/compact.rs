//! Compact command implementation.

use super::{format_size, open, CliResult};
use shelfdb_core::CompactionReport;
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> CliResult<()> {
    println!("Compacting log at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let report = compact(path, dry_run)?;
    println!("  Live records: {}", report.live_records);
    println!("  Size before:  {} bytes", format_size(report.bytes_before));
    if dry_run {
        return Ok(());
    }
    println!("  Size after:   {} bytes", format_size(report.bytes_after));
    let saved = report.bytes_before.saturating_sub(report.bytes_after);
    println!(
        "  Space saved:  {} bytes ({:.1}%)",
        format_size(saved),
        if report.bytes_before > 0 {
            (saved as f64 / report.bytes_before as f64) * 100.0
        } else {
            0.0
        }
    );
    Ok(())
}

/// Compacts the log, or with `dry_run` only reports its current size.
pub fn compact(path: &Path, dry_run: bool) -> CliResult<CompactionReport> {
    let db = open(path)?;
    let report = if dry_run {
        let stats = db.stats()?;
        CompactionReport {
            bytes_before: stats.log_bytes,
            bytes_after: stats.log_bytes,
            live_records: stats.live_records,
        }
    } else {
        db.compact()?
    };
    db.close();
    Ok(report)
}
