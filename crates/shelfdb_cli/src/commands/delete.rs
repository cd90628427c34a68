//! Delete command implementation.

use super::{locate, CliResult};
use std::path::Path;

/// Runs the delete command.
pub fn run(path: &Path) -> CliResult<()> {
    if delete(path)? {
        println!("Deleted database at {}", path.display());
    } else {
        println!("No database at {}", path.display());
    }
    Ok(())
}

/// Removes the database at `path`. Returns whether one existed.
pub fn delete(path: &Path) -> CliResult<bool> {
    let existed = shelfdb_core::dir::is_database(path);
    let (factory, name) = locate(path)?;
    factory
        .delete_database(&name)?
        .wait()
        .map_err(|e| e.to_string())?;
    Ok(existed)
}
