//! Database directory management.
//!
//! Each database lives in its own directory under the factory root:
//!
//! ```text
//! <root>/<name>/
//! ├─ LOCK          # Advisory lock for single-writer
//! ├─ wal.log       # Append-only operation log
//! ├─ schema.json   # Object store definitions
//! └─ version       # Schema version, decimal text
//! ```
//!
//! The LOCK file ensures only one handle writes to a database at a time.
//! Sidecars are replaced atomically with write-then-rename.

use crate::error::{CoreError, CoreResult};
use crate::schema::Schema;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const WAL_FILE: &str = "wal.log";
const WAL_SCRATCH: &str = "wal.log.tmp";
const SCHEMA_FILE: &str = "schema.json";
const VERSION_FILE: &str = "version";

/// Manages one database directory and holds its exclusive lock.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory and locks it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another handle holds the lock (returns `DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = lock(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the log file.
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.path.join(WAL_FILE)
    }

    /// Returns the path to the schema sidecar.
    #[must_use]
    pub fn schema_path(&self) -> PathBuf {
        self.path.join(SCHEMA_FILE)
    }

    /// Returns the path to the version sidecar.
    #[must_use]
    pub fn version_path(&self) -> PathBuf {
        self.path.join(VERSION_FILE)
    }

    /// Loads the schema, or `None` for a database that never upgraded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_schema(&self) -> CoreResult<Option<Schema>> {
        match read_optional(&self.schema_path())? {
            Some(data) if !data.is_empty() => Ok(Some(Schema::from_json_bytes(&data)?)),
            _ => Ok(None),
        }
    }

    /// Saves the schema atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn save_schema(&self, schema: &Schema) -> CoreResult<()> {
        self.write_atomic(SCHEMA_FILE, &schema.to_json_bytes()?)
    }

    /// Loads the persisted version, `0` if none was ever written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but does not hold an integer.
    pub fn load_version(&self) -> CoreResult<u32> {
        read_version(&self.path)
    }

    /// Saves the version atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if any file operation fails.
    pub fn save_version(&self, version: u32) -> CoreResult<()> {
        self.write_atomic(VERSION_FILE, version.to_string().as_bytes())
    }

    /// Write to `<file>.tmp`, sync, rename over `<file>`, sync the directory.
    fn write_atomic(&self, file_name: &str, data: &[u8]) -> CoreResult<()> {
        let target = self.path.join(file_name);
        let temp = self.path.join(format!("{file_name}.tmp"));

        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &target)?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Reads the version sidecar of the database at `path` without locking it.
///
/// # Errors
///
/// Returns an error if the file exists but does not hold an integer.
pub fn read_version(path: &Path) -> CoreResult<u32> {
    match read_optional(&path.join(VERSION_FILE))? {
        None => Ok(0),
        Some(data) => {
            let text = String::from_utf8_lossy(&data);
            text.trim().parse().map_err(|_| {
                CoreError::invalid_format(format!("version file holds {:?}", text.trim()))
            })
        }
    }
}

/// Whether `path` looks like a database directory.
#[must_use]
pub fn is_database(path: &Path) -> bool {
    path.join(VERSION_FILE).is_file() || path.join(WAL_FILE).is_file()
}

/// Removes every file of the database at `path`, then the directory if it
/// is left empty. Missing databases are not an error.
///
/// Returns whether anything was removed.
///
/// # Errors
///
/// Returns `DatabaseLocked` if another handle holds the lock, or an I/O
/// error if removal fails.
pub fn remove_database(path: &Path) -> CoreResult<bool> {
    if !path.is_dir() {
        return Ok(false);
    }

    let lock_file = lock(path)?;
    for name in [
        WAL_FILE,
        WAL_SCRATCH,
        SCHEMA_FILE,
        "schema.json.tmp",
        VERSION_FILE,
        "version.tmp",
    ] {
        remove_if_exists(&path.join(name))?;
    }
    drop(lock_file);
    remove_if_exists(&path.join(LOCK_FILE))?;

    match fs::remove_dir(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "database directory not removed");
        }
    }
    Ok(true)
}

fn lock(path: &Path) -> CoreResult<File> {
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path.join(LOCK_FILE))?;

    if lock_file.try_lock_exclusive().is_err() {
        return Err(CoreError::DatabaseLocked);
    }
    Ok(lock_file)
}

fn read_optional(path: &Path) -> CoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_exists(path: &Path) -> CoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{StoreParams, StoreSchema};
    use crate::value::ValueFormat;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("new_db");

        let dir = DatabaseDir::open(&db_path, true).unwrap();
        assert!(db_path.is_dir());
        assert_eq!(dir.path(), db_path);
    }

    #[test]
    fn open_fails_if_not_exists_and_no_create() {
        let temp = tempdir().unwrap();
        let result = DatabaseDir::open(&temp.path().join("nonexistent"), false);
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("locked_db");

        let _dir1 = DatabaseDir::open(&db_path, true).unwrap();
        let result = DatabaseDir::open(&db_path, true);
        assert!(matches!(result, Err(CoreError::DatabaseLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("reopen_db");

        {
            let _dir = DatabaseDir::open(&db_path, true).unwrap();
        }
        let _dir2 = DatabaseDir::open(&db_path, true).unwrap();
    }

    #[test]
    fn sidecars_round_trip() {
        let temp = tempdir().unwrap();
        let dir = DatabaseDir::open(&temp.path().join("db"), true).unwrap();

        assert!(dir.load_schema().unwrap().is_none());
        assert_eq!(dir.load_version().unwrap(), 0);

        let mut schema = Schema::new(ValueFormat::Json);
        schema
            .add(StoreSchema::new("kv", StoreParams::new()).unwrap())
            .unwrap();
        dir.save_schema(&schema).unwrap();
        dir.save_version(3).unwrap();

        assert_eq!(dir.load_schema().unwrap(), Some(schema));
        assert_eq!(dir.load_version().unwrap(), 3);
        assert!(!dir.path().join("version.tmp").exists());
    }

    #[test]
    fn garbage_version_is_invalid_format() {
        let temp = tempdir().unwrap();
        let dir = DatabaseDir::open(&temp.path().join("db"), true).unwrap();
        fs::write(dir.version_path(), "three").unwrap();
        assert!(matches!(
            dir.load_version(),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn paths_are_correct() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("paths_db");
        let dir = DatabaseDir::open(&db_path, true).unwrap();

        assert_eq!(dir.wal_path(), db_path.join("wal.log"));
        assert_eq!(dir.schema_path(), db_path.join("schema.json"));
        assert_eq!(dir.version_path(), db_path.join("version"));
    }

    #[test]
    fn remove_database_is_idempotent() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("doomed");
        {
            let dir = DatabaseDir::open(&db_path, true).unwrap();
            dir.save_version(1).unwrap();
            fs::write(dir.wal_path(), b"{}\n").unwrap();
        }
        assert!(is_database(&db_path));
        assert!(remove_database(&db_path).unwrap());
        assert!(!db_path.exists());
        assert!(!remove_database(&db_path).unwrap());
    }

    #[test]
    fn remove_database_refuses_locked() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("busy");
        let _dir = DatabaseDir::open(&db_path, true).unwrap();
        assert!(matches!(
            remove_database(&db_path),
            Err(CoreError::DatabaseLocked)
        ));
    }
}
