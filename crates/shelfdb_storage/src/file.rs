//! Single-file storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Suffix of the scratch file used by [`FileBackend::replace`].
const REWRITE_SUFFIX: &str = "tmp";

/// A storage backend over one file.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()`
/// - `replace()` writes `<file>.tmp`, syncs it, renames it over the original,
///   reopens the handle on the new file and syncs the parent directory. If
///   the reopen fails the backend is detached and every later call fails,
///   so nothing is written to the unlinked old file.
///
/// # Example
///
/// ```no_run
/// use shelfdb_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("wal.log")).unwrap();
/// backend.append(b"{\"op\":\"del\",\"store\":\"kv\",\"key\":\"10\"}\n").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
    detached: bool,
}

impl FileBackend {
    /// Opens or creates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = Self::open_file(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
            detached: false,
        })
    }

    /// Opens or creates the file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the scratch file a rewrite goes through.
    #[must_use]
    pub fn rewrite_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(REWRITE_SUFFIX);
        self.path.with_file_name(name)
    }

    fn open_file(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
    }

    fn write_scratch(&self, data: &[u8]) -> io::Result<PathBuf> {
        let scratch = self.rewrite_path();
        let mut file = File::create(&scratch)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(scratch)
    }

    fn check_attached(&self) -> StorageResult<()> {
        if self.detached {
            return Err(StorageError::Detached {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    /// Points the backend at the file just renamed into place.
    fn adopt(&mut self, reopened: io::Result<File>, len: u64) -> StorageResult<()> {
        match reopened {
            Ok(file) => {
                *self.file.write() = file;
                *self.size.write() = len;
                Ok(())
            }
            Err(source) => {
                self.detached = true;
                tracing::error!(path = %self.path.display(), error = %source, "log replaced but not reopened");
                Err(StorageError::RewriteFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    #[cfg(unix)]
    fn sync_parent(&self) -> io::Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
            _ => Ok(()),
        }
    }

    #[cfg(not(unix))]
    fn sync_parent(&self) -> io::Result<()> {
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.check_attached()?;
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.check_attached()?;
        if data.is_empty() {
            return Ok(*self.size.read());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        let offset = *size;
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        *size += data.len() as u64;

        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_attached()?;
        self.file.write().flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_attached()?;
        self.file.write().sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_attached()?;
        let file = self.file.write();
        let mut size = self.size.write();

        if new_size > *size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size: *size,
            });
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;

        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.check_attached()?;
        let path = self.path.clone();
        let fail = |source| StorageError::RewriteFailed {
            path: path.clone(),
            source,
        };

        let scratch = match self.write_scratch(data) {
            Ok(scratch) => scratch,
            Err(err) => {
                let _ = fs::remove_file(self.rewrite_path());
                return Err(fail(err));
            }
        };

        if let Err(err) = fs::rename(&scratch, &self.path) {
            let _ = fs::remove_file(&scratch);
            return Err(fail(err));
        }

        // The old handle points at the unlinked inode from here on.
        self.adopt(Self::open_file(&self.path), data.len() as u64)?;
        self.sync_parent().map_err(fail)?;

        tracing::debug!(path = %self.path.display(), bytes = data.len(), "replaced log image");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn appends_are_contiguous() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("wal.log")).unwrap();

        assert_eq!(backend.append(b"line one\n").unwrap(), 0);
        assert_eq!(backend.append(b"line two\n").unwrap(), 9);
        assert_eq!(backend.read_all().unwrap(), b"line one\nline two\n");
        assert_eq!(backend.read_at(9, 4).unwrap(), b"line");
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("wal.log")).unwrap();
        backend.append(b"short").unwrap();

        let result = backend.read_at(3, 10);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn content_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"durable\n").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"durable\n");
    }

    #[test]
    fn truncate_drops_tail() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("wal.log")).unwrap();
        backend.append(b"complete\npartial").unwrap();

        backend.truncate(9).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"complete\n");

        let result = backend.truncate(100);
        assert!(matches!(result, Err(StorageError::TruncatePastEnd { .. })));
    }

    #[test]
    fn replace_swaps_content_and_keeps_appending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"old old old\n").unwrap();

        backend.replace(b"new\n").unwrap();
        assert_eq!(backend.size().unwrap(), 4);
        assert!(!backend.rewrite_path().exists());

        backend.append(b"more\n").unwrap();
        drop(backend);

        assert_eq!(fs::read(&path).unwrap(), b"new\nmore\n");
    }

    #[test]
    fn lost_handle_after_rename_detaches() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"old\n").unwrap();
        fs::write(&path, b"new\n").unwrap();

        let lost = io::Error::new(io::ErrorKind::Other, "too many open files");
        let result = backend.adopt(Err(lost), 4);
        assert!(matches!(result, Err(StorageError::RewriteFailed { .. })));

        assert!(matches!(
            backend.append(b"lost\n"),
            Err(StorageError::Detached { .. })
        ));
        assert!(backend.sync().is_err());
        assert!(backend.read_all().is_err());
        assert!(backend.replace(b"again\n").is_err());
        assert_eq!(fs::read(&path).unwrap(), b"new\n");
    }

    #[test]
    fn adopted_handle_appends_to_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"old old\n").unwrap();
        fs::write(&path, b"new\n").unwrap();

        backend.adopt(FileBackend::open_file(&path), 4).unwrap();
        backend.append(b"more\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new\nmore\n");
    }

    #[test]
    fn rewrite_path_sits_next_to_file() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("wal.log")).unwrap();
        assert_eq!(backend.rewrite_path(), dir.path().join("wal.log.tmp"));
    }

    #[test]
    fn create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("db").join("wal.log");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.path(), path);
        assert!(path.exists());
    }
}
