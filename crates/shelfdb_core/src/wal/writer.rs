//! Log writer and replay.

use crate::error::CoreResult;
use crate::wal::record::LogEntry;
use shelfdb_storage::StorageBackend;

/// Outcome of replaying the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Lines applied.
    pub applied: usize,
    /// Complete lines that failed to parse and were skipped.
    pub skipped: usize,
    /// Bytes of an unterminated final line that were cut off.
    pub truncated_bytes: u64,
}

/// Appends log entries to a storage backend and replays them.
pub struct WalLog {
    backend: Box<dyn StorageBackend>,
    sync_on_write: bool,
}

impl WalLog {
    /// Creates a log over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> Self {
        Self {
            backend,
            sync_on_write,
        }
    }

    /// Appends one entry as a single line.
    ///
    /// The line is flushed (or synced, with `sync_on_write`) before this
    /// returns. Returns the offset where the line starts.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or I/O fails.
    pub fn append(&mut self, entry: &LogEntry) -> CoreResult<u64> {
        let line = entry.encode_line()?;
        let offset = self.backend.append(&line)?;
        if self.sync_on_write {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }
        Ok(offset)
    }

    /// Reads the whole log and hands each entry to `apply` in order.
    ///
    /// A complete line that does not parse is skipped with a warning. A
    /// final line without a newline is the remains of an interrupted
    /// append: it is dropped and the backend truncated to the last complete
    /// line so later appends start on a fresh line.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or truncating the backend fails.
    pub fn replay<F>(&mut self, mut apply: F) -> CoreResult<ReplayReport>
    where
        F: FnMut(LogEntry),
    {
        let data = self.backend.read_all()?;
        let mut report = ReplayReport::default();

        let complete = data.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        for (index, line) in data[..complete].split(|&b| b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match LogEntry::parse_line(line) {
                Ok(entry) => {
                    apply(entry);
                    report.applied += 1;
                }
                Err(e) => {
                    tracing::warn!(line = index + 1, error = %e, "skipping malformed log line");
                    report.skipped += 1;
                }
            }
        }

        if complete < data.len() {
            report.truncated_bytes = (data.len() - complete) as u64;
            tracing::warn!(
                bytes = report.truncated_bytes,
                "dropping unterminated log tail"
            );
            self.backend.truncate(complete as u64)?;
        }

        Ok(report)
    }

    /// Replaces the entire log with `entries`, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend rewrite fails. The old
    /// log is left intact on failure.
    pub fn rewrite<'a, I>(&mut self, entries: I) -> CoreResult<u64>
    where
        I: IntoIterator<Item = &'a LogEntry>,
    {
        let mut data = Vec::new();
        for entry in entries {
            data.extend_from_slice(&entry.encode_line()?);
        }
        self.backend.replace(&data)?;
        Ok(data.len() as u64)
    }

    /// Returns the current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Syncs appended data to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        Ok(self.backend.sync()?)
    }
}

impl std::fmt::Debug for WalLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalLog")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}
