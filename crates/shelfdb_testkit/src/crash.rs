//! Crash simulation for log recovery tests.
//!
//! [`CrashableBackend`] is an in-memory storage backend that can be told to
//! stop mid-append, leaving only a prefix of the bytes behind, or to fail
//! log rewrites. Its bytes live in shared state, so after handing the
//! backend to the engine a test keeps a [`CrashHandle`] to arm crashes and
//! to take the surviving image for a restart.
//!
//! ## Usage
//!
//! ```rust
//! use shelfdb_core::WalBackend;
//! use shelfdb_testkit::crash::CrashableBackend;
//!
//! let (backend, handle) = CrashableBackend::new();
//! let mut wal = WalBackend::open(Box::new(backend), false).unwrap();
//! wal.put("s", vec![1], vec![2]).unwrap();
//!
//! handle.crash_after(5);
//! assert!(wal.put("s", vec![3], vec![4]).is_err());
//!
//! let recovered = WalBackend::open(Box::new(handle.restart()), false).unwrap();
//! assert_eq!(recovered.len("s"), 1);
//! ```

use parking_lot::Mutex;
use shelfdb_storage::{StorageBackend, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Shared {
    data: Mutex<Vec<u8>>,
    crash_after_bytes: AtomicUsize,
    crashed: AtomicBool,
    fail_on_replace: AtomicBool,
    detach_on_replace: AtomicBool,
    fail_on_sync: AtomicBool,
}

/// A storage backend wrapper that can simulate crashes.
#[derive(Debug)]
pub struct CrashableBackend {
    shared: Arc<Shared>,
}

/// Controls a [`CrashableBackend`] after it has been handed out.
#[derive(Debug, Clone)]
pub struct CrashHandle {
    shared: Arc<Shared>,
}

impl CrashableBackend {
    /// Creates an empty backend and its handle.
    pub fn new() -> (Self, CrashHandle) {
        Self::with_data(Vec::new())
    }

    /// Creates a backend holding `data` and its handle.
    pub fn with_data(data: Vec<u8>) -> (Self, CrashHandle) {
        let shared = Arc::new(Shared {
            data: Mutex::new(data),
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            crashed: AtomicBool::new(false),
            fail_on_replace: AtomicBool::new(false),
            detach_on_replace: AtomicBool::new(false),
            fail_on_sync: AtomicBool::new(false),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            CrashHandle { shared },
        )
    }

    fn check_alive(&self) -> StorageResult<()> {
        if self.shared.crashed.load(Ordering::SeqCst) {
            return Err(simulated("backend has crashed"));
        }
        Ok(())
    }
}

impl CrashHandle {
    /// Lets `bytes` more bytes through, then cuts the append that crosses
    /// the limit short and fails every later call.
    pub fn crash_after(&self, bytes: usize) {
        self.shared.crash_after_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Sets whether log rewrites fail, leaving the old content in place.
    pub fn set_fail_on_replace(&self, fail: bool) {
        self.shared.fail_on_replace.store(fail, Ordering::SeqCst);
    }

    /// Sets whether a rewrite puts the new content in place and then fails,
    /// as a file backend does when it cannot reopen the renamed file. The
    /// backend counts as crashed afterwards.
    pub fn set_detach_on_replace(&self, detach: bool) {
        self.shared.detach_on_replace.store(detach, Ordering::SeqCst);
    }

    /// Sets whether `sync` fails.
    pub fn set_fail_on_sync(&self, fail: bool) {
        self.shared.fail_on_sync.store(fail, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.shared.crashed.load(Ordering::SeqCst)
    }

    /// A copy of the bytes written so far.
    pub fn data(&self) -> Vec<u8> {
        self.shared.data.lock().clone()
    }

    /// A fresh, healthy backend holding the surviving bytes, as seen by the
    /// next process.
    pub fn restart(&self) -> CrashableBackend {
        CrashableBackend::with_data(self.data()).0
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.shared.data.lock();
        let size = data.len() as u64;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = start.saturating_add(len);
        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.check_alive()?;
        let mut data = self.shared.data.lock();
        let offset = data.len() as u64;
        let budget = self.shared.crash_after_bytes.load(Ordering::SeqCst);

        if bytes.len() > budget {
            data.extend_from_slice(&bytes[..budget]);
            self.shared.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("simulated crash during partial write"));
        }

        if budget != usize::MAX {
            self.shared
                .crash_after_bytes
                .store(budget - bytes.len(), Ordering::SeqCst);
        }
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_alive()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_alive()?;
        if self.shared.fail_on_sync.load(Ordering::SeqCst) {
            return Err(simulated("simulated failure during sync"));
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.shared.data.lock().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check_alive()?;
        let mut data = self.shared.data.lock();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(usize::try_from(new_size).unwrap_or(usize::MAX));
        Ok(())
    }

    fn replace(&mut self, new_data: &[u8]) -> StorageResult<()> {
        self.check_alive()?;
        if self.shared.fail_on_replace.load(Ordering::SeqCst) {
            return Err(simulated("simulated failure during rewrite"));
        }
        *self.shared.data.lock() = new_data.to_vec();
        if self.shared.detach_on_replace.load(Ordering::SeqCst) {
            self.shared.crashed.store(true, Ordering::SeqCst);
            return Err(simulated("simulated lost handle after rewrite"));
        }
        Ok(())
    }
}

fn simulated(message: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, message.to_string()))
}
