//! # ShelfDB Storage
//!
//! Append-only byte storage for the ShelfDB write-ahead log.
//!
//! A backend is an **opaque byte sink**: it appends, reads back, flushes and
//! can atomically swap its whole content for a new image. It knows nothing
//! about log lines, stores or keys; `shelfdb_core` owns the log format.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral databases and tests
//! - [`FileBackend`] - a single file on disk, rewritten via temp-file + rename
//!
//! ## Example
//!
//! ```rust
//! use shelfdb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"{\"op\":\"del\"}\n").unwrap();
//! backend.replace(b"").unwrap();
//! assert_eq!(backend.size().unwrap(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
