//! # ShelfDB Core
//!
//! Embedded, durable, ordered key-value engine with an object-store API.
//!
//! This crate provides:
//! - An append-only JSON-lines write-ahead log, replayed on open and
//!   compacted on demand
//! - Named object stores holding values in key order, with optional
//!   in-line key paths and generated keys
//! - Transactions that queue writes and commit them as one atomic batch
//! - Range queries and cursors over a snapshot of a store
//! - Schema versioning with upgrade handlers
//!
//! Everything runs on one thread. Operations return a [`Request`] whose
//! result is delivered by the [`Scheduler`] on a later tick, in the order
//! the operations were made.
//!
//! ## Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use shelfdb_core::{Config, Factory, Key, StoreParams};
//!
//! let factory = Factory::new("data", Config::default());
//! let open = factory.open("app", Some(1))?;
//! open.on_upgrade_needed(|db, _txn, _event| {
//!     db.create_object_store("kv", StoreParams::new())?;
//!     Ok(())
//! });
//! let db = open.wait().map_err(|e| e.to_string())?;
//!
//! let kv = db.store("kv")?;
//! kv.put(&json!({"a": 1}), Some(Key::from(1)))?;
//! let value: Option<serde_json::Value> = kv.get(1)?.wait().map_err(|e| e.to_string())?;
//! assert_eq!(value, Some(json!({"a": 1})));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod capability;
mod config;
mod cursor;
mod database;
pub mod dir;
mod error;
mod factory;
mod object_store;
mod range;
mod request;
mod schema;
mod transaction;
mod value;
pub mod wal;

pub use backend::{BackendStats, CompactionReport, Record, WalBackend, WriteOp};
pub use capability::{KvCapability, NamespacedStore};
pub use config::Config;
pub use cursor::Cursor;
pub use database::{Database, UpgradeHandler, VersionChangeEvent};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use factory::{DatabaseInfo, Factory, OpenRequest};
pub use object_store::ObjectStore;
pub use range::{Direction, EncodedRange, KeyRange};
pub use request::{ReadyState, Request, Scheduler};
pub use schema::{KeyPath, Schema, StoreParams, StoreSchema};
pub use transaction::{Transaction, TransactionMode, TransactionState};
pub use value::ValueFormat;

pub use shelfdb_codec::Key;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
