//! # ShelfDB Testkit
//!
//! Test utilities for ShelfDB.
//!
//! This crate provides:
//! - Temporary factories and pre-built databases
//! - Property-based test generators using proptest
//! - A storage backend that simulates crashes mid-append
//!
//! ## Usage
//!
//! ```rust
//! use shelfdb_testkit::prelude::*;
//!
//! let env = TestFactory::new();
//! let db = env.open_kv("app");
//! db.store("kv").unwrap().put(&"v", Some(1.into())).unwrap();
//! env.run_until_idle();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
