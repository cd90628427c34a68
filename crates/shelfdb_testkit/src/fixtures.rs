//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use shelfdb_core::{
    Config, CoreResult, Database, Factory, StoreParams, Transaction, VersionChangeEvent,
};
use std::path::PathBuf;
use tempfile::TempDir;

/// A factory rooted in a temporary directory that is removed on drop.
pub struct TestFactory {
    /// The factory instance.
    pub factory: Factory,
    _temp_dir: TempDir,
}

impl TestFactory {
    /// Creates a factory with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a factory with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            factory: Factory::new(temp_dir.path(), config),
            _temp_dir: temp_dir,
        }
    }

    /// Directory of the database `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.factory.root().join(name)
    }

    /// Path of the log file of the database `name`.
    pub fn wal_path(&self, name: &str) -> PathBuf {
        self.path(name).join("wal.log")
    }

    /// Opens `name` at `version`, running `upgrade` if the version rises.
    pub fn open_with<F>(&self, name: &str, version: u32, upgrade: F) -> Database
    where
        F: FnOnce(&Database, &Transaction, VersionChangeEvent) -> CoreResult<()> + 'static,
    {
        let open = self
            .factory
            .open(name, Some(version))
            .expect("Failed to start open");
        open.on_upgrade_needed(upgrade);
        open.wait().expect("Failed to open database")
    }

    /// Opens `name` at version 1 with one plain store, `kv`.
    pub fn open_kv(&self, name: &str) -> Database {
        self.open_with(name, 1, |db, _, event| {
            if event.old_version < 1 {
                db.create_object_store("kv", StoreParams::new())?;
            }
            Ok(())
        })
    }

    /// Reopens `name` at its persisted version.
    pub fn reopen(&self, name: &str) -> Database {
        self.factory
            .open(name, None)
            .expect("Failed to start open")
            .wait()
            .expect("Failed to reopen database")
    }

    /// Runs queued work until none is left.
    pub fn run_until_idle(&self) -> usize {
        self.factory.run_until_idle()
    }
}

impl Default for TestFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestFactory {
    type Target = Factory;

    fn deref(&self) -> &Self::Target {
        &self.factory
    }
}

/// Runs a test with a fresh database `test` holding store `kv`.
///
/// # Example
///
/// ```rust
/// use shelfdb_testkit::with_kv_db;
///
/// with_kv_db(|db| {
///     assert_eq!(db.object_store_names(), vec!["kv".to_string()]);
/// });
/// ```
pub fn with_kv_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let env = TestFactory::new();
    let db = env.open_kv("test");
    let result = f(&db);
    env.run_until_idle();
    db.close();
    result
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use serde_json::json;
    use shelfdb_core::Key;

    /// Opens `name` with store `kv` holding `{"index": i}` under keys
    /// `0..count`.
    pub fn populated_database(env: &TestFactory, name: &str, count: u32) -> Database {
        let db = env.open_kv(name);
        let kv = db.store("kv").expect("kv store");
        for i in 0..count {
            kv.put(&json!({ "index": i }), Some(Key::from(i)))
                .expect("Failed to put record");
        }
        env.run_until_idle();
        db
    }

    /// Opens `name` with stores `store_0..store_{count}`, one record each.
    pub fn multi_store_database(env: &TestFactory, name: &str, count: usize) -> Database {
        let names: Vec<String> = (0..count).map(|i| format!("store_{i}")).collect();
        let created = names.clone();
        let db = env.open_with(name, 1, move |db, _, _| {
            for name in &created {
                db.create_object_store(name, StoreParams::new())?;
            }
            Ok(())
        });
        for (i, name) in names.iter().enumerate() {
            db.store(name)
                .expect("store exists")
                .put(&json!({ "store": i }), Some(Key::from("only")))
                .expect("Failed to put record");
        }
        env.run_until_idle();
        db
    }
}
