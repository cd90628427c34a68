//! Database handle.
//!
//! A [`Database`] owns one [`WalBackend`], the schema of its object stores
//! and the lock on its directory. Handles are cheap to clone and all refer
//! to the same open database.

use crate::backend::{BackendStats, CompactionReport, WalBackend};
use crate::capability::NamespacedStore;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::object_store::ObjectStore;
use crate::request::Scheduler;
use crate::schema::{Schema, StoreParams, StoreSchema};
use crate::transaction::{Transaction, TransactionMode, TransactionState};
use crate::value::ValueFormat;
use shelfdb_codec::{decode_key, tags, Key};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Largest key a generator hands out (2^53).
const MAX_GENERATED_KEY: f64 = 9_007_199_254_740_992.0;

/// Old and new version passed to an upgrade handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChangeEvent {
    /// Version persisted before the upgrade, `0` for a new database.
    pub old_version: u32,
    /// Version being opened.
    pub new_version: u32,
}

/// Handler run while a database upgrades.
pub type UpgradeHandler =
    Box<dyn FnOnce(&Database, &Transaction, VersionChangeEvent) -> CoreResult<()>>;

struct Inner {
    name: String,
    version: Cell<u32>,
    schema: RefCell<Schema>,
    backend: RefCell<WalBackend>,
    scheduler: Scheduler,
    dir: RefCell<Option<DatabaseDir>>,
    generators: RefCell<HashMap<String, f64>>,
    upgrade: RefCell<Option<Transaction>>,
    closed: Cell<bool>,
    next_txid: Cell<u64>,
}

/// An open database.
#[derive(Clone)]
pub struct Database {
    inner: Rc<Inner>,
}

impl Database {
    pub(crate) fn new(
        name: &str,
        version: u32,
        schema: Schema,
        backend: WalBackend,
        scheduler: Scheduler,
        dir: Option<DatabaseDir>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                name: name.to_string(),
                version: Cell::new(version),
                schema: RefCell::new(schema),
                backend: RefCell::new(backend),
                scheduler,
                dir: RefCell::new(dir),
                generators: RefCell::new(HashMap::new()),
                upgrade: RefCell::new(None),
                closed: Cell::new(false),
                next_txid: Cell::new(1),
            }),
        }
    }

    /// A database that lives only in memory, at version 0.
    #[cfg(test)]
    pub(crate) fn memory(name: &str) -> Self {
        Self::new(
            name,
            0,
            Schema::default(),
            WalBackend::in_memory(),
            Scheduler::new(),
            None,
        )
    }

    /// Runs one upgrade to the next version, panicking on failure.
    #[cfg(test)]
    pub(crate) fn upgrade_for_test(&self, f: impl FnOnce(&Database) -> CoreResult<()> + 'static) {
        let next = self.version() + 1;
        let handler: UpgradeHandler = Box::new(move |db, _, _| f(db));
        self.run_upgrade(next, Some(handler)).unwrap();
        self.scheduler().run_until_idle();
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current schema version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.inner.version.get()
    }

    /// Names of all object stores, sorted.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        self.inner.schema.borrow().names()
    }

    /// The value encoding used by this database.
    #[must_use]
    pub fn value_format(&self) -> ValueFormat {
        self.inner.schema.borrow().value_format()
    }

    /// The scheduler that resolves this database's requests.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Whether [`Database::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Creates an object store. Only allowed while an upgrade runs.
    ///
    /// # Errors
    ///
    /// - `InvalidStateError` outside an upgrade
    /// - `ConstraintError` if the name is taken
    /// - `TypeError` for `auto_increment` with a compound or empty key path
    pub fn create_object_store(&self, name: &str, params: StoreParams) -> CoreResult<ObjectStore> {
        let txn = self.upgrade_transaction("create_object_store")?;
        let schema = StoreSchema::new(name, params)?;
        self.inner.schema.borrow_mut().add(schema.clone())?;
        tracing::debug!(db = %self.inner.name, store = name, "object store created");
        Ok(ObjectStore::new(self.clone(), schema, Some(txn)))
    }

    /// Deletes an object store and its records. Only allowed while an
    /// upgrade runs.
    ///
    /// # Errors
    ///
    /// - `InvalidStateError` outside an upgrade
    /// - `NotFoundError` if no such store exists
    pub fn delete_object_store(&self, name: &str) -> CoreResult<()> {
        let txn = self.upgrade_transaction("delete_object_store")?;
        self.inner.schema.borrow_mut().remove(name)?;
        self.inner.generators.borrow_mut().remove(name);
        txn.enqueue(crate::backend::WriteOp::Clear {
            store: name.to_string(),
        });
        tracing::debug!(db = %self.inner.name, store = name, "object store deleted");
        Ok(())
    }

    /// Starts a transaction over `stores`.
    ///
    /// The transaction commits by itself once none of its read requests is
    /// pending, unless committed or aborted first.
    ///
    /// # Errors
    ///
    /// - `NotFoundError` for an unknown store
    /// - `InvalidStateError` for an empty scope, a closed database or an
    ///   upgrade in progress
    /// - `TypeError` for [`TransactionMode::VersionChange`], which only
    ///   upgrades create
    pub fn transaction(&self, stores: &[&str], mode: TransactionMode) -> CoreResult<Transaction> {
        self.ensure_open()?;
        if mode == TransactionMode::VersionChange {
            return Err(CoreError::type_error(
                "versionchange transactions are created by upgrades only",
            ));
        }
        if self.inner.upgrade.borrow().is_some() {
            return Err(CoreError::invalid_state("an upgrade is in progress"));
        }
        if stores.is_empty() {
            return Err(CoreError::invalid_state(
                "a transaction needs at least one object store",
            ));
        }

        let mut scope: Vec<String> = Vec::with_capacity(stores.len());
        {
            let schema = self.inner.schema.borrow();
            for &name in stores {
                if !schema.contains(name) {
                    return Err(CoreError::store_not_found(name));
                }
                scope.push(name.to_string());
            }
        }
        scope.sort();
        scope.dedup();

        let txn = Transaction::new(self.clone(), scope, mode);
        txn.schedule_auto_commit();
        Ok(txn)
    }

    /// An autocommit view of a store: every write goes straight to the
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns a `NotFoundError` for an unknown store, or an
    /// `InvalidStateError` if the database is closed.
    pub fn store(&self, name: &str) -> CoreResult<ObjectStore> {
        self.ensure_open()?;
        let schema = self
            .store_schema(name)
            .ok_or_else(|| CoreError::store_not_found(name))?;
        Ok(ObjectStore::new(self.clone(), schema, None))
    }

    /// Raw byte access to a store for external collaborators.
    ///
    /// # Errors
    ///
    /// Returns a `NotFoundError` for an unknown store.
    pub fn capability(&self, store: &str) -> CoreResult<NamespacedStore> {
        self.ensure_open()?;
        if self.store_schema(store).is_none() {
            return Err(CoreError::store_not_found(store));
        }
        Ok(NamespacedStore::new(self.clone(), store))
    }

    /// Rewrites the log down to one entry per live record.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails; the old log is kept.
    pub fn compact(&self) -> CoreResult<CompactionReport> {
        self.ensure_open()?;
        self.backend_mut().compact()
    }

    /// Backend counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size cannot be read.
    pub fn stats(&self) -> CoreResult<BackendStats> {
        self.backend().stats()
    }

    /// Syncs the log and releases the directory lock. Later operations fail
    /// with `InvalidStateError`. Closing twice is a no-op.
    pub fn close(&self) {
        if self.inner.closed.replace(true) {
            return;
        }
        if let Err(e) = self.backend_mut().sync() {
            tracing::warn!(db = %self.inner.name, error = %e, "sync on close failed");
        }
        self.inner.dir.borrow_mut().take();
        tracing::debug!(db = %self.inner.name, "database closed");
    }

    /// Runs an upgrade to `new_version` inside a version-change transaction.
    ///
    /// On success the schema and version are persisted. If the handler
    /// fails or aborts the transaction, the schema is restored and nothing
    /// is persisted.
    ///
    /// The upgrade's writes reach the log before the sidecars are written. A
    /// crash in between keeps the old version, so the upgrade runs again on
    /// the next open and finds the first run's records in place.
    pub(crate) fn run_upgrade(
        &self,
        new_version: u32,
        handler: Option<UpgradeHandler>,
    ) -> CoreResult<()> {
        let old_version = self.version();
        let snapshot = self.inner.schema.borrow().clone();
        let txn = Transaction::new(self.clone(), Vec::new(), TransactionMode::VersionChange);
        *self.inner.upgrade.borrow_mut() = Some(txn.clone());

        let event = VersionChangeEvent {
            old_version,
            new_version,
        };
        let outcome = match handler {
            Some(handler) => handler(self, &txn, event),
            None => Ok(()),
        }
        .and_then(|()| {
            if txn.state() == TransactionState::Aborted {
                Err(CoreError::aborted("the upgrade transaction was aborted"))
            } else {
                txn.commit()
            }
        })
        .and_then(|()| self.persist(new_version));
        self.inner.upgrade.borrow_mut().take();

        match outcome {
            Ok(()) => {
                self.inner.version.set(new_version);
                tracing::info!(
                    db = %self.inner.name,
                    old_version,
                    new_version,
                    "database upgraded"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(abort_error) = txn.abort() {
                    tracing::debug!(error = %abort_error, "upgrade transaction already finished");
                }
                *self.inner.schema.borrow_mut() = snapshot;
                self.inner.generators.borrow_mut().clear();
                tracing::warn!(db = %self.inner.name, error = %e, "upgrade failed");
                Err(match e {
                    CoreError::Aborted { .. } => e,
                    other => CoreError::aborted(format!("upgrade failed: {other}")),
                })
            }
        }
    }

    fn persist(&self, version: u32) -> CoreResult<()> {
        let dir = self.inner.dir.borrow();
        if let Some(dir) = dir.as_ref() {
            dir.save_schema(&self.inner.schema.borrow())?;
            dir.save_version(version)?;
        }
        Ok(())
    }

    fn upgrade_transaction(&self, operation: &str) -> CoreResult<Transaction> {
        self.ensure_open()?;
        let txn = self.inner.upgrade.borrow().clone().ok_or_else(|| {
            CoreError::invalid_state(format!("{operation} is only allowed during an upgrade"))
        })?;
        txn.ensure_active()?;
        Ok(txn)
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.inner.closed.get() {
            return Err(CoreError::invalid_state(format!(
                "database {:?} is closed",
                self.inner.name
            )));
        }
        Ok(())
    }

    pub(crate) fn store_schema(&self, name: &str) -> Option<StoreSchema> {
        self.inner.schema.borrow().store(name).cloned()
    }

    pub(crate) fn backend(&self) -> Ref<'_, WalBackend> {
        self.inner.backend.borrow()
    }

    pub(crate) fn backend_mut(&self) -> RefMut<'_, WalBackend> {
        self.inner.backend.borrow_mut()
    }

    pub(crate) fn next_transaction_id(&self) -> u64 {
        let id = self.inner.next_txid.get();
        self.inner.next_txid.set(id + 1);
        id
    }

    /// Hands out the next generated key for `store`.
    pub(crate) fn generate_key(&self, store: &str) -> CoreResult<Key> {
        let next = self.generator_next(store);
        if next > MAX_GENERATED_KEY {
            return Err(CoreError::constraint(format!(
                "key generator for {store:?} is exhausted"
            )));
        }
        self.inner
            .generators
            .borrow_mut()
            .insert(store.to_string(), next + 1.0);
        Ok(Key::Number(next))
    }

    /// Moves the generator past an explicitly supplied numeric key.
    pub(crate) fn observe_key(&self, store: &str, key: &Key) {
        let Some(n) = key.as_number() else {
            return;
        };
        if n >= self.generator_next(store) {
            self.inner
                .generators
                .borrow_mut()
                .insert(store.to_string(), n.floor() + 1.0);
        }
    }

    fn generator_next(&self, store: &str) -> f64 {
        if let Some(&next) = self.inner.generators.borrow().get(store) {
            return next;
        }
        // Seeded from the largest number key; numbers sort before dates.
        self.backend()
            .last_key_before(store, &[tags::DATE])
            .and_then(|bytes| decode_key(&bytes).ok())
            .and_then(|key| key.as_number())
            .map_or(1.0, |max| (max.floor() + 1.0).max(1.0))
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("version", &self.inner.version.get())
            .field("stores", &self.object_store_names())
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn kv() -> Database {
        let db = Database::memory("db");
        db.upgrade_for_test(|db| {
            db.create_object_store("kv", StoreParams::new())?;
            db.create_object_store("other", StoreParams::new())?;
            Ok(())
        });
        db
    }

    #[test]
    fn create_store_outside_upgrade_is_invalid_state() {
        let db = kv();
        assert!(matches!(
            db.create_object_store("late", StoreParams::new()),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn duplicate_store_is_constraint_error() {
        let db = Database::memory("db");
        let handler: UpgradeHandler = Box::new(|db, _, _| {
            db.create_object_store("kv", StoreParams::new())?;
            db.create_object_store("kv", StoreParams::new())?;
            Ok(())
        });
        let err = db.run_upgrade(1, Some(handler)).unwrap_err();
        assert!(matches!(err, CoreError::Aborted { .. }));
        assert!(err.to_string().contains("ConstraintError"));
        assert!(db.object_store_names().is_empty());
        assert_eq!(db.version(), 0);
    }

    #[test]
    fn upgrade_event_carries_versions() {
        let db = Database::memory("db");
        let seen = Rc::new(Cell::new(None));
        let sink = Rc::clone(&seen);
        let handler: UpgradeHandler = Box::new(move |_, txn, event| {
            assert_eq!(txn.mode(), TransactionMode::VersionChange);
            sink.set(Some(event));
            Ok(())
        });
        db.run_upgrade(3, Some(handler)).unwrap();
        assert_eq!(
            seen.get(),
            Some(VersionChangeEvent {
                old_version: 0,
                new_version: 3
            })
        );
        assert_eq!(db.version(), 3);
    }

    #[test]
    fn aborted_upgrade_rolls_back_schema_and_writes() {
        let db = Database::memory("db");
        let handler: UpgradeHandler = Box::new(|db, txn, _| {
            let store = db.create_object_store("kv", StoreParams::new())?;
            store.put(&json!(1), Some(Key::from(1)))?;
            txn.abort()
        });
        let err = db.run_upgrade(1, Some(handler)).unwrap_err();
        assert!(matches!(err, CoreError::Aborted { .. }));
        assert!(db.object_store_names().is_empty());
        assert!(db.backend().is_empty("kv"));
    }

    #[test]
    fn transaction_unknown_store_is_not_found() {
        let db = kv();
        assert!(matches!(
            db.transaction(&["kv", "missing"], TransactionMode::ReadWrite),
            Err(CoreError::StoreNotFound { .. })
        ));
        assert!(matches!(
            db.transaction(&[], TransactionMode::ReadOnly),
            Err(CoreError::InvalidState { .. })
        ));
        assert!(matches!(
            db.transaction(&["kv"], TransactionMode::VersionChange),
            Err(CoreError::Type { .. })
        ));
    }

    #[test]
    fn object_store_outside_scope_is_not_found() {
        let db = kv();
        let txn = db.transaction(&["kv"], TransactionMode::ReadOnly).unwrap();
        assert!(txn.object_store("kv").is_ok());
        assert!(matches!(
            txn.object_store("other"),
            Err(CoreError::StoreNotFound { .. })
        ));
    }

    #[test]
    fn abort_discards_three_puts() {
        let db = kv();
        db.store("kv")
            .unwrap()
            .put(&"before", Some(Key::from(0)))
            .unwrap();
        db.scheduler().run_until_idle();
        let before = db.stats().unwrap().log_bytes;

        let txn = db.transaction(&["kv"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("kv").unwrap();
        let requests: Vec<_> = (1..=3)
            .map(|i| store.put(&i, Some(Key::from(i))).unwrap())
            .collect();
        let aborted = Rc::new(Cell::new(false));
        let flag = Rc::clone(&aborted);
        txn.on_abort(move |_| flag.set(true));
        txn.abort().unwrap();
        db.scheduler().run_until_idle();

        for request in requests {
            assert!(matches!(*request.error().unwrap(), CoreError::Aborted { .. }));
        }
        assert!(aborted.get());
        assert_eq!(db.backend().len("kv"), 1);
        assert_eq!(db.stats().unwrap().log_bytes, before);
    }

    #[test]
    fn operations_after_abort_fail() {
        let db = kv();
        let txn = db.transaction(&["kv"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("kv").unwrap();
        txn.abort().unwrap();
        assert!(matches!(
            store.put(&1, Some(Key::from(1))),
            Err(CoreError::Aborted { .. })
        ));
        // Committing an aborted transaction is a no-op.
        assert!(txn.commit().is_ok());
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn commit_resolves_in_order_then_completes() {
        let db = kv();
        let txn = db.transaction(&["kv", "other"], TransactionMode::ReadWrite).unwrap();
        let order = Rc::new(RefCell::new(Vec::new()));
        for (i, name) in ["kv", "other", "kv"].into_iter().enumerate() {
            let store = txn.object_store(name).unwrap();
            let request = store.put(&i, Some(Key::from(i as u32))).unwrap();
            let log = Rc::clone(&order);
            request.on_success(move |_| log.borrow_mut().push(format!("put{i}")));
        }
        let log = Rc::clone(&order);
        txn.on_complete(move |_| log.borrow_mut().push("complete".into()));

        txn.commit().unwrap();
        assert!(matches!(txn.commit(), Err(CoreError::TransactionInactive)));
        db.scheduler().run_until_idle();
        assert_eq!(*order.borrow(), vec!["put0", "put1", "put2", "complete"]);
        assert_eq!(db.backend().len("kv"), 2);
        assert_eq!(db.backend().len("other"), 1);
    }

    #[test]
    fn committed_transaction_is_inactive() {
        let db = kv();
        let txn = db.transaction(&["kv"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("kv").unwrap();
        db.scheduler().run_until_idle();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(matches!(
            store.put(&1, Some(Key::from(1))),
            Err(CoreError::TransactionInactive)
        ));
        assert!(txn.abort().is_err());
    }

    #[test]
    fn delete_object_store_drops_records() {
        let db = kv();
        db.store("kv").unwrap().put(&1, Some(Key::from(1))).unwrap();
        db.upgrade_for_test(|db| db.delete_object_store("kv"));
        assert_eq!(db.object_store_names(), vec!["other".to_string()]);
        assert!(db.backend().is_empty("kv"));
        assert!(matches!(db.store("kv"), Err(CoreError::StoreNotFound { .. })));
    }

    #[test]
    fn closed_database_rejects_work() {
        let db = kv();
        db.close();
        db.close();
        assert!(db.is_closed());
        assert!(matches!(db.store("kv"), Err(CoreError::InvalidState { .. })));
        assert!(matches!(
            db.transaction(&["kv"], TransactionMode::ReadOnly),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn generator_seeds_from_existing_numbers() {
        let db = Database::memory("db");
        db.upgrade_for_test(|db| {
            db.create_object_store("log", StoreParams::new().auto_increment(true))?;
            Ok(())
        });
        db.backend_mut()
            .put(
                "log",
                shelfdb_codec::encode_key(&Key::from(41.5)).unwrap(),
                b"1".to_vec(),
            )
            .unwrap();
        assert_eq!(db.generate_key("log").unwrap(), Key::from(42));
        assert_eq!(db.generate_key("log").unwrap(), Key::from(43));
    }

    #[test]
    fn generator_exhaustion_is_constraint_error() {
        let db = Database::memory("db");
        db.observe_key("s", &Key::Number(f64::INFINITY));
        assert!(matches!(
            db.generate_key("s"),
            Err(CoreError::Constraint { .. })
        ));
    }
}
