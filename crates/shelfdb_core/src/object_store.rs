//! Object store views.
//!
//! An [`ObjectStore`] is a lightweight handle naming one store of a
//! database. Bound to a transaction, its writes are queued until commit;
//! unbound, every write is an autocommit straight to the backend. Either
//! way each call returns a [`Request`] that resolves on a later tick.

use crate::backend::WriteOp;
use crate::cursor::Cursor;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::range::{Direction, EncodedRange, KeyRange};
use crate::request::Request;
use crate::schema::{KeyPath, StoreSchema};
use crate::transaction::Transaction;
use crate::value::to_json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;
use shelfdb_codec::{decode_key, encode_key, Key};

/// A view of one object store.
#[derive(Clone)]
pub struct ObjectStore {
    db: Database,
    schema: StoreSchema,
    txn: Option<Transaction>,
}

impl ObjectStore {
    pub(crate) fn new(db: Database, schema: StoreSchema, txn: Option<Transaction>) -> Self {
        Self { db, schema, txn }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// In-line key path, if the store has one.
    #[must_use]
    pub fn key_path(&self) -> Option<&KeyPath> {
        self.schema.key_path.as_ref()
    }

    /// Whether the store generates missing keys.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.schema.auto_increment
    }

    /// The transaction this view is bound to, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<&Transaction> {
        self.txn.as_ref()
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    /// Stores `value`, replacing any record under the same key.
    ///
    /// The key is `key` if given, else read from the value through the key
    /// path, else generated. Resolves with the key used.
    ///
    /// # Errors
    ///
    /// - `DataError` if no key can be determined, or a key is given for a
    ///   store with an in-line key path
    /// - `ReadOnlyError`, `AbortError` or `TransactionInactiveError` from
    ///   the bound transaction
    /// - storage errors from an autocommit write
    pub fn put<V: Serialize + ?Sized>(
        &self,
        value: &V,
        key: Option<Key>,
    ) -> CoreResult<Request<Key>> {
        self.write(value, key, false)
    }

    /// Like [`ObjectStore::put`], but the request fails with a
    /// `ConstraintError` if the key already exists.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectStore::put`].
    pub fn add<V: Serialize + ?Sized>(
        &self,
        value: &V,
        key: Option<Key>,
    ) -> CoreResult<Request<Key>> {
        self.write(value, key, true)
    }

    /// Reads the value stored under `key`, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns a `DataError` for invalid keys, or the bound transaction's
    /// state error. A value that does not decode as `V` fails the request.
    pub fn get<V>(&self, key: impl Into<Key>) -> CoreResult<Request<Option<V>>>
    where
        V: DeserializeOwned + Clone + 'static,
    {
        self.check_readable()?;
        let encoded = encode_key(&key.into())?;
        let bytes = self.db.backend().get(self.name(), &encoded);
        let format = self.db.value_format();
        let value = bytes.map(|b| format.decode::<V>(&b)).transpose();

        let request = self.read_request();
        request.settle_later(value);
        Ok(request)
    }

    /// Reads every value in `range` (all when `None`), ascending, at most
    /// `limit` of them.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectStore::get`].
    pub fn get_all<V>(
        &self,
        range: Option<KeyRange>,
        limit: Option<usize>,
    ) -> CoreResult<Request<Vec<V>>>
    where
        V: DeserializeOwned + Clone + 'static,
    {
        self.check_readable()?;
        let records = self.records(range.as_ref(), limit)?;
        let format = self.db.value_format();
        let values = records
            .iter()
            .map(|(_, value)| format.decode::<V>(value))
            .collect();

        let request = self.read_request();
        request.settle_later(values);
        Ok(request)
    }

    /// Reads every key in `range`, ascending, at most `limit` of them.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectStore::get`].
    pub fn get_all_keys(
        &self,
        range: Option<KeyRange>,
        limit: Option<usize>,
    ) -> CoreResult<Request<Vec<Key>>> {
        self.check_readable()?;
        let keys = self
            .records(range.as_ref(), limit)?
            .iter()
            .map(|(key, _)| decode_key(key).map_err(CoreError::from))
            .collect();

        let request = self.read_request();
        request.settle_later(keys);
        Ok(request)
    }

    /// Counts the records in `range`.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectStore::get`].
    pub fn count(&self, range: Option<KeyRange>) -> CoreResult<Request<usize>> {
        self.check_readable()?;
        let encoded = encode_range(range.as_ref())?;
        let count = self.db.backend().count(self.name(), &encoded);

        let request = self.read_request();
        request.succeed_later(count);
        Ok(request)
    }

    /// Removes the record under `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectStore::put`].
    pub fn delete(&self, key: impl Into<Key>) -> CoreResult<Request<()>> {
        self.check_writable("delete")?;
        let encoded = encode_key(&key.into())?;
        let store = self.name().to_string();
        match &self.txn {
            Some(_) => self.queue(WriteOp::Delete {
                store,
                key: encoded,
            }),
            None => {
                self.db.backend_mut().delete(&store, &encoded)?;
                Ok(self.resolved(()))
            }
        }
    }

    /// Removes every record in `range`.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectStore::put`].
    pub fn delete_range(&self, range: &KeyRange) -> CoreResult<Request<()>> {
        self.check_writable("delete")?;
        let encoded = range.encode()?;
        let store = self.name().to_string();
        match &self.txn {
            Some(_) => self.queue(WriteOp::DeleteRange {
                store,
                range: encoded,
            }),
            None => {
                self.db.backend_mut().delete_range(&store, &encoded)?;
                Ok(self.resolved(()))
            }
        }
    }

    /// Removes every record in the store.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectStore::put`].
    pub fn clear(&self) -> CoreResult<Request<()>> {
        self.check_writable("clear")?;
        let store = self.name().to_string();
        match &self.txn {
            Some(_) => self.queue(WriteOp::Clear { store }),
            None => {
                self.db.backend_mut().clear(&store)?;
                Ok(self.resolved(()))
            }
        }
    }

    /// Opens a cursor over `range` (all when `None`).
    ///
    /// The request resolves with the cursor positioned on the first record,
    /// or `None` if the range is empty, and fires again after each
    /// `continue_` or `advance`.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectStore::get`].
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: Direction,
    ) -> CoreResult<Request<Option<Cursor>>> {
        self.check_readable()?;
        let encoded = encode_range(range.as_ref())?;
        let records = self.db.backend().scan(self.name(), &encoded, direction);
        Ok(Cursor::open(self.clone(), records, direction))
    }

    /// Writes `value` under an existing `key`, checking that an in-line key
    /// path still yields that key.
    pub(crate) fn replace_at<V: Serialize + ?Sized>(
        &self,
        value: &V,
        key: &Key,
    ) -> CoreResult<Request<Key>> {
        self.check_writable("update")?;
        let json = to_json(value)?;
        if let Some(path) = &self.schema.key_path {
            if path.extract(&json)?.as_ref() != Some(key) {
                return Err(CoreError::data(
                    "the value's key path does not yield the cursor's key",
                ));
            }
        }
        self.store_record(&json, key.clone(), false)
    }

    fn write<V: Serialize + ?Sized>(
        &self,
        value: &V,
        key: Option<Key>,
        no_overwrite: bool,
    ) -> CoreResult<Request<Key>> {
        self.check_writable(if no_overwrite { "add" } else { "put" })?;
        let mut json = to_json(value)?;
        let key = self.resolve_key(&mut json, key)?;
        self.store_record(&json, key, no_overwrite)
    }

    fn resolve_key(&self, json: &mut Json, explicit: Option<Key>) -> CoreResult<Key> {
        let name = self.name();
        let key = match (&self.schema.key_path, explicit) {
            (Some(path), Some(_)) => {
                return Err(CoreError::data(format!(
                    "object store {name:?} uses in-line keys ({path:?}); a key argument is not allowed"
                )))
            }
            (Some(path), None) => match path.extract(json)? {
                Some(key) => key,
                None if self.schema.auto_increment => {
                    let key = self.db.generate_key(name)?;
                    path.inject(json, &key)?;
                    return Ok(key);
                }
                None => {
                    return Err(CoreError::data(format!(
                        "key path {path:?} did not yield a key"
                    )))
                }
            },
            (None, Some(key)) => key,
            (None, None) if self.schema.auto_increment => return self.db.generate_key(name),
            (None, None) => {
                return Err(CoreError::data(format!(
                    "object store {name:?} has no key path or key generator; a key is required"
                )))
            }
        };
        key.validate()?;
        if self.schema.auto_increment {
            self.db.observe_key(name, &key);
        }
        Ok(key)
    }

    fn store_record(&self, json: &Json, key: Key, no_overwrite: bool) -> CoreResult<Request<Key>> {
        let encoded = encode_key(&key)?;
        let bytes = self.db.value_format().encode(json)?;

        if no_overwrite && self.exists(&encoded) {
            let request = self.read_request();
            request.fail_later(CoreError::constraint(format!(
                "key {key} already exists in object store {:?}",
                self.name()
            )));
            return Ok(request);
        }

        match &self.txn {
            Some(txn) => {
                txn.enqueue(WriteOp::Put {
                    store: self.name().to_string(),
                    key: encoded,
                    value: bytes,
                });
                let request = Request::new(self.db.scheduler());
                txn.add_request(&request, key);
                Ok(request)
            }
            None => {
                self.db.backend_mut().put(self.name(), encoded, bytes)?;
                Ok(self.resolved(key))
            }
        }
    }

    fn exists(&self, encoded: &[u8]) -> bool {
        self.txn
            .as_ref()
            .and_then(|txn| txn.pending_state(self.name(), encoded))
            .unwrap_or_else(|| self.db.backend().contains(self.name(), encoded))
    }

    fn queue(&self, op: WriteOp) -> CoreResult<Request<()>> {
        let request = Request::new(self.db.scheduler());
        if let Some(txn) = &self.txn {
            txn.enqueue(op);
            txn.add_request(&request, ());
        }
        Ok(request)
    }

    /// A request resolved on its own tick rather than by a commit. Inside a
    /// transaction it holds off the auto-commit until handled.
    pub(crate) fn read_request<T: Clone + 'static>(&self) -> Request<T> {
        match &self.txn {
            Some(txn) => txn.request(self.db.scheduler()),
            None => Request::new(self.db.scheduler()),
        }
    }

    fn resolved<T: Clone + 'static>(&self, value: T) -> Request<T> {
        let request = Request::new(self.db.scheduler());
        request.succeed_later(value);
        request
    }

    fn records(
        &self,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<crate::backend::Record>> {
        let encoded = encode_range(range)?;
        let mut records = self.db.backend().scan(self.name(), &encoded, Direction::Next);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    pub(crate) fn check_readable(&self) -> CoreResult<()> {
        self.db.ensure_open()?;
        match &self.txn {
            Some(txn) => txn.ensure_active(),
            None => Ok(()),
        }
    }

    fn check_writable(&self, operation: &'static str) -> CoreResult<()> {
        self.db.ensure_open()?;
        match &self.txn {
            Some(txn) => txn.ensure_writable(operation),
            None => Ok(()),
        }
    }
}

fn encode_range(range: Option<&KeyRange>) -> CoreResult<EncodedRange> {
    range.map_or_else(|| Ok(EncodedRange::all()), KeyRange::encode)
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("name", &self.schema.name)
            .field("key_path", &self.schema.key_path)
            .field("auto_increment", &self.schema.auto_increment)
            .field("txn", &self.txn.as_ref().map(Transaction::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StoreParams;
    use crate::transaction::TransactionMode;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
        name: String,
    }

    fn db_with(stores: &[(&str, StoreParams)]) -> Database {
        let stores: Vec<(String, StoreParams)> = stores
            .iter()
            .map(|(name, params)| (name.to_string(), params.clone()))
            .collect();
        let db = Database::memory("test");
        db.upgrade_for_test(move |db| {
            for (name, params) in stores {
                db.create_object_store(&name, params)?;
            }
            Ok(())
        });
        db
    }

    fn kv() -> Database {
        db_with(&[("kv", StoreParams::new())])
    }

    #[test]
    fn autocommit_put_get() {
        let db = kv();
        let store = db.store("kv").unwrap();
        let key = store.put(&json!({"a": 1}), Some(Key::from(1))).unwrap();
        assert_eq!(key.wait().unwrap(), Key::from(1));

        let value = store.get::<Json>(1).unwrap().wait().unwrap();
        assert_eq!(value, Some(json!({"a": 1})));
        assert_eq!(store.get::<Json>(2).unwrap().wait().unwrap(), None);
    }

    #[test]
    fn put_resolves_on_a_later_tick() {
        let db = kv();
        let store = db.store("kv").unwrap();
        let request = store.put(&json!(1), Some(Key::from("k"))).unwrap();
        assert!(!request.is_done());
        // Autocommit writes are applied before the request resolves.
        assert!(db.backend().contains("kv", &encode_key(&Key::from("k")).unwrap()));
        db.scheduler().run_until_idle();
        assert!(request.is_done());
    }

    #[test]
    fn put_twice_last_value_wins() {
        let db = kv();
        let store = db.store("kv").unwrap();
        store.put(&"first", Some(Key::from(1))).unwrap();
        store.put(&"second", Some(Key::from(1))).unwrap();
        let value = store.get::<String>(1).unwrap().wait().unwrap();
        assert_eq!(value.as_deref(), Some("second"));
    }

    #[test]
    fn add_twice_is_constraint_error() {
        let db = kv();
        let store = db.store("kv").unwrap();
        let first = store.add(&"x", Some(Key::from(1))).unwrap();
        let second = store.add(&"y", Some(Key::from(1))).unwrap();
        assert!(first.wait().is_ok());
        let err = second.wait().unwrap_err();
        assert!(matches!(*err, CoreError::Constraint { .. }));
        assert_eq!(
            store.get::<String>(1).unwrap().wait().unwrap().as_deref(),
            Some("x")
        );
    }

    #[test]
    fn add_twice_in_one_transaction_is_constraint_error() {
        let db = kv();
        let txn = db.transaction(&["kv"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("kv").unwrap();
        let first = store.add(&1, Some(Key::from("k"))).unwrap();
        let second = store.add(&2, Some(Key::from("k"))).unwrap();
        db.scheduler().run_until_idle();
        assert!(first.result().is_some());
        assert!(matches!(
            *second.error().unwrap(),
            CoreError::Constraint { .. }
        ));
    }

    #[test]
    fn missing_key_is_data_error() {
        let db = kv();
        let store = db.store("kv").unwrap();
        assert!(matches!(
            store.put(&json!({"a": 1}), None),
            Err(CoreError::Data { .. })
        ));
    }

    #[test]
    fn nan_key_is_data_error() {
        let db = kv();
        let store = db.store("kv").unwrap();
        let err = store.put(&1, Some(Key::Number(f64::NAN))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn key_path_extracts_key() {
        let db = db_with(&[("items", StoreParams::new().key_path("id"))]);
        let store = db.store("items").unwrap();
        let item = Item {
            id: 7,
            name: "seven".into(),
        };
        assert_eq!(store.put(&item, None).unwrap().wait().unwrap(), Key::from(7));
        assert_eq!(store.get::<Item>(7).unwrap().wait().unwrap(), Some(item));
    }

    #[test]
    fn explicit_key_with_key_path_is_data_error() {
        let db = db_with(&[("items", StoreParams::new().key_path("id"))]);
        let store = db.store("items").unwrap();
        let result = store.put(&json!({"id": 1}), Some(Key::from(1)));
        assert!(matches!(result, Err(CoreError::Data { .. })));
    }

    #[test]
    fn auto_increment_generates_and_injects() {
        let db = db_with(&[(
            "notes",
            StoreParams::new().key_path("id").auto_increment(true),
        )]);
        let store = db.store("notes").unwrap();
        let first = store.put(&json!({"text": "a"}), None).unwrap();
        let second = store.put(&json!({"text": "b"}), None).unwrap();
        assert_eq!(first.wait().unwrap(), Key::from(1));
        assert_eq!(second.wait().unwrap(), Key::from(2));

        let stored = store.get::<Json>(2).unwrap().wait().unwrap().unwrap();
        assert_eq!(stored, json!({"text": "b", "id": 2}));
    }

    #[test]
    fn explicit_numeric_key_advances_generator() {
        let db = db_with(&[("log", StoreParams::new().auto_increment(true))]);
        let store = db.store("log").unwrap();
        store.put(&"x", Some(Key::from(10))).unwrap();
        let next = store.put(&"y", None).unwrap();
        assert_eq!(next.wait().unwrap(), Key::from(11));
        store.put(&"z", Some(Key::from("text"))).unwrap();
        assert_eq!(store.put(&"w", None).unwrap().wait().unwrap(), Key::from(12));
    }

    #[test]
    fn readonly_transaction_rejects_writes() {
        let db = kv();
        let txn = db.transaction(&["kv"], TransactionMode::ReadOnly).unwrap();
        let store = txn.object_store("kv").unwrap();
        for result in [
            store.put(&1, Some(Key::from(1))).map(|_| ()),
            store.delete(1).map(|_| ()),
            store.clear().map(|_| ()),
        ] {
            assert!(matches!(result, Err(CoreError::ReadOnly { .. })));
        }
        assert!(store.get::<Json>(1).is_ok());
    }

    #[test]
    fn get_all_keys_count_and_limit() {
        let db = kv();
        let store = db.store("kv").unwrap();
        for i in 1..=5 {
            store.put(&(i * 10), Some(Key::from(i))).unwrap();
        }
        let values = store
            .get_all::<i32>(Some(KeyRange::lower_bound(3, false)), None)
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(values, vec![30, 40, 50]);

        let keys = store.get_all_keys(None, Some(2)).unwrap().wait().unwrap();
        assert_eq!(keys, vec![Key::from(1), Key::from(2)]);

        let count = store
            .count(Some(KeyRange::upper_bound(2, true)))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn delete_range_and_clear() {
        let db = kv();
        let store = db.store("kv").unwrap();
        for i in 1..=5 {
            store.put(&i, Some(Key::from(i))).unwrap();
        }
        store
            .delete_range(&KeyRange::bound(2, 4, false, false).unwrap())
            .unwrap();
        let keys = store.get_all_keys(None, None).unwrap().wait().unwrap();
        assert_eq!(keys, vec![Key::from(1), Key::from(5)]);

        store.clear().unwrap().wait().unwrap();
        assert_eq!(store.count(None).unwrap().wait().unwrap(), 0);
    }

    #[test]
    fn transactional_writes_wait_for_commit() {
        let db = kv();
        let txn = db.transaction(&["kv"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("kv").unwrap();
        store.put(&"v", Some(Key::from(1))).unwrap();
        assert!(db.backend().is_empty("kv"));

        db.scheduler().run_until_idle();
        assert_eq!(db.backend().len("kv"), 1);
        assert_eq!(txn.state(), crate::transaction::TransactionState::Committed);
    }

    #[test]
    fn read_then_write_in_one_transaction() {
        let db = kv();
        db.store("kv").unwrap().put(&json!(1), Some(Key::from("n"))).unwrap();
        db.scheduler().run_until_idle();

        let txn = db.transaction(&["kv"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("kv").unwrap();
        let read = store.get::<Json>("n").unwrap();
        let writer = store.clone();
        read.on_success(move |r| {
            let n = r.result().flatten().and_then(|v| v.as_i64()).unwrap();
            writer.put(&json!(n + 1), Some(Key::from("n"))).unwrap();
        });
        db.scheduler().run_until_idle();

        assert_eq!(txn.state(), crate::transaction::TransactionState::Committed);
        let value = db.store("kv").unwrap().get::<Json>("n").unwrap().wait().unwrap();
        assert_eq!(value, Some(json!(2)));
    }
}
