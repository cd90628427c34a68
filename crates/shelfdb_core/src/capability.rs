//! Opaque byte access for collaborators outside the object-store API.
//!
//! Content-addressed blobs and other opaque payloads are kept under a
//! namespaced key in an ordinary object store. The engine does not look at
//! the bytes: keys are stored as binary keys and values are written as-is,
//! bypassing the database's value format.

use crate::database::Database;
use crate::error::CoreResult;
use shelfdb_codec::{encode_key, Key};

/// Get, put and delete of raw bytes under a key.
pub trait KvCapability {
    /// Reads the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed.
    fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, durably, before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed or the log append fails.
    fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<()>;

    /// Removes `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Same as [`KvCapability::put`].
    fn delete(&self, key: &[u8]) -> CoreResult<()>;
}

/// A [`KvCapability`] over one object store of a database.
#[derive(Debug, Clone)]
pub struct NamespacedStore {
    db: Database,
    store: String,
}

impl NamespacedStore {
    pub(crate) fn new(db: Database, store: &str) -> Self {
        Self {
            db,
            store: store.to_string(),
        }
    }

    /// Name of the backing store.
    #[must_use]
    pub fn store(&self) -> &str {
        &self.store
    }

    fn encode(key: &[u8]) -> CoreResult<Vec<u8>> {
        Ok(encode_key(&Key::Binary(key.to_vec()))?)
    }
}

impl KvCapability for NamespacedStore {
    fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        self.db.ensure_open()?;
        let key = Self::encode(key)?;
        Ok(self.db.backend().get(&self.store, &key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.db.ensure_open()?;
        let key = Self::encode(key)?;
        self.db.backend_mut().put(&self.store, key, value.to_vec())
    }

    fn delete(&self, key: &[u8]) -> CoreResult<()> {
        self.db.ensure_open()?;
        let key = Self::encode(key)?;
        self.db.backend_mut().delete(&self.store, &key)?;
        Ok(())
    }
}
