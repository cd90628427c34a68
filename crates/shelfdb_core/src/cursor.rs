//! Cursors over a range scan snapshot.

use crate::backend::Record;
use crate::error::{CoreError, CoreResult};
use crate::object_store::ObjectStore;
use crate::range::Direction;
use crate::request::Request;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shelfdb_codec::{decode_key, encode_key, Key};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

struct State {
    store: ObjectStore,
    direction: Direction,
    records: Vec<Record>,
    position: usize,
    request: Request<Option<Cursor>>,
    awaiting: bool,
}

/// A position in a snapshot of a store, taken when the cursor opened.
///
/// Writes made after that point, including through [`Cursor::update`] and
/// [`Cursor::delete`], do not change what the cursor visits.
#[derive(Clone)]
pub struct Cursor {
    state: Rc<RefCell<State>>,
}

impl Cursor {
    pub(crate) fn open(
        store: ObjectStore,
        records: Vec<Record>,
        direction: Direction,
    ) -> Request<Option<Cursor>> {
        let request = store.read_request();
        if records.is_empty() {
            request.succeed_later(None);
            return request;
        }
        let cursor = Self {
            state: Rc::new(RefCell::new(State {
                store,
                direction,
                records,
                position: 0,
                request: request.clone(),
                awaiting: false,
            })),
        };
        cursor.fire();
        request
    }

    /// Iteration order.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.state.borrow().direction
    }

    /// The store this cursor walks.
    #[must_use]
    pub fn store(&self) -> ObjectStore {
        self.state.borrow().store.clone()
    }

    /// The request that fires after each move.
    #[must_use]
    pub fn request(&self) -> Request<Option<Cursor>> {
        self.state.borrow().request.clone()
    }

    /// Whether the cursor has moved past the last record.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        let state = self.state.borrow();
        state.position >= state.records.len()
    }

    /// Key of the current record, `None` once finished.
    #[must_use]
    pub fn key(&self) -> Option<Key> {
        let state = self.state.borrow();
        let (key, _) = state.records.get(state.position)?;
        decode_key(key).ok()
    }

    /// Primary key of the current record. Identical to [`Cursor::key`] for
    /// object store cursors.
    #[must_use]
    pub fn primary_key(&self) -> Option<Key> {
        self.key()
    }

    /// Value of the current record, `None` once finished.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the value does not decode as `V`.
    pub fn value<V: DeserializeOwned>(&self) -> CoreResult<Option<V>> {
        let state = self.state.borrow();
        let Some((_, value)) = state.records.get(state.position) else {
            return Ok(None);
        };
        state.store.db().value_format().decode(value).map(Some)
    }

    /// Moves to the next record, or with `key`, to the first later record
    /// at or beyond `key` in the cursor's direction. The cursor's request
    /// fires again with the cursor, or `None` if nothing is left.
    ///
    /// # Errors
    ///
    /// - `InvalidStateError` if the cursor is finished or already moving
    /// - `DataError` if `key` is not past the current key
    /// - the store's transaction state error
    pub fn continue_(&self, key: Option<Key>) -> CoreResult<()> {
        self.check_movable()?;
        {
            let mut state = self.state.borrow_mut();
            match key {
                None => state.position += 1,
                Some(target) => {
                    let target = encode_key(&target)?;
                    let reverse = state.direction.is_reverse();
                    let current = &state.records[state.position].0;
                    let behind = if reverse {
                        target >= *current
                    } else {
                        target <= *current
                    };
                    if behind {
                        return Err(CoreError::data(
                            "continue key must lie beyond the current key",
                        ));
                    }
                    let start = state.position + 1;
                    let skip = state.records[start..].partition_point(|(k, _)| {
                        if reverse {
                            *k > target
                        } else {
                            *k < target
                        }
                    });
                    state.position = start + skip;
                }
            }
        }
        self.fire();
        Ok(())
    }

    /// Moves forward exactly `count` records, then fires like
    /// [`Cursor::continue_`].
    ///
    /// # Errors
    ///
    /// Returns a `TypeError` for a zero count, otherwise as
    /// [`Cursor::continue_`].
    pub fn advance(&self, count: u32) -> CoreResult<()> {
        if count == 0 {
            return Err(CoreError::type_error("advance count must be at least 1"));
        }
        self.check_movable()?;
        {
            let mut state = self.state.borrow_mut();
            let len = state.records.len();
            state.position = state.position.saturating_add(count as usize).min(len);
        }
        self.fire();
        Ok(())
    }

    /// Replaces the current record's value.
    ///
    /// # Errors
    ///
    /// - `InvalidStateError` if the cursor is finished or moving
    /// - `DataError` if the store's key path yields a different key
    /// - errors from [`ObjectStore::put`]
    pub fn update<V: Serialize + ?Sized>(&self, value: &V) -> CoreResult<Request<Key>> {
        let (store, key) = self.current()?;
        store.replace_at(value, &key)
    }

    /// Deletes the current record.
    ///
    /// # Errors
    ///
    /// As [`Cursor::update`].
    pub fn delete(&self) -> CoreResult<Request<()>> {
        let (store, key) = self.current()?;
        store.delete(key)
    }

    fn current(&self) -> CoreResult<(ObjectStore, Key)> {
        let state = self.state.borrow();
        if state.awaiting {
            return Err(CoreError::invalid_state("cursor is moving"));
        }
        let (key, _) = state
            .records
            .get(state.position)
            .ok_or_else(|| CoreError::invalid_state("cursor is finished"))?;
        Ok((state.store.clone(), decode_key(key)?))
    }

    fn check_movable(&self) -> CoreResult<()> {
        let state = self.state.borrow();
        state.store.check_readable()?;
        if state.position >= state.records.len() {
            return Err(CoreError::invalid_state("cursor is finished"));
        }
        if state.awaiting {
            return Err(CoreError::invalid_state("cursor is already moving"));
        }
        Ok(())
    }

    fn fire(&self) {
        let (request, scheduler) = {
            let mut state = self.state.borrow_mut();
            state.awaiting = true;
            (state.request.clone(), state.store.db().scheduler().clone())
        };
        request.rearm();
        let cursor = self.clone();
        scheduler.schedule(move || {
            let (request, alive) = {
                let mut state = cursor.state.borrow_mut();
                state.awaiting = false;
                (
                    state.request.clone(),
                    state.position < state.records.len(),
                )
            };
            request.succeed(alive.then(|| cursor.clone()));
        });
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Cursor")
            .field("store", &state.store.name())
            .field("direction", &state.direction)
            .field("position", &state.position)
            .field("len", &state.records.len())
            .finish()
    }
}
