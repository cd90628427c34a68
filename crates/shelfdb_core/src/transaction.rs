//! Transactions.
//!
//! A transaction queues its writes in memory and hands them to the backend
//! as one atomic batch on commit. It commits on its own once none of the
//! requests it issued is still pending, checked on the task queued when it
//! was created and again after each of its requests has been handled, so a
//! success handler can keep issuing work (moving a cursor, writing what it
//! just read) and the transaction stays open for it.
//!
//! Reads inside a transaction go straight to the backend and do not see
//! the transaction's own queued writes. `add` is the exception: its
//! uniqueness check consults the queue first.

use crate::backend::WriteOp;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::object_store::ObjectStore;
use crate::request::{PendingWork, Request, Scheduler};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// What a transaction may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only; every mutation fails with `ReadOnlyError`.
    ReadOnly,
    /// Reads and writes on the stores in scope.
    ReadWrite,
    /// Schema changes during an upgrade; every store is in scope.
    VersionChange,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "readonly",
            Self::ReadWrite => "readwrite",
            Self::VersionChange => "versionchange",
        })
    }
}

/// Lifecycle of a transaction. `Active` is the only state that accepts work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting operations.
    Active,
    /// Writes are durable.
    Committed,
    /// Writes were discarded.
    Aborted,
}

type Completion = Box<dyn FnOnce(Option<Rc<CoreError>>)>;
type Listener = Rc<dyn Fn(&Transaction)>;

struct State {
    status: TransactionState,
    ops: Vec<WriteOp>,
    completions: Vec<Completion>,
    on_complete: Option<Listener>,
    on_abort: Option<Listener>,
    error: Option<Rc<CoreError>>,
    outstanding: usize,
}

struct Inner {
    id: u64,
    db: Database,
    mode: TransactionMode,
    scope: Vec<String>,
    state: RefCell<State>,
}

/// A unit of atomic work over a set of object stores.
///
/// Clones refer to the same transaction.
#[derive(Clone)]
pub struct Transaction {
    inner: Rc<Inner>,
}

impl Transaction {
    pub(crate) fn new(db: Database, scope: Vec<String>, mode: TransactionMode) -> Self {
        let id = db.next_transaction_id();
        tracing::trace!(txid = id, %mode, ?scope, "transaction started");
        Self {
            inner: Rc::new(Inner {
                id,
                db,
                mode,
                scope,
                state: RefCell::new(State {
                    status: TransactionState::Active,
                    ops: Vec::new(),
                    completions: Vec::new(),
                    on_complete: None,
                    on_abort: None,
                    error: None,
                    outstanding: 0,
                }),
            }),
        }
    }

    /// Identifier, unique within the database handle.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The transaction mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.inner.mode
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.inner.state.borrow().status
    }

    /// Whether the transaction still accepts work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Names of the stores in scope. Empty for version-change transactions,
    /// which may touch every store.
    #[must_use]
    pub fn scope(&self) -> &[String] {
        &self.inner.scope
    }

    /// The database this transaction belongs to.
    #[must_use]
    pub fn db(&self) -> Database {
        self.inner.db.clone()
    }

    /// Why the transaction aborted, if it did.
    #[must_use]
    pub fn error(&self) -> Option<Rc<CoreError>> {
        self.inner.state.borrow().error.clone()
    }

    /// Number of writes queued and not yet committed.
    #[must_use]
    pub fn queued_ops(&self) -> usize {
        self.inner.state.borrow().ops.len()
    }

    /// Sets the handler run after a successful commit.
    pub fn on_complete(&self, handler: impl Fn(&Transaction) + 'static) {
        self.inner.state.borrow_mut().on_complete = Some(Rc::new(handler));
    }

    /// Sets the handler run after an abort.
    pub fn on_abort(&self, handler: impl Fn(&Transaction) + 'static) {
        self.inner.state.borrow_mut().on_abort = Some(Rc::new(handler));
    }

    /// Opens a store view bound to this transaction.
    ///
    /// # Errors
    ///
    /// Returns a `NotFoundError` if the store is not in scope or no longer
    /// exists, or the transaction's state error if it has finished.
    pub fn object_store(&self, name: &str) -> CoreResult<ObjectStore> {
        self.ensure_active()?;
        let in_scope = self.inner.mode == TransactionMode::VersionChange
            || self.inner.scope.iter().any(|s| s == name);
        if !in_scope {
            return Err(CoreError::store_not_found(name));
        }
        let schema = self
            .inner
            .db
            .store_schema(name)
            .ok_or_else(|| CoreError::store_not_found(name))?;
        Ok(ObjectStore::new(self.db(), schema, Some(self.clone())))
    }

    /// Writes every queued operation to the backend as one batch, then
    /// resolves the pending requests in the order they were made and fires
    /// `on_complete`.
    ///
    /// Committing an aborted transaction does nothing.
    ///
    /// # Errors
    ///
    /// Returns `TransactionInactiveError` if already committed. If the
    /// backend write fails the transaction aborts, its requests are
    /// rejected, and an `AbortError` describing the failure is returned.
    pub fn commit(&self) -> CoreResult<()> {
        let (ops, completions) = {
            let mut state = self.inner.state.borrow_mut();
            match state.status {
                TransactionState::Aborted => return Ok(()),
                TransactionState::Committed => return Err(CoreError::TransactionInactive),
                TransactionState::Active => {}
            }
            (
                std::mem::take(&mut state.ops),
                std::mem::take(&mut state.completions),
            )
        };

        let written = self.inner.db.backend_mut().apply_batch(ops);
        match written {
            Ok(written) => {
                self.inner.state.borrow_mut().status = TransactionState::Committed;
                tracing::debug!(txid = self.inner.id, ops = written, "transaction committed");
                for completion in completions {
                    completion(None);
                }
                self.notify(|state| state.on_complete.clone());
                Ok(())
            }
            Err(e) => {
                tracing::warn!(txid = self.inner.id, error = %e, "commit failed, aborting");
                let message = format!("commit failed: {e}");
                self.finish_aborted(CoreError::aborted(message.clone()), completions);
                Err(CoreError::aborted(message))
            }
        }
    }

    /// Discards every queued operation, rejects the pending requests with
    /// `AbortError` and fires `on_abort`.
    ///
    /// Aborting twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidStateError` if the transaction already committed.
    pub fn abort(&self) -> CoreResult<()> {
        let completions = {
            let mut state = self.inner.state.borrow_mut();
            match state.status {
                TransactionState::Committed => {
                    return Err(CoreError::invalid_state(
                        "cannot abort a committed transaction",
                    ))
                }
                TransactionState::Aborted => return Ok(()),
                TransactionState::Active => {}
            }
            state.ops.clear();
            std::mem::take(&mut state.completions)
        };
        tracing::debug!(txid = self.inner.id, "transaction aborted");
        self.finish_aborted(CoreError::aborted("transaction was aborted"), completions);
        Ok(())
    }

    fn finish_aborted(&self, reason: CoreError, completions: Vec<Completion>) {
        let reason = Rc::new(reason);
        {
            let mut state = self.inner.state.borrow_mut();
            state.status = TransactionState::Aborted;
            state.error = Some(Rc::clone(&reason));
        }
        for completion in completions {
            completion(Some(Rc::clone(&reason)));
        }
        self.notify(|state| state.on_abort.clone());
    }

    fn notify(&self, pick: fn(&State) -> Option<Listener>) {
        let txn = self.clone();
        self.inner.db.scheduler().schedule(move || {
            let listener = pick(&txn.inner.state.borrow());
            if let Some(listener) = listener {
                listener(&txn);
            }
        });
    }

    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        match self.state() {
            TransactionState::Active => Ok(()),
            TransactionState::Aborted => Err(CoreError::aborted("transaction was aborted")),
            TransactionState::Committed => Err(CoreError::TransactionInactive),
        }
    }

    pub(crate) fn ensure_writable(&self, operation: &'static str) -> CoreResult<()> {
        self.ensure_active()?;
        if self.inner.mode == TransactionMode::ReadOnly {
            return Err(CoreError::ReadOnly { operation });
        }
        Ok(())
    }

    /// Queues a commit that runs if, by the time it is reached, the
    /// transaction is still active and has no request in flight.
    pub(crate) fn schedule_auto_commit(&self) {
        if self.inner.mode == TransactionMode::VersionChange {
            return;
        }
        let txn = self.clone();
        self.inner.db.scheduler().schedule(move || {
            let idle = {
                let state = txn.inner.state.borrow();
                state.status == TransactionState::Active && state.outstanding == 0
            };
            if idle {
                if let Err(e) = txn.commit() {
                    tracing::debug!(txid = txn.id(), error = %e, "auto-commit failed");
                }
            }
        });
    }

    /// A request whose resolution keeps this transaction open until its
    /// handler has run.
    pub(crate) fn request<T: Clone + 'static>(&self, scheduler: &Scheduler) -> Request<T> {
        Request::holding(scheduler, Rc::new(self.clone()))
    }

    pub(crate) fn enqueue(&self, op: WriteOp) {
        self.inner.state.borrow_mut().ops.push(op);
    }

    /// Registers `request` to resolve with `value` on commit, or be
    /// rejected on abort.
    pub(crate) fn add_request<T: Clone + 'static>(&self, request: &Request<T>, value: T) {
        let request = request.clone();
        self.inner
            .state
            .borrow_mut()
            .completions
            .push(Box::new(move |error| match error {
                None => request.succeed_later(value),
                Some(error) => request.fail_later(error),
            }));
    }

    /// Whether the queued operations leave `key` present (`Some(true)`),
    /// absent (`Some(false)`), or do not touch it (`None`).
    pub(crate) fn pending_state(&self, store: &str, key: &[u8]) -> Option<bool> {
        let state = self.inner.state.borrow();
        state.ops.iter().rev().find_map(|op| match op {
            WriteOp::Put { store: s, key: k, .. } if s == store && k == key => Some(true),
            WriteOp::Delete { store: s, key: k } if s == store && k == key => Some(false),
            WriteOp::DeleteRange { store: s, range } if s == store && range.contains(key) => {
                Some(false)
            }
            WriteOp::Clear { store: s } if s == store => Some(false),
            _ => None,
        })
    }
}

impl PendingWork for Transaction {
    fn started(&self) {
        self.inner.state.borrow_mut().outstanding += 1;
    }

    fn finished(&self) {
        let idle = {
            let mut state = self.inner.state.borrow_mut();
            state.outstanding = state.outstanding.saturating_sub(1);
            state.outstanding == 0 && state.status == TransactionState::Active
        };
        if idle {
            self.schedule_auto_commit();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("state", &self.state())
            .field("scope", &self.inner.scope)
            .finish()
    }
}
