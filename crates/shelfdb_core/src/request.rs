//! Deferred results and the task queue that delivers them.
//!
//! Every operation returns a [`Request`] right away. Its result is filled in
//! by a task on the [`Scheduler`], never synchronously, so handlers attached
//! after the call still observe the outcome. Nothing runs until the host
//! drives the queue with [`Scheduler::run_until_idle`] (or
//! [`Request::wait`]).

use crate::error::{CoreError, CoreResult};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// A single-threaded FIFO queue of deferred tasks.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    queue: Rc<RefCell<VecDeque<Task>>>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a task behind every task already queued.
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Runs the oldest queued task. Returns `false` if the queue was empty.
    pub fn run_once(&self) -> bool {
        // Release the borrow before running: tasks schedule more tasks.
        let task = self.queue.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks queued by the
    /// tasks themselves. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        ran
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Whether a request has resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Waiting for its task to run.
    Pending,
    /// Result or error available.
    Done,
}

type Handler<T> = Rc<dyn Fn(&Request<T>)>;

/// Something kept busy while a request is in flight.
///
/// `started` runs when a resolution is scheduled, `finished` after the
/// resolution's handler has returned.
pub(crate) trait PendingWork {
    fn started(&self);
    fn finished(&self);
}

struct Inner<T> {
    state: ReadyState,
    result: Option<T>,
    error: Option<Rc<CoreError>>,
    on_success: Option<Handler<T>>,
    on_error: Option<Handler<T>>,
    work: Option<Rc<dyn PendingWork>>,
}

/// A handle to the eventual result of an operation.
///
/// Clones refer to the same request. A request resolves once per
/// operation; a cursor request is re-armed by each `continue_` or
/// `advance` and resolves again with the next position.
pub struct Request<T> {
    inner: Rc<RefCell<Inner<T>>>,
    scheduler: Scheduler,
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: Clone + 'static> Request<T> {
    pub(crate) fn new(scheduler: &Scheduler) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: ReadyState::Pending,
                result: None,
                error: None,
                on_success: None,
                on_error: None,
                work: None,
            })),
            scheduler: scheduler.clone(),
        }
    }

    /// Creates a request that keeps `work` busy until each of its
    /// resolutions has been handled.
    pub(crate) fn holding(scheduler: &Scheduler, work: Rc<dyn PendingWork>) -> Self {
        let request = Self::new(scheduler);
        request.inner.borrow_mut().work = Some(work);
        request
    }

    /// Current state.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.inner.borrow().state
    }

    /// Whether the request has resolved.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.ready_state() == ReadyState::Done
    }

    /// The successful result, once resolved.
    #[must_use]
    pub fn result(&self) -> Option<T> {
        self.inner.borrow().result.clone()
    }

    /// The error, if the request failed.
    #[must_use]
    pub fn error(&self) -> Option<Rc<CoreError>> {
        self.inner.borrow().error.clone()
    }

    /// The outcome, once resolved.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<T, Rc<CoreError>>> {
        let inner = self.inner.borrow();
        if inner.state == ReadyState::Pending {
            return None;
        }
        match (&inner.error, &inner.result) {
            (Some(error), _) => Some(Err(Rc::clone(error))),
            (None, Some(value)) => Some(Ok(value.clone())),
            (None, None) => None,
        }
    }

    /// Sets the success handler, replacing any previous one.
    ///
    /// The handler runs each time the request resolves successfully.
    pub fn on_success(&self, handler: impl Fn(&Request<T>) + 'static) {
        self.inner.borrow_mut().on_success = Some(Rc::new(handler));
    }

    /// Sets the error handler, replacing any previous one.
    pub fn on_error(&self, handler: impl Fn(&Request<T>) + 'static) {
        self.inner.borrow_mut().on_error = Some(Rc::new(handler));
    }

    /// Drives the scheduler until this request resolves, then returns its
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns the request's error, or an `InvalidStateError` if the queue
    /// drains while the request is still pending.
    pub fn wait(&self) -> Result<T, Rc<CoreError>> {
        loop {
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            if !self.scheduler.run_once() {
                return Err(Rc::new(CoreError::invalid_state(
                    "request is still pending and no work is queued",
                )));
            }
        }
    }

    /// Resolves with `value` on a later tick.
    pub(crate) fn succeed_later(&self, value: T) {
        self.start_work();
        let request = self.clone();
        self.scheduler.schedule(move || request.succeed(value));
    }

    /// Fails with `error` on a later tick.
    pub(crate) fn fail_later(&self, error: impl Into<Rc<CoreError>>) {
        self.start_work();
        let request = self.clone();
        let error = error.into();
        self.scheduler.schedule(move || request.fail(error));
    }

    /// Resolves with the outcome of `result` on a later tick.
    pub(crate) fn settle_later(&self, result: CoreResult<T>) {
        match result {
            Ok(value) => self.succeed_later(value),
            Err(error) => self.fail_later(error),
        }
    }

    /// Returns a resolved request to pending so it can fire again.
    pub(crate) fn rearm(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.state = ReadyState::Pending;
            inner.result = None;
            inner.error = None;
        }
        self.start_work();
    }

    /// Resolves with `value` now, running the success handler.
    pub(crate) fn succeed(&self, value: T) {
        let handler = {
            let mut inner = self.inner.borrow_mut();
            inner.state = ReadyState::Done;
            inner.result = Some(value);
            inner.error = None;
            inner.on_success.clone()
        };
        if let Some(handler) = handler {
            handler(self);
        }
        self.finish_work();
    }

    fn fail(&self, error: Rc<CoreError>) {
        let handler = {
            let mut inner = self.inner.borrow_mut();
            inner.state = ReadyState::Done;
            inner.result = None;
            inner.error = Some(Rc::clone(&error));
            inner.on_error.clone()
        };
        match handler {
            Some(handler) => handler(self),
            None => tracing::debug!(error = %error, "request failed with no error handler"),
        }
        self.finish_work();
    }

    fn start_work(&self) {
        let work = self.inner.borrow().work.clone();
        if let Some(work) = work {
            work.started();
        }
    }

    fn finish_work(&self) {
        let work = self.inner.borrow().work.clone();
        if let Some(work) = work {
            work.finished();
        }
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Request")
            .field("state", &inner.state)
            .field("failed", &inner.error.is_some())
            .finish_non_exhaustive()
    }
}
