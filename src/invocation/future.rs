use crate::error::{GridError, GridResult};
use crate::operation::types::OperationResponse;

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identity of one invocation. Unique per process, unlike operation ids,
/// which are only unique per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationHandle(u64);

type Outcome = Option<GridResult<OperationResponse>>;

struct Inner {
    handle: InvocationHandle,
    outcome: watch::Sender<Outcome>,
    callback_registered: AtomicBool,
    callback_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to an outstanding operation dispatch.
///
/// Clones share one completion state. Completion happens at most once; later
/// attempts are ignored.
#[derive(Clone)]
pub struct InvocationFuture {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for InvocationFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationFuture")
            .field("handle", &self.inner.handle)
            .field("done", &self.is_done())
            .finish()
    }
}

impl Default for InvocationFuture {
    fn default() -> Self {
        Self::new()
    }
}

impl InvocationFuture {
    pub fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                handle: InvocationHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)),
                outcome,
                callback_registered: AtomicBool::new(false),
                callback_task: Mutex::new(None),
            }),
        }
    }

    /// A future that is already complete.
    pub fn completed(result: GridResult<OperationResponse>) -> Self {
        let future = Self::new();
        future.complete(result);
        future
    }

    pub fn handle(&self) -> InvocationHandle {
        self.inner.handle
    }

    /// Publishes the outcome. Returns `false` if the future was already complete.
    pub fn complete(&self, result: GridResult<OperationResponse>) -> bool {
        self.inner.outcome.send_if_modified(move |outcome| {
            if outcome.is_some() {
                return false;
            }
            *outcome = Some(result);
            true
        })
    }

    pub fn is_done(&self) -> bool {
        self.inner.outcome.borrow().is_some()
    }

    /// The outcome, if the future has completed.
    pub fn try_result(&self) -> Option<GridResult<OperationResponse>> {
        self.inner.outcome.borrow().clone()
    }

    /// Waits up to `timeout` for the outcome.
    ///
    /// Expiry yields `GridError::Timeout` and leaves the operation running; a
    /// later `get` or `join` still sees its outcome.
    pub async fn get(&self, timeout: Duration) -> GridResult<OperationResponse> {
        match tokio::time::timeout(timeout, self.join()).await {
            Ok(result) => result,
            Err(_) => Err(GridError::Timeout {
                waited_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Waits for the outcome without a bound.
    pub async fn join(&self) -> GridResult<OperationResponse> {
        let mut rx = self.inner.outcome.subscribe();
        let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome.clone(),
            // The sender lives in `inner`, which `self` keeps alive.
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(GridError::illegal_state("invocation dropped before completion")))
    }

    /// Registers the single completion callback.
    ///
    /// The callback runs on a Tokio task once the outcome is published, never
    /// on the registering caller's stack. A fatal outcome is not handed to the
    /// callback: it is logged and re-raised as a panic of that task, which
    /// `callback_finished` reports.
    pub fn on_complete<F>(&self, callback: F) -> GridResult<()>
    where
        F: FnOnce(GridResult<OperationResponse>) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| GridError::illegal_state("on_complete requires a running Tokio runtime"))?;

        if self.inner.callback_registered.swap(true, Ordering::AcqRel) {
            return Err(GridError::illegal_state(format!(
                "{:?} already has a completion callback",
                self.inner.handle
            )));
        }

        let future = self.clone();
        let task = runtime.spawn(async move {
            let result = future.join().await;
            if let Err(err) = &result {
                if err.is_fatal() {
                    tracing::error!("{:?} completed with fatal error: {}", future.handle(), err);
                    panic!("{}", err);
                }
            }
            callback(result);
        });
        *self.inner.callback_task.lock() = Some(task);

        Ok(())
    }

    /// Waits for the registered callback task to end.
    ///
    /// A fatal outcome re-raised by that task comes back as its error; a panic
    /// inside the callback itself is `IllegalState`. `Ok` without a callback.
    pub async fn callback_finished(&self) -> GridResult<()> {
        let Some(task) = self.inner.callback_task.lock().take() else {
            return Ok(());
        };

        match task.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_panic() => match self.try_result() {
                Some(Err(err)) if err.is_fatal() => Err(err),
                _ => Err(GridError::illegal_state(format!(
                    "completion callback of {:?} panicked",
                    self.inner.handle
                ))),
            },
            Err(_) => Err(GridError::illegal_state(format!(
                "completion callback of {:?} was cancelled",
                self.inner.handle
            ))),
        }
    }
}
