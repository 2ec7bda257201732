use crate::error::{GridError, GridResult};
use crate::invocation::{InvocationFuture, InvocationHandle};
use crate::operation::OperationResponse;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Receives the outcome of a tracked asynchronous call, exactly once.
pub trait CompletionListener: Send + Sync {
    fn on_response(&self, response: OperationResponse);
    fn on_failure(&self, error: GridError);
}

struct Tracked {
    future: InvocationFuture,
    listener: Option<Arc<dyn CompletionListener>>,
}

/// Outstanding asynchronous calls of one proxy, keyed by invocation handle.
///
/// An entry is settled by whoever removes it first: its own completion
/// callback, or the close-time drain. Only the remover notifies the listener.
#[derive(Default)]
pub struct InvocationTracker {
    entries: DashMap<InvocationHandle, Tracked>,
}

impl InvocationTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracks `future` and settles it when it completes.
    ///
    /// Must be called before the operation behind `future` is submitted.
    pub fn track(
        self: &Arc<Self>,
        future: &InvocationFuture,
        listener: Option<Arc<dyn CompletionListener>>,
    ) -> GridResult<()> {
        let handle = future.handle();
        self.entries.insert(
            handle,
            Tracked {
                future: future.clone(),
                listener,
            },
        );

        let tracker = self.clone();
        let registered = future.on_complete(move |result| {
            tracker.settle(handle, result);
        });
        if registered.is_err() {
            self.entries.remove(&handle);
        }
        registered
    }

    /// Removes the entry and notifies its listener. No-op if already settled.
    pub fn settle(&self, handle: InvocationHandle, result: GridResult<OperationResponse>) -> bool {
        let Some((_, tracked)) = self.entries.remove(&handle) else {
            return false;
        };

        if let Some(listener) = tracked.listener {
            match result {
                Ok(response) => listener.on_response(response),
                Err(error) => listener.on_failure(error),
            }
        }
        true
    }

    /// Waits up to `timeout` on each tracked call and settles it.
    ///
    /// A timeout or failure of one call is handed to its listener and the drain
    /// moves on. A fatal outcome stops the drain and is returned.
    pub async fn drain(&self, timeout: Duration) -> GridResult<usize> {
        let snapshot: Vec<(InvocationHandle, InvocationFuture)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().future.clone()))
            .collect();

        tracing::debug!("Draining {} tracked invocation(s)", snapshot.len());

        let mut settled = 0;
        for (handle, future) in snapshot {
            let result = future.get(timeout).await;
            if let Err(err) = &result {
                if err.is_fatal() {
                    tracing::error!("Tracked {:?} failed fatally: {}", handle, err);
                    return Err(err.clone());
                }
                tracing::warn!("Tracked {:?} did not complete cleanly: {}", handle, err);
            }
            if self.settle(handle, result) {
                settled += 1;
            }
        }

        Ok(settled)
    }
}
