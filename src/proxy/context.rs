use super::lifecycle::{ProxyLifecycle, ProxyState};
use super::tracker::InvocationTracker;
use crate::config::GridConfig;
use crate::error::GridResult;
use crate::operation::{OperationKind, OperationResponse, OperationService, ServiceKind};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type CloseHook = Box<dyn FnOnce() + Send>;

/// State shared by every client-facing proxy: the lifecycle, the tracking
/// table of outstanding asynchronous calls, and the close hooks.
pub struct ProxyContext {
    name: String,
    service_kind: ServiceKind,
    service: Arc<OperationService>,
    lifecycle: ProxyLifecycle,
    tracker: Arc<InvocationTracker>,
    close_hooks: Mutex<Vec<CloseHook>>,
    call_timeout: Duration,
    drain_timeout: Duration,
}

impl ProxyContext {
    pub fn new(
        service: Arc<OperationService>,
        service_kind: ServiceKind,
        name: &str,
        config: &GridConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            service_kind,
            service,
            lifecycle: ProxyLifecycle::new(name),
            tracker: InvocationTracker::new(),
            close_hooks: Mutex::new(Vec::new()),
            call_timeout: config.call_timeout(),
            drain_timeout: config.close_drain_timeout(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> &Arc<OperationService> {
        &self.service
    }

    pub fn tracker(&self) -> &Arc<InvocationTracker> {
        &self.tracker
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn state(&self) -> ProxyState {
        self.lifecycle.state()
    }

    pub fn ensure_open(&self) -> GridResult<()> {
        self.lifecycle.ensure_open()
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle.is_destroyed()
    }

    pub fn open(&self) -> GridResult<()> {
        if self.lifecycle.open()? {
            tracing::debug!("Proxy '{}' reopened", self.name);
        }
        Ok(())
    }

    /// Runs `hook` once, after the close-time drain.
    pub fn add_close_hook(&self, hook: impl FnOnce() + Send + 'static) {
        self.close_hooks.lock().push(Box::new(hook));
    }

    /// Synchronous call: guards, dispatches and waits up to the call timeout.
    pub async fn call(&self, kind: OperationKind) -> GridResult<OperationResponse> {
        self.ensure_open()?;
        let op = self.service.new_operation(self.service_kind, &self.name, kind);
        self.service.dispatch(op).get(self.call_timeout).await
    }

    /// Closes the proxy. Only the caller that wins the transition drains the
    /// tracked calls and runs the close hooks; everyone else returns at once.
    pub async fn close(&self) -> GridResult<()> {
        if !self.lifecycle.try_close() {
            return Ok(());
        }

        let settled = self.tracker.drain(self.drain_timeout).await?;
        let hooks = std::mem::take(&mut *self.close_hooks.lock());
        for hook in hooks {
            hook();
        }

        tracing::info!(
            "Proxy '{}' closed ({} tracked invocation(s) settled)",
            self.name,
            settled
        );
        Ok(())
    }

    /// Closes, then destroys the container grid-wide with one remote destroy.
    /// Later calls do nothing.
    pub async fn destroy(&self) -> GridResult<()> {
        self.close().await?;
        if !self.lifecycle.try_destroy() {
            return Ok(());
        }

        let op = self.service.new_operation(
            self.service_kind,
            &self.name,
            OperationKind::Destroy { is_local: false },
        );
        self.service.dispatch(op).get(self.call_timeout).await?;

        tracing::info!("Proxy '{}' destroyed", self.name);
        Ok(())
    }
}
