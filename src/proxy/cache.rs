use super::context::ProxyContext;
use super::lifecycle::ProxyState;
use super::tracker::CompletionListener;
use crate::config::GridConfig;
use crate::error::{GridError, GridResult};
use crate::invocation::InvocationFuture;
use crate::operation::{OperationKind, OperationResponse, OperationService, ServiceKind};

use serde_json::Value;
use std::sync::Arc;

/// Client-facing handle to one distributed cache.
pub struct CacheProxy {
    ctx: ProxyContext,
}

impl CacheProxy {
    pub fn new(service: Arc<OperationService>, name: &str, config: &GridConfig) -> Arc<Self> {
        Arc::new(Self {
            ctx: ProxyContext::new(service, ServiceKind::Cache, name, config),
        })
    }

    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    pub async fn get(&self, key: &str) -> GridResult<Option<Value>> {
        let kind = OperationKind::CacheGet {
            key: key.to_string(),
        };
        expect_value("CacheGet", self.ctx.call(kind).await?)
    }

    /// Stores `value` and returns the previous one.
    pub async fn put(&self, key: &str, value: Value) -> GridResult<Option<Value>> {
        let kind = OperationKind::CachePut {
            key: key.to_string(),
            value,
        };
        expect_value("CachePut", self.ctx.call(kind).await?)
    }

    pub async fn remove(&self, key: &str) -> GridResult<Option<Value>> {
        let kind = OperationKind::CacheRemove {
            key: key.to_string(),
        };
        expect_value("CacheRemove", self.ctx.call(kind).await?)
    }

    pub async fn contains_key(&self, key: &str) -> GridResult<bool> {
        let kind = OperationKind::CacheContainsKey {
            key: key.to_string(),
        };
        match self.ctx.call(kind).await? {
            OperationResponse::Bool(found) => Ok(found),
            other => Err(GridError::unexpected_response("CacheContainsKey", other)),
        }
    }

    pub async fn size(&self) -> GridResult<usize> {
        match self.ctx.call(OperationKind::CacheSize).await? {
            OperationResponse::Size(size) => Ok(size),
            other => Err(GridError::unexpected_response("CacheSize", other)),
        }
    }

    /// Starts a bulk load through the owner's `CacheLoader` and returns at once.
    ///
    /// The call is tracked until it completes; `close()` waits for it. The
    /// listener hears the outcome exactly once, including a drain timeout.
    pub fn load_all(
        &self,
        keys: Vec<String>,
        replace_existing: bool,
        listener: Option<Arc<dyn CompletionListener>>,
    ) -> GridResult<InvocationFuture> {
        self.ctx.ensure_open()?;

        let service = self.ctx.service();
        let op = service.new_operation(
            ServiceKind::Cache,
            self.ctx.name(),
            OperationKind::CacheLoadAll {
                keys,
                replace_existing,
            },
        );

        let future = InvocationFuture::new();
        self.ctx.tracker().track(&future, listener)?;
        // A close that published between the first check and `track` may
        // already have taken its snapshot.
        if let Err(e) = self.ctx.ensure_open() {
            future.complete(Err(e.clone()));
            return Err(e);
        }
        service.submit(op, future.clone());
        Ok(future)
    }

    /// Asynchronous calls still outstanding.
    pub fn tracked_count(&self) -> usize {
        self.ctx.tracker().len()
    }

    pub fn add_close_hook(&self, hook: impl FnOnce() + Send + 'static) {
        self.ctx.add_close_hook(hook);
    }

    pub fn state(&self) -> ProxyState {
        self.ctx.state()
    }

    pub fn open(&self) -> GridResult<()> {
        self.ctx.open()
    }

    pub async fn close(&self) -> GridResult<()> {
        self.ctx.close().await
    }

    pub async fn destroy(&self) -> GridResult<()> {
        self.ctx.destroy().await
    }

    pub fn is_closed(&self) -> bool {
        self.ctx.is_closed()
    }

    pub fn is_destroyed(&self) -> bool {
        self.ctx.is_destroyed()
    }

    pub fn ensure_open(&self) -> GridResult<()> {
        self.ctx.ensure_open()
    }
}

fn expect_value(kind: &str, response: OperationResponse) -> GridResult<Option<Value>> {
    match response {
        OperationResponse::Value(value) => Ok(value),
        other => Err(GridError::unexpected_response(kind, other)),
    }
}
