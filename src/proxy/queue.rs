use super::context::ProxyContext;
use super::lifecycle::ProxyState;
use crate::config::GridConfig;
use crate::error::{GridError, GridResult};
use crate::operation::{OperationKind, OperationResponse, OperationService, ServiceKind};
use crate::transaction::QueueTransaction;

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Client-facing handle to one distributed queue.
pub struct QueueProxy {
    ctx: ProxyContext,
    transaction_timeout: Duration,
}

impl QueueProxy {
    pub fn new(service: Arc<OperationService>, name: &str, config: &GridConfig) -> Arc<Self> {
        Arc::new(Self {
            ctx: ProxyContext::new(service, ServiceKind::Queue, name, config),
            transaction_timeout: config.transaction_timeout(),
        })
    }

    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    pub async fn offer(&self, value: Value) -> GridResult<bool> {
        match self.ctx.call(OperationKind::QueueOffer { value }).await? {
            OperationResponse::Bool(accepted) => Ok(accepted),
            other => Err(GridError::unexpected_response("QueueOffer", other)),
        }
    }

    pub async fn poll(&self) -> GridResult<Option<Value>> {
        match self.ctx.call(OperationKind::QueuePoll).await? {
            OperationResponse::Value(value) => Ok(value),
            other => Err(GridError::unexpected_response("QueuePoll", other)),
        }
    }

    pub async fn peek(&self) -> GridResult<Option<Value>> {
        match self.ctx.call(OperationKind::QueuePeek).await? {
            OperationResponse::Value(value) => Ok(value),
            other => Err(GridError::unexpected_response("QueuePeek", other)),
        }
    }

    pub async fn size(&self) -> GridResult<usize> {
        match self.ctx.call(OperationKind::QueueSize).await? {
            OperationResponse::Size(size) => Ok(size),
            other => Err(GridError::unexpected_response("QueueSize", other)),
        }
    }

    pub fn new_transaction(&self) -> GridResult<QueueTransaction> {
        self.ctx.ensure_open()?;
        Ok(QueueTransaction::begin(
            self.ctx.service().clone(),
            self.ctx.name(),
            self.transaction_timeout,
            self.ctx.call_timeout(),
        ))
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
}
