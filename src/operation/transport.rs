//! Node-to-Node Transport
//!
//! `Transport` is the seam between the dispatch core and the wire.
//! `HttpTransport` speaks the JSON protocol in [`super::protocol`];
//! `LocalTransport` connects services living in the same process, which is
//! how multi-node behaviour is exercised without sockets.

use super::protocol::{
    BackupRequest, BackupResponse, ENDPOINT_BACKUP, ENDPOINT_OPERATION, ExecuteRequest,
    ExecuteResponse,
};
use super::service::OperationService;
use super::types::{BackupOperation, Operation, OperationResponse};
use crate::config::TransportConfig;
use crate::error::{GridError, GridResult};
use crate::membership::types::NodeId;
use crate::membership::view::MembershipView;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Runs `op` on `target` as the partition owner and returns its response.
    async fn execute(&self, target: &NodeId, op: Operation) -> GridResult<OperationResponse>;

    /// Delivers a backup effect to `target`.
    async fn backup(&self, target: &NodeId, op: BackupOperation) -> GridResult<()>;
}

fn transport_error(target: &NodeId, message: impl ToString) -> GridError {
    GridError::Transport {
        target: target.to_string(),
        message: message.to_string(),
    }
}

// ============================================================
// HTTP
// ============================================================

pub struct HttpTransport {
    membership: Arc<MembershipView>,
    http_client: reqwest::Client,
    request_timeout: Duration,
    retry_attempts: usize,
}

impl HttpTransport {
    pub fn new(membership: Arc<MembershipView>, config: &TransportConfig) -> Arc<Self> {
        Arc::new(Self {
            membership,
            http_client: reqwest::Client::new(),
            request_timeout: config.request_timeout(),
            retry_attempts: config.retry_attempts.max(1),
        })
    }

    fn url(&self, target: &NodeId, endpoint: &str) -> GridResult<String> {
        let node = self
            .membership
            .get_member(target)
            .ok_or_else(|| transport_error(target, "unknown member"))?;
        Ok(format!("http://{}{}", node.http_addr, endpoint))
    }

    /// Posts with exponential backoff. With `idempotent == false` only
    /// connection failures are retried, since the request never reached the peer.
    async fn post_with_retry<T: serde::Serialize>(
        &self,
        target: &NodeId,
        url: String,
        payload: &T,
        idempotent: bool,
    ) -> GridResult<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.retry_attempts {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(self.request_timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.retry_attempts || !(idempotent || e.is_connect()) {
                        return Err(transport_error(target, e));
                    }
                    tracing::debug!("Retrying {} after error: {}", url, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(transport_error(target, "retry attempts exhausted"))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, target: &NodeId, op: Operation) -> GridResult<OperationResponse> {
        let url = self.url(target, ENDPOINT_OPERATION)?;
        let resp = self
            .post_with_retry(target, url, &ExecuteRequest { op }, false)
            .await?;

        if !resp.status().is_success() {
            return Err(transport_error(target, format!("status {}", resp.status())));
        }

        let body: ExecuteResponse = resp
            .json()
            .await
            .map_err(|e| transport_error(target, e))?;
        body.outcome
    }

    async fn backup(&self, target: &NodeId, op: BackupOperation) -> GridResult<()> {
        let url = self.url(target, ENDPOINT_BACKUP)?;
        let resp = self
            .post_with_retry(target, url, &BackupRequest { op }, true)
            .await?;

        if !resp.status().is_success() {
            return Err(transport_error(target, format!("status {}", resp.status())));
        }

        let body: BackupResponse = resp
            .json()
            .await
            .map_err(|e| transport_error(target, e))?;
        match body.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ============================================================
// IN-PROCESS
// ============================================================

/// Routes calls straight to registered services in this process.
///
/// Nodes can be disconnected to simulate an unreachable peer; every call to a
/// disconnected node fails with `GridError::Transport`.
#[derive(Default)]
pub struct LocalTransport {
    nodes: DashMap<NodeId, Weak<OperationService>>,
    disconnected: DashSet<NodeId>,
    executed: DashMap<NodeId, AtomicUsize>,
    delivered_backups: DashMap<NodeId, AtomicUsize>,
}

impl LocalTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, service: &Arc<OperationService>) {
        self.nodes
            .insert(service.local_id().clone(), Arc::downgrade(service));
    }

    pub fn disconnect(&self, node: &NodeId) {
        self.disconnected.insert(node.clone());
    }

    pub fn reconnect(&self, node: &NodeId) {
        self.disconnected.remove(node);
    }

    /// Operations executed on `node` on behalf of a remote caller.
    pub fn executed(&self, node: &NodeId) -> usize {
        self.executed
            .get(node)
            .map(|count| count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Backups successfully applied on `node`.
    pub fn delivered_backups(&self, node: &NodeId) -> usize {
        self.delivered_backups
            .get(node)
            .map(|count| count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn resolve(&self, target: &NodeId) -> GridResult<Arc<OperationService>> {
        if self.disconnected.contains(target) {
            return Err(transport_error(target, "node is disconnected"));
        }
        self.nodes
            .get(target)
            .and_then(|entry| entry.value().upgrade())
            .ok_or_else(|| transport_error(target, "node is not registered"))
    }

    fn bump(counters: &DashMap<NodeId, AtomicUsize>, node: &NodeId) {
        counters
            .entry(node.clone())
            .or_default()
            .fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn execute(&self, target: &NodeId, op: Operation) -> GridResult<OperationResponse> {
        let service = self.resolve(target)?;
        Self::bump(&self.executed, target);
        service.execute_as_owner(op).await
    }

    async fn backup(&self, target: &NodeId, op: BackupOperation) -> GridResult<()> {
        let service = self.resolve(target)?;
        service.apply_backup(op).await?;
        Self::bump(&self.delivered_backups, target);
        Ok(())
    }
}
