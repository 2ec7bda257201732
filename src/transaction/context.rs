use crate::error::{GridError, GridResult};
use crate::operation::{OperationKind, OperationResponse, OperationService, ServiceKind};

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// One reserve step, waiting for its commit or rollback.
#[derive(Debug, Clone)]
enum TxnStep {
    Offer { reservation_id: u64, value: Value },
    Poll { reservation_id: u64 },
}

impl TxnStep {
    fn reservation_id(&self) -> u64 {
        match self {
            TxnStep::Offer { reservation_id, .. } | TxnStep::Poll { reservation_id } => {
                *reservation_id
            }
        }
    }
}

struct TxnLog {
    state: TransactionState,
    steps: Vec<TxnStep>,
}

/// Client-side bookkeeping of a transaction over one queue.
///
/// Offers reserve an id and only become visible on commit; polls detach the
/// head item right away and hand it back on rollback. Commit and rollback
/// replay the recorded steps against the owner.
pub struct QueueTransaction {
    service: Arc<OperationService>,
    name: String,
    timeout: Duration,
    call_timeout: Duration,
    started: Instant,
    log: Mutex<TxnLog>,
}

impl QueueTransaction {
    pub fn begin(
        service: Arc<OperationService>,
        name: &str,
        timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        tracing::debug!("Transaction on '{}' started (timeout {:?})", name, timeout);
        Self {
            service,
            name: name.to_string(),
            timeout,
            call_timeout,
            started: Instant::now(),
            log: Mutex::new(TxnLog {
                state: TransactionState::Active,
                steps: Vec::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TransactionState {
        self.log.lock().state
    }

    pub fn reservation_ids(&self) -> Vec<u64> {
        self.log.lock().steps.iter().map(TxnStep::reservation_id).collect()
    }

    fn is_expired(&self) -> bool {
        self.started.elapsed() > self.timeout
    }

    fn timeout_error(&self) -> GridError {
        GridError::Timeout {
            waited_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    fn ensure_active(&self) -> GridResult<()> {
        match self.log.lock().state {
            TransactionState::Active => Ok(()),
            state => Err(GridError::illegal_state(format!(
                "transaction on '{}' is {:?}",
                self.name, state
            ))),
        }
    }

    /// Moves `Active -> next` and hands back the recorded steps.
    fn finish(&self, next: TransactionState) -> GridResult<Vec<TxnStep>> {
        let mut log = self.log.lock();
        if log.state != TransactionState::Active {
            return Err(GridError::illegal_state(format!(
                "transaction on '{}' is {:?}",
                self.name, log.state
            )));
        }
        log.state = next;
        Ok(std::mem::take(&mut log.steps))
    }

    fn record(&self, step: TxnStep) {
        self.log.lock().steps.push(step);
    }

    async fn call(&self, kind: OperationKind) -> GridResult<OperationResponse> {
        let op = self.service.new_operation(ServiceKind::Queue, &self.name, kind);
        self.service.dispatch(op).get(self.call_timeout).await
    }

    pub async fn offer(&self, value: Value) -> GridResult<()> {
        self.ensure_active()?;
        if self.is_expired() {
            return Err(self.timeout_error());
        }

        match self.call(OperationKind::TxnReserveId).await? {
            OperationResponse::ReservationId(reservation_id) => {
                tracing::trace!("'{}' reserved offer {}", self.name, reservation_id);
                self.record(TxnStep::Offer {
                    reservation_id,
                    value,
                });
                Ok(())
            }
            other => Err(GridError::unexpected_response("TxnReserveId", other)),
        }
    }

    /// Takes the head item under a reservation. `None` when the queue is empty.
    pub async fn poll(&self) -> GridResult<Option<Value>> {
        self.ensure_active()?;
        if self.is_expired() {
            return Err(self.timeout_error());
        }

        match self.call(OperationKind::TxnReservePoll).await? {
            OperationResponse::Reservation {
                reservation_id,
                item,
            } => {
                tracing::trace!("'{}' reserved poll {}", self.name, reservation_id);
                self.record(TxnStep::Poll { reservation_id });
                Ok(item)
            }
            OperationResponse::Value(None) => Ok(None),
            other => Err(GridError::unexpected_response("TxnReservePoll", other)),
        }
    }

    /// Commits every step in order.
    ///
    /// Past the deadline the steps are rolled back instead and `Timeout` is
    /// returned. If a commit fails midway, the steps not yet committed are
    /// rolled back and the first failure is returned.
    pub async fn commit(&self) -> GridResult<()> {
        if self.is_expired() {
            let steps = self.finish(TransactionState::RolledBack)?;
            tracing::warn!(
                "Transaction on '{}' expired with {} reservation(s); rolling back",
                self.name,
                steps.len()
            );
            self.rollback_steps(steps).await;
            return Err(self.timeout_error());
        }

        let steps = self.finish(TransactionState::Committed)?;
        let mut pending = steps.into_iter();

        while let Some(step) = pending.next() {
            let kind = match &step {
                TxnStep::Offer {
                    reservation_id,
                    value,
                } => OperationKind::TxnCommitOffer {
                    reservation_id: *reservation_id,
                    value: value.clone(),
                },
                TxnStep::Poll { reservation_id } => OperationKind::TxnCommitPoll {
                    reservation_id: *reservation_id,
                },
            };

            if let Err(e) = self.call(kind).await {
                tracing::warn!(
                    "Commit of reservation {} on '{}' failed: {}",
                    step.reservation_id(),
                    self.name,
                    e
                );
                self.log.lock().state = TransactionState::RolledBack;
                self.rollback_steps(pending.collect()).await;
                return Err(e);
            }
        }

        tracing::debug!("Transaction on '{}' committed", self.name);
        Ok(())
    }

    pub async fn rollback(&self) -> GridResult<()> {
        let steps = self.finish(TransactionState::RolledBack)?;
        self.rollback_steps(steps).await;
        tracing::debug!("Transaction on '{}' rolled back", self.name);
        Ok(())
    }

    /// Newest first, so detached items return to the head in their original order.
    async fn rollback_steps(&self, steps: Vec<TxnStep>) {
        for step in steps.into_iter().rev() {
            let reservation_id = step.reservation_id();
            if let Err(e) = self.call(OperationKind::TxnRollback { reservation_id }).await {
                tracing::warn!(
                    "Rollback of reservation {} on '{}' failed: {}",
                    reservation_id,
                    self.name,
                    e
                );
            }
        }
    }
}
