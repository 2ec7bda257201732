use super::cache::{CacheContainer, CacheLoader};
use super::queue::QueueContainer;
use crate::error::{GridError, GridResult};
use crate::operation::types::{
    BackupKind, BackupOperation, Executed, Operation, OperationKind, OperationResponse,
    ServiceKind,
};
use crate::partition::PartitionId;
use crate::record::{RecordStatistics, now_ms};

use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use serde_json::Value;
use std::sync::Arc;

const PROCESSED_BACKUPS_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerKey {
    pub service: ServiceKind,
    pub name: String,
}

impl ContainerKey {
    pub fn new(service: ServiceKind, name: &str) -> Self {
        Self {
            service,
            name: name.to_string(),
        }
    }
}

pub enum Container {
    Cache(CacheContainer),
    Queue(QueueContainer),
}

/// All containers held by this node, owner and backup copies alike.
///
/// Structure: `Partition ID -> (service, name) -> Container`. Callers are the
/// partition threads, so a given partition is only ever touched by one thread.
pub struct PartitionStore {
    partitions: DashMap<PartitionId, DashMap<ContainerKey, Container>>,
    processed_backups: DashMap<String, u64>,
    loader: Option<Arc<dyn CacheLoader>>,
    queue_capacity: Option<usize>,
}

impl PartitionStore {
    pub fn new(loader: Option<Arc<dyn CacheLoader>>, queue_capacity: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            partitions: DashMap::new(),
            processed_backups: DashMap::new(),
            loader,
            queue_capacity,
        })
    }

    fn partition(&self, id: PartitionId) -> Ref<'_, PartitionId, DashMap<ContainerKey, Container>> {
        if let Some(partition) = self.partitions.get(&id) {
            return partition;
        }
        self.partitions.entry(id).or_default().downgrade()
    }

    fn new_container(&self, key: &ContainerKey) -> Container {
        match key.service {
            ServiceKind::Cache => Container::Cache(CacheContainer::new(&key.name)),
            ServiceKind::Queue => {
                Container::Queue(QueueContainer::new(&key.name, self.queue_capacity))
            }
        }
    }

    /// Runs an operation as the owner of its partition.
    pub fn execute(&self, op: &Operation) -> GridResult<Executed> {
        let key = ContainerKey::new(op.service(), op.name());
        let partition = self.partition(op.partition_id());

        if let OperationKind::Destroy { is_local } = op.kind() {
            let existed = partition.remove(&key).is_some();
            tracing::info!(
                "Destroyed {:?} '{}' in partition {} (existed: {})",
                key.service,
                key.name,
                op.partition_id(),
                existed
            );
            let response = OperationResponse::Bool(existed);
            return Ok(if *is_local {
                Executed::read(response)
            } else {
                Executed::mutated(response, BackupKind::Destroy)
            });
        }

        let mut container = partition
            .entry(key.clone())
            .or_insert_with(|| self.new_container(&key));

        match container.value_mut() {
            Container::Cache(cache) => self.execute_cache(cache, op),
            Container::Queue(queue) => execute_queue(queue, op),
        }
    }

    fn execute_cache(&self, cache: &mut CacheContainer, op: &Operation) -> GridResult<Executed> {
        let executed = match op.kind() {
            OperationKind::CacheGet { key } => {
                Executed::read(OperationResponse::Value(cache.get(key)))
            }
            OperationKind::CachePut { key, value } => {
                let previous = cache.put(key.clone(), value.clone());
                Executed::mutated(
                    OperationResponse::Value(previous),
                    BackupKind::CachePut {
                        key: key.clone(),
                        value: value.clone(),
                    },
                )
            }
            OperationKind::CacheRemove { key } => match cache.remove(key) {
                Some(previous) => Executed::mutated(
                    OperationResponse::Value(Some(previous)),
                    BackupKind::CacheRemove { key: key.clone() },
                ),
                None => Executed::read(OperationResponse::Value(None)),
            },
            OperationKind::CacheContainsKey { key } => {
                Executed::read(OperationResponse::Bool(cache.contains_key(key)))
            }
            OperationKind::CacheSize => Executed::read(OperationResponse::Size(cache.size())),
            OperationKind::CacheLoadAll {
                keys,
                replace_existing,
            } => {
                let loader = self.loader.as_deref().ok_or_else(|| {
                    GridError::owner_execution("CacheLoadAll", op.name(), "no cache loader configured")
                })?;
                let entries = cache.load_all(keys, *replace_existing, loader)?;
                let count = entries.len();
                if entries.is_empty() {
                    Executed::read(OperationResponse::Loaded { count })
                } else {
                    Executed::mutated(
                        OperationResponse::Loaded { count },
                        BackupKind::CachePutAll { entries },
                    )
                }
            }
            other => return Err(unsupported(ServiceKind::Cache, other, op.name())),
        };
        Ok(executed)
    }

    /// Applies a backup effect. Returns `false` when the same backup was already applied here.
    pub fn apply_backup(&self, backup: &BackupOperation) -> GridResult<bool> {
        if !self.should_process(&backup.op_id) {
            tracing::debug!("Skipping replayed backup {} ({})", backup.op_id, backup.kind.label());
            return Ok(false);
        }

        let key = ContainerKey::new(backup.service, &backup.name);
        let partition = self.partition(backup.partition_id);

        if let BackupKind::Destroy = backup.kind {
            partition.remove(&key);
            return Ok(true);
        }

        let mut container = partition
            .entry(key.clone())
            .or_insert_with(|| self.new_container(&key));

        match (container.value_mut(), &backup.kind) {
            (Container::Cache(cache), BackupKind::CachePut { key, value }) => {
                cache.apply_put(key.clone(), value.clone())
            }
            (Container::Cache(cache), BackupKind::CacheRemove { key }) => cache.apply_remove(key),
            (Container::Cache(cache), BackupKind::CachePutAll { entries }) => {
                cache.apply_put_all(entries.clone())
            }
            (Container::Queue(queue), BackupKind::QueueOffer { item_id, value }) => {
                queue.apply_offer(*item_id, value.clone())
            }
            (Container::Queue(queue), BackupKind::QueuePoll { item_id }) => {
                queue.apply_poll(*item_id)
            }
            (Container::Queue(queue), BackupKind::TxnReserveOffer { reservation_id }) => {
                queue.apply_reserve_offer(*reservation_id)
            }
            (
                Container::Queue(queue),
                BackupKind::TxnReserve {
                    reservation_id,
                    item_id,
                },
            ) => queue.apply_reserve(*reservation_id, *item_id),
            (
                Container::Queue(queue),
                BackupKind::TxnCommitOffer {
                    reservation_id,
                    value,
                },
            ) => queue.apply_commit_offer(*reservation_id, value.clone()),
            (Container::Queue(queue), BackupKind::TxnPollBackup { reservation_id }) => {
                queue.apply_commit_poll(*reservation_id)
            }
            (Container::Queue(queue), BackupKind::TxnRollback { reservation_id }) => {
                queue.apply_rollback(*reservation_id)
            }
            (_, kind) => {
                return Err(GridError::illegal_state(format!(
                    "{} does not apply to {:?} '{}'",
                    kind.label(),
                    backup.service,
                    backup.name
                )));
            }
        }

        Ok(true)
    }

    fn should_process(&self, op_id: &str) -> bool {
        if self.processed_backups.contains_key(op_id) {
            return false;
        }
        if self.processed_backups.len() > PROCESSED_BACKUPS_LIMIT {
            self.processed_backups.clear();
        }
        self.processed_backups.insert(op_id.to_string(), now_ms());
        true
    }

    // --- Inspection ---

    pub fn container_count(&self) -> usize {
        self.partitions.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn has_container(&self, service: ServiceKind, name: &str) -> bool {
        let key = ContainerKey::new(service, name);
        self.partitions
            .iter()
            .any(|entry| entry.value().contains_key(&key))
    }

    fn with_container<R>(
        &self,
        service: ServiceKind,
        name: &str,
        f: impl Fn(&Container) -> Option<R>,
    ) -> Option<R> {
        let key = ContainerKey::new(service, name);
        self.partitions.iter().find_map(|entry| {
            let container = entry.value().get(&key)?;
            f(container.value())
        })
    }

    pub fn queue_values(&self, name: &str) -> Option<Vec<Value>> {
        self.with_container(ServiceKind::Queue, name, |container| match container {
            Container::Queue(queue) => Some(queue.values()),
            Container::Cache(_) => None,
        })
    }

    pub fn reservation_count(&self, name: &str) -> usize {
        self.with_container(ServiceKind::Queue, name, |container| match container {
            Container::Queue(queue) => Some(queue.reservation_count()),
            Container::Cache(_) => None,
        })
        .unwrap_or(0)
    }

    pub fn cache_value(&self, name: &str, key: &str) -> Option<Value> {
        self.with_container(ServiceKind::Cache, name, |container| match container {
            Container::Cache(cache) => cache.record(key).map(|record| record.value().clone()),
            Container::Queue(_) => None,
        })
    }

    pub fn record_statistics(&self, name: &str, key: &str) -> Option<RecordStatistics> {
        self.with_container(ServiceKind::Cache, name, |container| match container {
            Container::Cache(cache) => cache.statistics(key),
            Container::Queue(_) => None,
        })
    }

    pub fn cache_cost(&self, name: &str) -> u64 {
        self.with_container(ServiceKind::Cache, name, |container| match container {
            Container::Cache(cache) => Some(cache.total_cost()),
            Container::Queue(_) => None,
        })
        .unwrap_or(0)
    }
}

fn execute_queue(queue: &mut QueueContainer, op: &Operation) -> GridResult<Executed> {
    let executed = match op.kind() {
        OperationKind::QueueOffer { value } => {
            let item_id = queue.offer(value.clone())?;
            Executed::mutated(
                OperationResponse::Bool(true),
                BackupKind::QueueOffer {
                    item_id,
                    value: value.clone(),
                },
            )
        }
        OperationKind::QueuePoll => match queue.poll() {
            Some(item) => Executed::mutated(
                OperationResponse::Value(Some(item.value)),
                BackupKind::QueuePoll { item_id: item.id },
            ),
            None => Executed::read(OperationResponse::Value(None)),
        },
        OperationKind::QueuePeek => Executed::read(OperationResponse::Value(
            queue.peek().map(|item| item.value.clone()),
        )),
        OperationKind::QueueSize => Executed::read(OperationResponse::Size(queue.size())),
        OperationKind::TxnReserveId => {
            let reservation_id = queue.reserve_offer()?;
            Executed::mutated(
                OperationResponse::ReservationId(reservation_id),
                BackupKind::TxnReserveOffer { reservation_id },
            )
        }
        OperationKind::TxnReservePoll => match queue.reserve_poll() {
            Some((reservation_id, item)) => Executed::mutated(
                OperationResponse::Reservation {
                    reservation_id,
                    item: Some(item.value),
                },
                BackupKind::TxnReserve {
                    reservation_id,
                    item_id: item.id,
                },
            ),
            None => Executed::read(OperationResponse::Value(None)),
        },
        OperationKind::TxnCommitOffer {
            reservation_id,
            value,
        } => {
            queue.commit_offer(*reservation_id, value.clone())?;
            Executed::mutated(
                OperationResponse::Done,
                BackupKind::TxnCommitOffer {
                    reservation_id: *reservation_id,
                    value: value.clone(),
                },
            )
        }
        OperationKind::TxnCommitPoll { reservation_id } => {
            let item = queue.commit_poll(*reservation_id)?;
            Executed::mutated(
                OperationResponse::Value(Some(item.value)),
                BackupKind::TxnPollBackup {
                    reservation_id: *reservation_id,
                },
            )
        }
        OperationKind::TxnRollback { reservation_id } => {
            queue.rollback(*reservation_id)?;
            Executed::mutated(
                OperationResponse::Done,
                BackupKind::TxnRollback {
                    reservation_id: *reservation_id,
                },
            )
        }
        other => return Err(unsupported(ServiceKind::Queue, other, op.name())),
    };
    Ok(executed)
}

fn unsupported(service: ServiceKind, kind: &OperationKind, name: &str) -> GridError {
    GridError::owner_execution(
        kind.label(),
        name,
        format!("not supported by the {:?} service", service),
    )
}
