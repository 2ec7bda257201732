use crate::error::{GridError, GridResult};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: u64,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
enum Reservation {
    /// Room for an item that appears on commit.
    Offer,
    /// An item detached from the queue until commit (gone) or rollback (restored at head).
    Poll(QueueItem),
}

/// Items and open reservations of one queue in one partition.
///
/// Item ids and reservation ids come from the same counter, so an offer
/// committed under reservation `r` becomes item `r`. The counter only ever
/// advances on the owner's partition thread.
pub struct QueueContainer {
    name: String,
    capacity: Option<usize>,
    items: VecDeque<QueueItem>,
    reservations: BTreeMap<u64, Reservation>,
    id_gen: AtomicU64,
    /// Highest id learned from backups; an owner never reissues an id at or below it.
    highest_seen: u64,
}

impl QueueContainer {
    pub fn new(name: &str, capacity: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            capacity,
            items: VecDeque::new(),
            reservations: BTreeMap::new(),
            id_gen: AtomicU64::new(1),
            highest_seen: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.id_gen.fetch_max(self.highest_seen + 1, Ordering::SeqCst);
        self.id_gen.fetch_add(1, Ordering::SeqCst)
    }

    fn note_seen(&mut self, id: u64) {
        self.highest_seen = self.highest_seen.max(id);
    }

    fn pending_offers(&self) -> usize {
        self.reservations
            .values()
            .filter(|reservation| matches!(reservation, Reservation::Offer))
            .count()
    }

    fn ensure_capacity(&self, kind: &str) -> GridResult<()> {
        match self.capacity {
            Some(capacity) if self.items.len() + self.pending_offers() >= capacity => Err(
                GridError::owner_execution(kind, &self.name, format!("queue is full ({} items)", capacity)),
            ),
            _ => Ok(()),
        }
    }

    fn contains_item(&self, id: u64) -> bool {
        self.items.iter().any(|item| item.id == id)
    }

    fn violation(&self, reservation_id: u64) -> GridError {
        GridError::ReservationProtocolViolation {
            name: self.name.clone(),
            reservation_id,
        }
    }

    pub fn offer(&mut self, value: Value) -> GridResult<u64> {
        self.ensure_capacity("QueueOffer")?;
        let id = self.next_id();
        self.items.push_back(QueueItem { id, value });
        Ok(id)
    }

    pub fn poll(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn values(&self) -> Vec<Value> {
        self.items.iter().map(|item| item.value.clone()).collect()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    // --- Transactional steps (owner) ---

    pub fn reserve_offer(&mut self) -> GridResult<u64> {
        self.ensure_capacity("TxnReserveId")?;
        let reservation_id = self.next_id();
        self.reservations.insert(reservation_id, Reservation::Offer);
        Ok(reservation_id)
    }

    /// Detaches the head item. `None` when the queue is empty; no id is consumed then.
    pub fn reserve_poll(&mut self) -> Option<(u64, QueueItem)> {
        let item = self.items.pop_front()?;
        let reservation_id = self.next_id();
        self.reservations
            .insert(reservation_id, Reservation::Poll(item.clone()));
        Some((reservation_id, item))
    }

    pub fn commit_offer(&mut self, reservation_id: u64, value: Value) -> GridResult<u64> {
        match self.reservations.remove(&reservation_id) {
            Some(Reservation::Offer) => {
                self.items.push_back(QueueItem {
                    id: reservation_id,
                    value,
                });
                Ok(reservation_id)
            }
            Some(other) => {
                self.reservations.insert(reservation_id, other);
                Err(self.violation(reservation_id))
            }
            None => Err(self.violation(reservation_id)),
        }
    }

    pub fn commit_poll(&mut self, reservation_id: u64) -> GridResult<QueueItem> {
        match self.reservations.remove(&reservation_id) {
            Some(Reservation::Poll(item)) => Ok(item),
            Some(other) => {
                self.reservations.insert(reservation_id, other);
                Err(self.violation(reservation_id))
            }
            None => Err(self.violation(reservation_id)),
        }
    }

    /// Releases a reservation. A detached item goes back to the head of the queue.
    pub fn rollback(&mut self, reservation_id: u64) -> GridResult<Option<QueueItem>> {
        match self.reservations.remove(&reservation_id) {
            Some(Reservation::Poll(item)) => {
                self.items.push_front(item.clone());
                Ok(Some(item))
            }
            Some(Reservation::Offer) => Ok(None),
            None => Err(self.violation(reservation_id)),
        }
    }

    // --- Backup side ---

    pub fn apply_offer(&mut self, item_id: u64, value: Value) {
        self.note_seen(item_id);
        if !self.contains_item(item_id) {
            self.items.push_back(QueueItem { id: item_id, value });
        }
    }

    pub fn apply_poll(&mut self, item_id: u64) {
        self.items.retain(|item| item.id != item_id);
    }

    pub fn apply_reserve_offer(&mut self, reservation_id: u64) {
        self.note_seen(reservation_id);
        self.reservations
            .entry(reservation_id)
            .or_insert(Reservation::Offer);
    }

    pub fn apply_reserve(&mut self, reservation_id: u64, item_id: u64) {
        self.note_seen(reservation_id);
        if self.reservations.contains_key(&reservation_id) {
            return;
        }
        match self.items.iter().position(|item| item.id == item_id) {
            Some(index) => {
                if let Some(item) = self.items.remove(index) {
                    self.reservations
                        .insert(reservation_id, Reservation::Poll(item));
                }
            }
            None => {
                tracing::warn!(
                    "Backup of '{}' has no item {} for reservation {}",
                    self.name,
                    item_id,
                    reservation_id
                );
            }
        }
    }

    pub fn apply_commit_offer(&mut self, reservation_id: u64, value: Value) {
        self.reservations.remove(&reservation_id);
        self.apply_offer(reservation_id, value);
    }

    pub fn apply_commit_poll(&mut self, reservation_id: u64) {
        self.reservations.remove(&reservation_id);
    }

    pub fn apply_rollback(&mut self, reservation_id: u64) {
        if let Some(Reservation::Poll(item)) = self.reservations.remove(&reservation_id) {
            if !self.contains_item(item.id) {
                self.items.push_front(item);
            }
        }
    }
}
