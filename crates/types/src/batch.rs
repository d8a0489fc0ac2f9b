//! Request batches and operation options for the partition store.
//!
//! The queue manager gathers client requests into batches and hands each
//! batch to a partition as a single transaction. The types here carry only
//! what the storage layer needs; transport concerns (deadlines, wakeups)
//! stay above.

use chrono::{DateTime, Utc};

use crate::error::QueueError;
use crate::item::Item;

/// A batch of produce requests. Each request's items are written in order;
/// the store assigns ids and creation stamps in place.
#[derive(Debug, Default)]
pub struct ProduceRequest {
    /// Items to append, metadata and payload supplied by the caller.
    pub items: Vec<Item>,
}

/// One client's completion request within a batch.
///
/// Validation and existence failures are recorded in `err` and terminate
/// this request's remaining ids without disturbing the rest of the batch.
#[derive(Debug, Default)]
pub struct CompleteRequest {
    /// Storage ids of the items to remove.
    pub ids: Vec<Vec<u8>>,
    /// Per-request outcome, set by the store.
    pub err: Option<QueueError>,
}

/// One consumer's slot in a reservation batch.
#[derive(Debug, Default)]
pub struct ReserveRequest {
    /// Identity of the requesting client.
    pub client_id: String,
    /// Number of items this client asked for.
    pub num_requested: usize,
    /// Items handed to this client, filled by the store.
    pub items: Vec<Item>,
}

/// An ordered collection of reservation slots filled in a single scan.
#[derive(Debug, Default)]
pub struct ReserveBatch {
    /// The waiting reservation requests, filled in order.
    pub requests: Vec<ReserveRequest>,
    /// Total number of items requested across all slots.
    pub total: usize,
}

impl ReserveBatch {
    /// Builds a batch from requests, totalling the requested counts.
    #[must_use]
    pub fn new(requests: Vec<ReserveRequest>) -> Self {
        let total = requests.iter().map(|r| r.num_requested).sum();
        Self { requests, total }
    }

    /// Returns an iterator that distributes reserved items to the next
    /// waiting slot.
    pub fn iterator(&mut self) -> SlotIterator<'_> {
        SlotIterator { requests: &mut self.requests, pos: 0 }
    }
}

/// Distributes reserved items across a batch's requests in order.
#[derive(Debug)]
pub struct SlotIterator<'a> {
    requests: &'a mut [ReserveRequest],
    pos: usize,
}

impl SlotIterator<'_> {
    /// Offers an item to the next request with an unfilled slot, cloning it
    /// into that slot on acceptance.
    ///
    /// Returns `false` when every slot is full; the caller must stop handing
    /// out items.
    pub fn offer(&mut self, item: &Item) -> bool {
        while let Some(request) = self.requests.get_mut(self.pos) {
            if request.items.len() < request.num_requested {
                request.items.push(item.clone());
                return true;
            }
            self.pos += 1;
        }
        false
    }
}

/// Options applied to every item reserved in one call.
#[derive(Debug, Clone, Copy)]
pub struct ReserveOptions {
    /// Instant at which the new reservations expire.
    pub reserve_deadline: DateTime<Utc>,
}

/// Pagination options for list operations.
///
/// `pivot` is an inclusive starting key (an item id or a queue name); the
/// scan runs forward from it and returns at most `limit` records.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Inclusive starting key. `None` starts from the first record.
    pub pivot: Option<Vec<u8>>,
    /// Maximum number of records to return.
    pub limit: usize,
}

/// Aggregate statistics computed from a partition's live set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of items in the partition.
    pub total: usize,
    /// Number of items currently reserved.
    pub total_reserved: usize,
    /// Average age of all items.
    pub average_age: chrono::TimeDelta,
    /// Average time until reservation expiry across reserved items.
    /// Negative when leases have already expired.
    pub average_reserved_age: chrono::TimeDelta,
}

impl Default for QueueStats {
    fn default() -> Self {
        Self {
            total: 0,
            total_reserved: 0,
            average_age: chrono::TimeDelta::zero(),
            average_reserved_age: chrono::TimeDelta::zero(),
        }
    }
}
