//! The item record stored in a partition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of work stored in a partition.
///
/// Producers supply the metadata and payload; the store assigns `id` and
/// `created_at` at first persistence and flips `is_reserved` as consumers
/// lease the item. `dead_deadline`, `attempts`, and `max_attempts` are
/// computed and interpreted by the queue manager above the store; they are
/// persisted verbatim here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Sortable storage identifier, assigned by the store. Empty until the
    /// item is first persisted; unique within its partition.
    pub id: Vec<u8>,

    /// True while a consumer holds a reservation on this item.
    pub is_reserved: bool,

    /// When the current reservation expires. Meaningful only while
    /// `is_reserved` is set.
    #[serde(with = "chrono::serde::ts_nanoseconds_option")]
    pub reserve_deadline: Option<DateTime<Utc>>,

    /// When the item is considered dead and eligible for dead-letter
    /// handling.
    #[serde(with = "chrono::serde::ts_nanoseconds_option")]
    pub dead_deadline: Option<DateTime<Utc>>,

    /// Number of reservations that did not complete.
    pub attempts: u32,

    /// Upper bound on `attempts` before dead-letter handling applies.
    pub max_attempts: u32,

    /// User-supplied reference, such as an owner or account tag.
    pub reference: String,

    /// User-specified encoding of the payload.
    pub encoding: String,

    /// User-specified kind of the payload, for dispatch before decoding.
    pub kind: String,

    /// The payload itself. Opaque to the store.
    pub payload: Vec<u8>,

    /// When the store first persisted this item. Set once, never updated.
    #[serde(with = "chrono::serde::ts_nanoseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
}
