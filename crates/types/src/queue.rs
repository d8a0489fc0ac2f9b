//! Queue configuration records and their validation.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InvalidOptionSnafu, QueueError};

/// Queue names may not begin with this character; the registry's own data
/// file is prefixed with it, which guarantees no partition file can collide.
pub const RESERVED_QUEUE_PREFIX: char = '~';

/// Maximum queue name length in bytes.
pub const MAX_QUEUE_NAME_BYTES: usize = 512;

/// A queue's configuration record, keyed by `name` in the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    /// Queue name, unique in the registry.
    pub name: String,

    /// How long a reservation is held before it expires.
    pub reserve_timeout: Duration,

    /// How long an item may live before it is considered dead. Must be at
    /// least `reserve_timeout`.
    pub dead_timeout: Duration,

    /// Name of the dead-letter queue, if any. Carried through for the queue
    /// manager; the store does not interpret it.
    pub dead_queue: String,

    /// Maximum reservation attempts before dead-letter handling. Carried
    /// through for the queue manager.
    pub max_attempts: u32,

    /// Number of partitions requested for this queue.
    pub requested_partitions: u32,

    /// When the registry first stored this record.
    #[serde(with = "chrono::serde::ts_nanoseconds_option")]
    pub created_at: Option<DateTime<Utc>>,

    /// When the registry last wrote this record.
    #[serde(with = "chrono::serde::ts_nanoseconds_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl QueueInfo {
    /// Applies a field-wise merge: fields of `other` that carry a value
    /// overwrite the corresponding field here. Zero durations, zero counts,
    /// and empty strings in `other` leave the existing value in place.
    ///
    /// The `reserve_timeout <= dead_timeout` invariant is checked by the
    /// registry after the merge, not here, so a partial update can be
    /// rejected with the merged values in hand.
    pub fn update_from(&mut self, other: &QueueInfo) {
        if !other.reserve_timeout.is_zero() {
            self.reserve_timeout = other.reserve_timeout;
        }
        if !other.dead_timeout.is_zero() {
            self.dead_timeout = other.dead_timeout;
        }
        if !other.dead_queue.is_empty() {
            self.dead_queue = other.dead_queue.clone();
        }
        if other.max_attempts != 0 {
            self.max_attempts = other.max_attempts;
        }
        if other.requested_partitions != 0 {
            self.requested_partitions = other.requested_partitions;
        }
    }
}

/// Identity of one partition: the owning queue and the partition index.
///
/// The pair deterministically names the partition's data file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionInfo {
    /// Name of the owning queue.
    pub queue_name: String,
    /// Zero-based partition index within the queue.
    pub partition: u32,
}

impl PartitionInfo {
    /// Name of the data file backing this partition.
    #[must_use]
    pub fn data_file_name(&self) -> String {
        format!("{}-{:06}.db", self.queue_name, self.partition)
    }
}

impl fmt::Display for PartitionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.queue_name, self.partition)
    }
}

/// Validates a queue name for registry writes.
///
/// Names must be non-empty, at most [`MAX_QUEUE_NAME_BYTES`] long, contain
/// only `[a-zA-Z0-9._-]`, and must not begin with
/// [`RESERVED_QUEUE_PREFIX`]. The whitelist keeps names safe to embed in
/// partition file names.
///
/// # Errors
///
/// Returns [`QueueError::InvalidOption`] describing the violated constraint.
pub fn validate_queue_name(name: &str) -> Result<(), QueueError> {
    use snafu::ensure;

    ensure!(!name.is_empty(), InvalidOptionSnafu { message: "queue_name cannot be empty" });
    ensure!(
        name.len() <= MAX_QUEUE_NAME_BYTES,
        InvalidOptionSnafu {
            message: format!(
                "queue_name exceeds maximum length of {MAX_QUEUE_NAME_BYTES} bytes"
            ),
        }
    );
    ensure!(
        !name.starts_with(RESERVED_QUEUE_PREFIX),
        InvalidOptionSnafu {
            message: format!("queue_name cannot begin with '{RESERVED_QUEUE_PREFIX}'"),
        }
    );
    if let Some(c) = name.chars().find(|c| !is_queue_name_char(*c)) {
        return InvalidOptionSnafu {
            message: format!(
                "queue_name contains invalid character {c:?}; allowed: [a-zA-Z0-9._-]"
            ),
        }
        .fail();
    }
    Ok(())
}

fn is_queue_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}
