//! Core types for the Conveyor queue broker.
//!
//! This crate provides the foundational pieces shared by the storage layer
//! and its callers:
//! - The [`Item`] record and the [`QueueInfo`] registry record
//! - Request batches and operation options
//! - Sortable 20-byte item identifiers
//! - The error taxonomy using snafu
//! - The postcard codec and the injectable [`Clock`]

pub mod batch;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod ident;
pub mod item;
pub mod queue;

// Re-export commonly used types at crate root
pub use batch::{
    CompleteRequest, ListOptions, ProduceRequest, QueueStats, ReserveBatch, ReserveOptions,
    ReserveRequest, SlotIterator,
};
pub use clock::{Clock, FrozenClock, SystemClock};
pub use config::StorageConfig;
pub use error::{QueueError, Result};
pub use ident::{ItemId, ITEM_ID_LEN};
pub use item::Item;
pub use queue::{
    validate_queue_name, PartitionInfo, QueueInfo, MAX_QUEUE_NAME_BYTES, RESERVED_QUEUE_PREFIX,
};
