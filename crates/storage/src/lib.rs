//! Storage layer for the Conveyor queue broker.
//!
//! This crate provides:
//! - The redb-backed [`Partition`] store, one durable item container per
//!   `(queue, partition)` pair
//! - The [`PartitionStore`] factory that binds partitions to data files
//! - The [`QueueStore`] registry of queue definitions
//!
//! The layer is synchronous and blocking: every operation runs in exactly
//! one engine transaction in the caller's context, and effects are durable
//! once a call returns. Scheduling — one serial writer per partition,
//! blocking reserves, request batching — belongs to the queue manager above.

mod engine;
mod partition;
mod queues;
mod tables;

pub use engine::StorageEngine;
pub use partition::{Partition, PartitionStore};
pub use queues::{QueueStore, REGISTRY_FILE_NAME};
pub use tables::Tables;
