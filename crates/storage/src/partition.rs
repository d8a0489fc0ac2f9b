//! The partition store: one durable container of items per
//! `(queue, partition)` pair.
//!
//! Every operation runs in exactly one engine transaction and is durable on
//! return. The caller (the queue manager) serializes mutating operations per
//! partition; read-only operations may run concurrently against snapshots.
//! Cancellation tokens are honoured only before a transaction begins.

use redb::ReadableTable;
use snafu::ensure;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use conveyor_types::error::{
    CanceledSnafu, ConflictSnafu, InternalSnafu, InvalidOptionSnafu, Result,
};
use conveyor_types::ident::display_id;
use conveyor_types::{
    codec, CompleteRequest, Item, ItemId, ListOptions, PartitionInfo, ProduceRequest, QueueError,
    QueueStats, ReserveBatch, ReserveOptions, StorageConfig,
};

use crate::engine::StorageEngine;
use crate::tables::Tables;

/// Stateless builder of [`Partition`] handles.
///
/// Partition data files are created lazily on first use, so `create` has
/// nothing to do and `get` performs no I/O.
#[derive(Debug, Clone)]
pub struct PartitionStore {
    conf: StorageConfig,
}

impl PartitionStore {
    /// Creates a partition store over the configured storage directory.
    #[must_use]
    pub fn new(conf: StorageConfig) -> Self {
        Self { conf }
    }

    /// Provisions storage for a partition.
    ///
    /// A no-op: the data file is created when the partition is first used.
    ///
    /// # Errors
    ///
    /// None currently; the signature matches the other provisioning paths.
    pub fn create(&self, _info: &PartitionInfo) -> Result<()> {
        Ok(())
    }

    /// Returns a partition handle bound to `info`, with a freshly seeded
    /// identity counter and no open file handle.
    #[must_use]
    pub fn get(&self, info: PartitionInfo) -> Partition {
        Partition {
            uid: ItemId::generate(self.conf.clock.now()),
            conf: self.conf.clone(),
            info,
            db: None,
        }
    }
}

/// A single partition's durable item container.
///
/// Owns its engine handle exclusively for the life of the instance. Not safe
/// to share across threads without external serialization of the mutating
/// operations, which the queue manager provides.
pub struct Partition {
    info: PartitionInfo,
    conf: StorageConfig,
    uid: ItemId,
    db: Option<StorageEngine>,
}

impl Partition {
    /// Identity of this partition.
    #[must_use]
    pub fn info(&self) -> &PartitionInfo {
        &self.info
    }

    /// Appends each request's items, assigning a fresh id and creation stamp
    /// to every item in place. All writes commit atomically.
    ///
    /// # Errors
    ///
    /// Returns an internal error on any codec or engine failure; no items
    /// are written in that case.
    pub fn produce(
        &mut self,
        ctx: &CancellationToken,
        batch: &mut [ProduceRequest],
    ) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        let now = self.conf.clock.now();
        let engine = self.get_db()?;

        let txn = engine.begin_write()?;
        {
            let mut table = txn.open_table(Tables::ITEMS)?;
            for request in batch.iter_mut() {
                for item in &mut request.items {
                    self.uid = self.uid.next();
                    item.id = self.uid.to_vec();
                    item.created_at = Some(now);

                    let value = codec::encode(item)?;
                    table.insert(item.id.as_slice(), value.as_slice())?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Scans forward from the start of the partition, marking unreserved
    /// items as reserved with the batch's deadline and distributing them to
    /// the waiting slots in ascending id order.
    ///
    /// At most `batch.total` items transition to reserved. The scan stops
    /// when every slot is filled or the cursor is exhausted; an item the
    /// slot iterator rejects is never written back.
    ///
    /// # Errors
    ///
    /// Returns an internal error on any codec or engine failure; the
    /// transaction aborts and no items are reserved.
    pub fn reserve(
        &mut self,
        ctx: &CancellationToken,
        batch: &mut ReserveBatch,
        opts: &ReserveOptions,
    ) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        let engine = self.get_db()?;

        let txn = engine.begin_write()?;
        {
            let mut table = txn.open_table(Tables::ITEMS)?;
            let total = batch.total;
            let mut updates: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

            {
                let mut slots = batch.iterator();
                // Full forward scan; reserved items are skipped in place.
                for entry in table.range::<&[u8]>(..)? {
                    if updates.len() >= total {
                        break;
                    }
                    let (key, value) = entry?;

                    let mut item: Item = codec::decode(value.value())?;
                    if item.is_reserved {
                        continue;
                    }

                    item.is_reserved = true;
                    item.reserve_deadline = Some(opts.reserve_deadline);

                    if !slots.offer(&item) {
                        // Every slot is filled; this item stays untouched
                        // in storage.
                        break;
                    }
                    updates.push((key.value().to_vec(), codec::encode(&item)?));
                }
            }

            for (key, value) in updates {
                table.insert(key.as_slice(), value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Removes completed items. Validation and existence failures are
    /// recorded on the owning request and end that request's remaining ids;
    /// the rest of the batch continues and the transaction still commits.
    ///
    /// # Errors
    ///
    /// Codec and engine failures abort the whole transaction and propagate;
    /// a rollback failure on that path is logged and swallowed.
    pub fn complete(
        &mut self,
        ctx: &CancellationToken,
        batch: &mut [CompleteRequest],
    ) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        let engine = self.get_db()?;

        let txn = engine.begin_write()?;
        match Self::complete_requests(&txn, batch) {
            Ok(()) => {
                txn.commit()?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = txn.abort() {
                    warn!(
                        error = %abort_err,
                        partition = %self.info,
                        "rollback failed after complete error",
                    );
                }
                Err(err)
            }
        }
    }

    fn complete_requests(
        txn: &redb::WriteTransaction,
        batch: &mut [CompleteRequest],
    ) -> Result<()> {
        let mut table = txn.open_table(Tables::ITEMS)?;
        for request in batch.iter_mut() {
            request.err = Self::complete_ids(&mut table, &request.ids)?;
        }
        Ok(())
    }

    /// Deletes one request's ids. A validation or existence failure is
    /// returned as the request's recorded error, leaving its remaining ids
    /// unprocessed; `Err` is reserved for failures that abort the batch.
    fn complete_ids(
        table: &mut redb::Table<'_, &'static [u8], &'static [u8]>,
        ids: &[Vec<u8>],
    ) -> Result<Option<QueueError>> {
        for id in ids {
            if let Err(err) = ItemId::from_bytes(id) {
                return Ok(Some(
                    InvalidOptionSnafu {
                        message: format!("invalid storage id; '{}': {err}", display_id(id)),
                    }
                    .build(),
                ));
            }

            let value = match table.get(id.as_slice())? {
                Some(value) => value.value().to_vec(),
                None => {
                    return Ok(Some(
                        InvalidOptionSnafu {
                            message: format!(
                                "invalid storage id; '{}' does not exist",
                                display_id(id)
                            ),
                        }
                        .build(),
                    ));
                }
            };

            let item: Item = codec::decode(&value)?;
            if !item.is_reserved {
                return Ok(Some(
                    ConflictSnafu {
                        message: format!(
                            "item(s) cannot be completed; '{}' is not marked as reserved",
                            display_id(id)
                        ),
                    }
                    .build(),
                ));
            }

            table.remove(id.as_slice())?;
        }
        Ok(None)
    }

    /// Appends decoded items to `items`, scanning forward from the pivot if
    /// one is given, until `opts.limit` items have been appended or the
    /// cursor ends.
    ///
    /// # Errors
    ///
    /// Returns an invalid-option error when the pivot does not parse or no
    /// entry exists at or after it; internal errors otherwise.
    pub fn list(
        &mut self,
        ctx: &CancellationToken,
        items: &mut Vec<Item>,
        opts: &ListOptions,
    ) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        if let Some(pivot) = &opts.pivot {
            if let Err(err) = ItemId::from_bytes(pivot) {
                return InvalidOptionSnafu {
                    message: format!("invalid storage id; '{}': {err}", display_id(pivot)),
                }
                .fail();
            }
        }
        let engine = self.get_db()?;

        let txn = engine.begin_read()?;
        let table = txn.open_table(Tables::ITEMS)?;

        let mut count = 0usize;
        let mut range = match &opts.pivot {
            Some(pivot) => {
                let mut range = table.range(pivot.as_slice()..)?;
                // The pivot must land on an existing entry (or one after it).
                match range.next() {
                    Some(entry) => {
                        let (_, value) = entry?;
                        if count < opts.limit {
                            items.push(codec::decode(value.value())?);
                            count += 1;
                        }
                    }
                    None => {
                        return InvalidOptionSnafu {
                            message: format!(
                                "invalid pivot; '{}' does not exist",
                                display_id(pivot)
                            ),
                        }
                        .fail();
                    }
                }
                range
            }
            None => table.range::<&[u8]>(..)?,
        };

        for entry in range.by_ref() {
            if count >= opts.limit {
                break;
            }
            let (_, value) = entry?;
            items.push(codec::decode(value.value())?);
            count += 1;
        }
        Ok(())
    }

    /// Appends items through the administrative path, bypassing produce
    /// validation but with the same identity assignment, creation stamping,
    /// and single-transaction semantics as [`Partition::produce`].
    ///
    /// # Errors
    ///
    /// Returns an internal error on any codec or engine failure; no items
    /// are written in that case.
    pub fn add(&mut self, ctx: &CancellationToken, items: &mut [Item]) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        let now = self.conf.clock.now();
        let engine = self.get_db()?;

        let txn = engine.begin_write()?;
        {
            let mut table = txn.open_table(Tables::ITEMS)?;
            for item in items.iter_mut() {
                self.uid = self.uid.next();
                item.id = self.uid.to_vec();
                item.created_at = Some(now);

                let value = codec::encode(item)?;
                table.insert(item.id.as_slice(), value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Deletes the given items unconditionally; ids that are absent are
    /// silently skipped. Used by administrative tooling, which may also
    /// remove reserved items.
    ///
    /// # Errors
    ///
    /// Returns an invalid-option error on the first id that fails to parse;
    /// the transaction aborts and nothing is deleted.
    pub fn delete(&mut self, ctx: &CancellationToken, ids: &[Vec<u8>]) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        let engine = self.get_db()?;

        let txn = engine.begin_write()?;
        {
            let mut table = txn.open_table(Tables::ITEMS)?;
            for id in ids {
                if let Err(err) = ItemId::from_bytes(id) {
                    return InvalidOptionSnafu {
                        message: format!("invalid storage id; '{}': {err}", display_id(id)),
                    }
                    .fail();
                }
                table.remove(id.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Clears the partition. A destructive clear drops every item; otherwise
    /// only unreserved items are removed and in-flight reservations survive.
    ///
    /// # Errors
    ///
    /// Returns an internal error on any codec or engine failure; the
    /// transaction aborts and nothing is cleared.
    pub fn clear(&mut self, ctx: &CancellationToken, destructive: bool) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        let engine = self.get_db()?;

        let txn = engine.begin_write()?;
        if destructive {
            txn.delete_table(Tables::ITEMS)?;
            // Recreate the table so the file keeps its expected layout.
            let _ = txn.open_table(Tables::ITEMS)?;
            txn.commit()?;
            return Ok(());
        }

        {
            let mut table = txn.open_table(Tables::ITEMS)?;
            let mut doomed: Vec<Vec<u8>> = Vec::new();
            for entry in table.range::<&[u8]>(..)? {
                let (key, value) = entry?;
                let item: Item = codec::decode(value.value())?;
                if item.is_reserved {
                    continue;
                }
                doomed.push(key.value().to_vec());
            }
            for key in doomed {
                table.remove(key.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Computes aggregate statistics from the live set: totals plus average
    /// item age and average remaining lease time. Expired leases contribute
    /// negative values.
    ///
    /// # Errors
    ///
    /// Returns an internal error on any codec or engine failure.
    pub fn stats(&mut self, ctx: &CancellationToken, stats: &mut QueueStats) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        let now = self.conf.clock.now();
        let engine = self.get_db()?;

        let txn = engine.begin_read()?;
        let table = txn.open_table(Tables::ITEMS)?;

        for entry in table.range::<&[u8]>(..)? {
            let (_, value) = entry?;
            let item: Item = codec::decode(value.value())?;

            stats.total += 1;
            if let Some(created_at) = item.created_at {
                stats.average_age = stats.average_age + (now - created_at);
            }
            if item.is_reserved {
                stats.total_reserved += 1;
                if let Some(deadline) = item.reserve_deadline {
                    stats.average_reserved_age =
                        stats.average_reserved_age + (deadline - now);
                }
            }
        }

        if stats.total != 0 {
            stats.average_age = stats.average_age / stats.total as i32;
        }
        if stats.total_reserved != 0 {
            stats.average_reserved_age = stats.average_reserved_age / stats.total_reserved as i32;
        }
        Ok(())
    }

    /// Closes the engine handle if it is open. Idempotent. Must not be
    /// called concurrently with other operations on this instance.
    ///
    /// # Errors
    ///
    /// None currently; the handle is dropped in place.
    pub fn close(&mut self, _ctx: &CancellationToken) -> Result<()> {
        self.db = None;
        Ok(())
    }

    /// Opens the partition's data file on first use and caches the handle.
    ///
    /// Opening an existing file is valid; the table create below is a no-op
    /// when the table is already present.
    fn get_db(&mut self) -> Result<StorageEngine> {
        if self.db.is_none() {
            let path = self.conf.storage_dir.join(self.info.data_file_name());
            let engine = StorageEngine::open(&path)?;

            let txn = engine.begin_write()?;
            let _ = txn.open_table(Tables::ITEMS)?;
            txn.commit()?;

            debug!(partition = %self.info, "opened partition data file");
            self.db = Some(engine);
        }
        self.db
            .clone()
            .ok_or_else(|| InternalSnafu { message: "partition engine not open" }.build())
    }
}
