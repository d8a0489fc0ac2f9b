//! The queue registry: the durable store of [`QueueInfo`] records.
//!
//! All queue definitions live in a single data file whose name begins with
//! `~`, a character rejected by queue-name validation, so no partition file
//! can ever collide with it.

use redb::ReadableTable;
use snafu::ensure;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use conveyor_types::error::{
    CanceledSnafu, InternalSnafu, InvalidOptionSnafu, QueueNotExistSnafu, Result,
};
use conveyor_types::{codec, validate_queue_name, ListOptions, QueueInfo, StorageConfig};

use crate::engine::StorageEngine;
use crate::tables::Tables;

/// File name of the queue registry inside the storage directory.
pub const REGISTRY_FILE_NAME: &str = "~queue-storage.db";

/// Durable registry of queue definitions, keyed by queue name.
///
/// Owns its engine handle exclusively. The data file is opened lazily on the
/// first operation and the handle cached for the life of the instance.
pub struct QueueStore {
    conf: StorageConfig,
    db: Option<StorageEngine>,
}

impl QueueStore {
    /// Creates a registry over the configured storage directory. No I/O
    /// happens until the first operation.
    #[must_use]
    pub fn new(conf: StorageConfig) -> Self {
        Self { conf, db: None }
    }

    /// Loads the record for `name` into `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::QueueNotExist`](conveyor_types::QueueError::QueueNotExist)
    /// when the name is absent, or an invalid-option error for an empty name.
    pub fn get(
        &mut self,
        ctx: &CancellationToken,
        name: &str,
        queue: &mut QueueInfo,
    ) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        ensure!(!name.is_empty(), InvalidOptionSnafu { message: "queue_name cannot be empty" });
        let engine = self.get_db()?;

        let txn = engine.begin_read()?;
        let table = txn.open_table(Tables::QUEUES)?;
        match table.get(name)? {
            Some(value) => {
                *queue = codec::decode(value.value())?;
                Ok(())
            }
            None => QueueNotExistSnafu.fail(),
        }
    }

    /// Inserts a new queue record, stamping `created_at` and `updated_at`
    /// on the caller's record.
    ///
    /// # Errors
    ///
    /// Returns an invalid-option error when the name fails validation, the
    /// name already exists, or `reserve_timeout` exceeds `dead_timeout`.
    pub fn add(&mut self, ctx: &CancellationToken, info: &mut QueueInfo) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        validate_queue_name(&info.name)?;
        ensure_timeouts(info)?;

        let now = self.conf.clock.now();
        let engine = self.get_db()?;

        let txn = engine.begin_write()?;
        {
            let mut table = txn.open_table(Tables::QUEUES)?;
            if table.get(info.name.as_str())?.is_some() {
                return InvalidOptionSnafu {
                    message: format!("invalid queue; '{}' already exists", info.name),
                }
                .fail();
            }

            info.created_at = Some(now);
            info.updated_at = Some(now);

            let value = codec::encode(info)?;
            table.insert(info.name.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Merges `info` into the stored record: fields that carry a value
    /// overwrite, everything else is preserved. The merged record must still
    /// satisfy `reserve_timeout <= dead_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::QueueNotExist`](conveyor_types::QueueError::QueueNotExist)
    /// when the name is absent, or an invalid-option error when validation
    /// or the timeout invariant fails; the stored record is unchanged on
    /// failure.
    pub fn update(&mut self, ctx: &CancellationToken, info: &QueueInfo) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        validate_queue_name(&info.name)?;

        let now = self.conf.clock.now();
        let engine = self.get_db()?;

        let txn = engine.begin_write()?;
        {
            let mut table = txn.open_table(Tables::QUEUES)?;

            let mut found: QueueInfo = match table.get(info.name.as_str())? {
                Some(value) => codec::decode(value.value())?,
                None => return QueueNotExistSnafu.fail(),
            };

            found.update_from(info);
            ensure_timeouts(&found)?;
            found.updated_at = Some(now);

            let value = codec::encode(&found)?;
            table.insert(found.name.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Appends queue records to `queues`, scanning forward from the pivot
    /// name if one is given, until `opts.limit` records have been appended
    /// or the cursor ends.
    ///
    /// # Errors
    ///
    /// Returns an invalid-option error when the pivot is not valid UTF-8 or
    /// no record exists at or after it; internal errors otherwise.
    pub fn list(
        &mut self,
        ctx: &CancellationToken,
        queues: &mut Vec<QueueInfo>,
        opts: &ListOptions,
    ) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        let pivot = match &opts.pivot {
            Some(bytes) => match std::str::from_utf8(bytes) {
                Ok(name) => Some(name),
                Err(_) => {
                    return InvalidOptionSnafu {
                        message: "invalid pivot; queue name must be valid UTF-8",
                    }
                    .fail();
                }
            },
            None => None,
        };
        let engine = self.get_db()?;

        let txn = engine.begin_read()?;
        let table = txn.open_table(Tables::QUEUES)?;

        let mut count = 0usize;
        let mut range = match pivot {
            Some(pivot) => {
                let mut range = table.range(pivot..)?;
                match range.next() {
                    Some(entry) => {
                        let (_, value) = entry?;
                        if count < opts.limit {
                            queues.push(codec::decode(value.value())?);
                            count += 1;
                        }
                    }
                    None => {
                        return InvalidOptionSnafu {
                            message: format!("invalid pivot; '{pivot}' does not exist"),
                        }
                        .fail();
                    }
                }
                range
            }
            None => table.range::<&str>(..)?,
        };

        for entry in range.by_ref() {
            if count >= opts.limit {
                break;
            }
            let (_, value) = entry?;
            queues.push(codec::decode(value.value())?);
            count += 1;
        }
        Ok(())
    }

    /// Removes the record for `name`. Removing an absent name is a success.
    ///
    /// # Errors
    ///
    /// Returns an invalid-option error for an empty name; internal errors
    /// otherwise.
    pub fn delete(&mut self, ctx: &CancellationToken, name: &str) -> Result<()> {
        ensure!(!ctx.is_cancelled(), CanceledSnafu);
        ensure!(!name.is_empty(), InvalidOptionSnafu { message: "queue_name cannot be empty" });
        let engine = self.get_db()?;

        let txn = engine.begin_write()?;
        {
            let mut table = txn.open_table(Tables::QUEUES)?;
            table.remove(name)?;
        }
        txn.commit()?;
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

    /// Opens the registry data file on first use and caches the handle.
    ///
    /// Opening an existing file is valid; the table create below is a no-op
    /// when the table is already present.
    fn get_db(&mut self) -> Result<StorageEngine> {
        if self.db.is_none() {
            let path = self.conf.storage_dir.join(REGISTRY_FILE_NAME);
            let engine = StorageEngine::open(&path)?;

            let txn = engine.begin_write()?;
            let _ = txn.open_table(Tables::QUEUES)?;
            txn.commit()?;

            debug!(path = %path.display(), "opened queue registry");
            self.db = Some(engine);
        }
        self.db
            .clone()
            .ok_or_else(|| InternalSnafu { message: "registry engine not open" }.build())
    }
}

/// Enforces `reserve_timeout <= dead_timeout`.
fn ensure_timeouts(info: &QueueInfo) -> Result<()> {
    ensure!(
        info.reserve_timeout <= info.dead_timeout,
        InvalidOptionSnafu {
            message: format!(
                "reserve timeout is too long; {:?} cannot be greater than the dead timeout {:?}",
                info.reserve_timeout, info.dead_timeout,
            ),
        }
    );
    Ok(())
}
