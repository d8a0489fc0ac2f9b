//! redb storage engine wrapper.
//!
//! Thin wrapper around [`redb::Database`] that adds the open semantics the
//! stores rely on: a bounded wait for the file lock, restrictive file
//! permissions, and an in-memory variant for tests.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redb::backends::InMemoryBackend;
use redb::{Database, DatabaseError, ReadTransaction, StorageError, WriteTransaction};
use tracing::debug;

use conveyor_types::error::{OpenTimeoutSnafu, Result};

/// How long to wait for the data-file lock before giving up.
const OPEN_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause between lock attempts while the timeout has not elapsed.
const OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Storage engine backed by a redb database.
///
/// Cloning is cheap and shares the underlying handle; the owning store is
/// responsible for serializing its write transactions.
#[derive(Clone, Debug)]
pub struct StorageEngine {
    db: Arc<Database>,
}

impl StorageEngine {
    /// Opens or creates the data file at `path`.
    ///
    /// Retries while another handle holds the file lock, up to one second,
    /// and forces the file mode to `0600` on Unix.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::OpenTimeout`](conveyor_types::QueueError::OpenTimeout)
    /// when the lock is not acquired in time, or
    /// [`QueueError::Internal`](conveyor_types::QueueError::Internal) for any
    /// other open failure.
    pub fn open(path: &Path) -> Result<Self> {
        let deadline = Instant::now() + OPEN_TIMEOUT;
        let db = loop {
            match Database::builder().create(path) {
                Ok(db) => break db,
                Err(err) if is_locked(&err) => {
                    if Instant::now() >= deadline {
                        return OpenTimeoutSnafu { path: path.display().to_string() }.fail();
                    }
                    std::thread::sleep(OPEN_RETRY_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %path.display(), "opened data file");
        Ok(Self { db: Arc::new(db) })
    }

    /// Creates an in-memory database, used by unit tests.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the backend cannot be initialized.
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Begins an exclusive write transaction.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the engine cannot start the transaction.
    pub fn begin_write(&self) -> Result<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Begins a snapshot-consistent read transaction.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the engine cannot start the transaction.
    pub fn begin_read(&self) -> Result<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }
}

/// True when the open failure means another handle currently holds the file.
fn is_locked(err: &DatabaseError) -> bool {
    match err {
        DatabaseError::DatabaseAlreadyOpen => true,
        DatabaseError::Storage(StorageError::Io(io)) => {
            io.kind() == std::io::ErrorKind::WouldBlock
        }
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use conveyor_types::QueueError;

    use super::*;
    use crate::tables::Tables;

    #[test]
    fn test_open_in_memory_write_and_read() {
        let engine = StorageEngine::open_in_memory().expect("open engine");

        {
            let txn = engine.begin_write().expect("begin write");
            {
                let mut table = txn.open_table(Tables::ITEMS).expect("open table");
                table.insert(b"key".as_slice(), b"value".as_slice()).expect("insert");
            }
            txn.commit().expect("commit");
        }

        {
            let txn = engine.begin_read().expect("begin read");
            let table = txn.open_table(Tables::ITEMS).expect("open table");
            let value = table.get(b"key".as_slice()).expect("get").expect("present");
            assert_eq!(value.value(), b"value");
        }
    }

    #[test]
    fn test_open_creates_file_and_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reopen.db");

        {
            let engine = StorageEngine::open(&path).expect("first open");
            let txn = engine.begin_write().expect("begin write");
            {
                let mut table = txn.open_table(Tables::ITEMS).expect("open table");
                table.insert(b"persisted".as_slice(), b"yes".as_slice()).expect("insert");
            }
            txn.commit().expect("commit");
        }

        let engine = StorageEngine::open(&path).expect("reopen");
        let txn = engine.begin_read().expect("begin read");
        let table = txn.open_table(Tables::ITEMS).expect("open table");
        assert!(table.get(b"persisted".as_slice()).expect("get").is_some());
    }

    #[test]
    fn test_second_open_of_held_file_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("held.db");

        let _held = StorageEngine::open(&path).expect("first open");
        let started = Instant::now();
        let err = StorageEngine::open(&path).expect_err("second open must fail");
        assert!(matches!(err, QueueError::OpenTimeout { .. }), "got {err}");
        assert!(started.elapsed() >= OPEN_TIMEOUT);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_mode_is_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mode.db");
        let _engine = StorageEngine::open(&path).expect("open");

        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
