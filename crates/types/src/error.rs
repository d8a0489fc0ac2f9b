//! Error types for Conveyor storage using snafu.
//!
//! One taxonomy is shared by every storage operation:
//! - caller mistakes (`InvalidOption`, `Conflict`)
//! - the registry miss sentinel (`QueueNotExist`)
//! - engine and codec failures (`Internal`)
//! - the data-file lock timeout (`OpenTimeout`)

use snafu::{Location, Snafu};

/// Unified result type for storage operations.
pub type Result<T, E = QueueError> = std::result::Result<T, E>;

/// Top-level error type for queue storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// Caller-supplied data is ill-formed (bad id, bad pivot, duplicate
    /// queue name, invariant violation).
    #[snafu(display("invalid option; {message}"))]
    InvalidOption {
        /// Error description.
        message: String,
    },

    /// Semantic collision, such as completing an item that is not reserved.
    #[snafu(display("conflict; {message}"))]
    Conflict {
        /// Error description.
        message: String,
    },

    /// The named queue is not present in the registry.
    #[snafu(display("queue does not exist"))]
    QueueNotExist,

    /// The cancellation token fired before the transaction began.
    ///
    /// Cancellation is never observed once a transaction has started; an
    /// operation that gets this far runs to completion.
    #[snafu(display("request canceled before the transaction began"))]
    Canceled,

    /// The data-file lock was not acquired within the open timeout.
    #[snafu(display("timed out opening data file '{path}'"))]
    OpenTimeout {
        /// Path of the data file that could not be locked.
        path: String,
    },

    /// Missing table, codec failure, or engine I/O failure. Aborts the
    /// enclosing transaction.
    #[snafu(display("internal storage error at {location}: {message}"))]
    Internal {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },
}

impl QueueError {
    /// True for errors a caller can fix by correcting its input.
    #[must_use]
    pub fn is_invalid_option(&self) -> bool {
        matches!(self, QueueError::InvalidOption { .. })
    }

    /// True for semantic collisions such as completing an unreserved item.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, QueueError::Conflict { .. })
    }
}

/// Generates `From` conversions that fold a source error into
/// [`QueueError::Internal`], capturing the caller's source location.
macro_rules! impl_internal_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for QueueError {
                #[track_caller]
                fn from(err: $source) -> Self {
                    let loc = std::panic::Location::caller();
                    QueueError::Internal {
                        message: err.to_string(),
                        location: Location::new(loc.file(), loc.line(), loc.column()),
                    }
                }
            }
        )+
    };
}

impl_internal_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    std::io::Error,
    crate::codec::CodecError,
);
