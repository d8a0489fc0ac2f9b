//! Storage configuration.

use std::path::PathBuf;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};

/// Configuration shared by the partition store and the queue registry.
///
/// # Example
///
/// ```no_run
/// # use conveyor_types::StorageConfig;
/// let config = StorageConfig::builder()
///     .storage_dir("/var/lib/conveyor")
///     .build();
/// ```
#[derive(Debug, Clone, bon::Builder)]
pub struct StorageConfig {
    /// Directory holding one data file per partition plus the queue
    /// registry file.
    #[builder(into, default = PathBuf::from("."))]
    pub storage_dir: PathBuf,

    /// Time provider used for creation stamps and age calculations.
    /// Overridable for deterministic tests.
    #[builder(default = Arc::new(SystemClock))]
    pub clock: Arc<dyn Clock>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::FrozenClock;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.storage_dir, PathBuf::from("."));
    }

    #[test]
    fn test_builder_accepts_custom_clock() {
        let instant = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let config = StorageConfig::builder()
            .storage_dir("/tmp/conveyor-test")
            .clock(Arc::new(FrozenClock::at(instant)))
            .build();
        assert_eq!(config.clock.now(), instant);
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/conveyor-test"));
    }
}
