//! Table definitions for redb storage.
//!
//! Every data file contains exactly one table, named `queue`. Partition
//! files key it by the 20-byte item id; the registry file keys it by queue
//! name. The two definitions never share a file, so the shared name is safe.

use redb::TableDefinition;

/// Name of the single table inside every data file.
pub const TABLE_NAME: &str = "queue";

/// Table definitions for queue storage.
pub struct Tables;

impl Tables {
    /// Partition items: item id (20 bytes) → serialized `Item`.
    pub const ITEMS: TableDefinition<'static, &'static [u8], &'static [u8]> =
        TableDefinition::new(TABLE_NAME);

    /// Queue registry: queue name (UTF-8) → serialized `QueueInfo`.
    pub const QUEUES: TableDefinition<'static, &'static str, &'static [u8]> =
        TableDefinition::new(TABLE_NAME);
}
