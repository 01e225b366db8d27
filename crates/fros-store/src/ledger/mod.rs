pub mod memory;
pub mod sqlite;

use fros_models::{ExecutionRecord, Transaction};

use crate::error::StoreError;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

/// Append-only audit trail of processed transactions.
///
/// Implementations must reject a second append for an identifier with
/// [`StoreError::Duplicate`] carrying the first-recorded entry, and must not
/// serialize appends for distinct identifiers behind one global lock unless
/// the backing store itself is single-writer.
///
/// Methods are synchronous and are called directly from async request
/// tasks, so no await point separates a decision from its record. They
/// must therefore be short. [`MemoryLedger`] only locks one map shard.
/// [`SqliteLedger`] does blocking disk I/O behind a single connection
/// mutex: its appends and lookups serialize across all requests and hold
/// a runtime worker thread for the length of one statement. Bulk history
/// reads made on behalf of context providers go through `spawn_blocking`.
pub trait ExecutionLedger: Send + Sync {
    fn append(&self, record: ExecutionRecord) -> Result<(), StoreError>;

    fn get(&self, transaction_id: &str) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Most recent transactions originated by `account`, newest first.
    fn history_for_account(
        &self,
        account: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
