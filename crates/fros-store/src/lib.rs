pub mod context_cache;
pub mod error;
pub mod ledger;

pub use context_cache::{ContextCache, FragmentKey};
pub use error::StoreError;
pub use ledger::{ExecutionLedger, MemoryLedger, SqliteLedger};
