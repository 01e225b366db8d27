use fros_models::ExecutionRecord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The identifier is already recorded; carries the first-recorded entry.
    #[error("Transaction already recorded: {}", .0.transaction.id)]
    Duplicate(Box<ExecutionRecord>),

    #[error("Store not available: {0}")]
    Unavailable(String),
}
