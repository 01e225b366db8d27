use thiserror::Error;

/// A context source could not produce a fragment. Absorbed by the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider timed out after {0} ms")]
    Timeout(u64),
}

/// A tool could not complete its analysis. Absorbed by the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool failure: {0}")]
    Failure(String),

    /// The context the tool needs is absent. Recorded as `no_signal`, not as
    /// a zero contribution.
    #[error("{0}")]
    NoSignal(String),
}

/// The external reasoning backend failed. Triggers the local fallback and is
/// never surfaced to callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Backend timed out after {0} ms")]
    Timeout(u64),

    #[error("Malformed backend response: {0}")]
    Malformed(String),

    #[error("Backend disabled: {0}")]
    Disabled(String),
}

/// The only error that fails a whole request.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Orchestrator fault: {0}")]
    Fault(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Ledger error: {0}")]
    Ledger(#[from] fros_store::StoreError),

    #[error("Transaction rejected: {0}")]
    Rejected(String),
}

/// Failure talking to the banking system's read-only endpoints.
#[derive(Error, Debug)]
pub enum BankError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bank API returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Bank record could not be decoded: {0}")]
    Decode(String),
}
