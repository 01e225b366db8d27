pub mod bank;
pub mod claude_cli;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod providers;
pub mod synthesizer;
pub mod tools;

pub mod test_support;

pub use bank::BankApiClient;
pub use error::{BackendError, BankError, OrchestratorError, ProviderError, ToolError};
pub use history::{HistorySource, LedgerHistory};
pub use orchestrator::{Evaluation, Orchestrator, Stage, Submission};
pub use providers::{standard_providers, ContextProvider, RegisteredProvider};
pub use claude_cli::ClaudeCliBackend;
pub use synthesizer::{ReasoningBackend, Synthesizer};
pub use tools::{Finding, Tool, ToolRegistry};
