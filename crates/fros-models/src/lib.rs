pub mod config;
pub mod context;
pub mod decision;
pub mod record;
pub mod tool_result;
pub mod transaction;

pub use config::{
    BankConfig, CacheConfig, FlaggedCounterparty, FrosConfig, LedgerConfig, OrchestratorConfig,
    ProviderConfig, ReferenceConfig, SynthesisConfig, SynthesisMode, ToolConfig,
};
pub use context::{AgentContext, AgentContextBuilder, ContextFragment, FragmentAbsence, FragmentOrigin};
pub use decision::{Decision, RecommendedAction, RiskTier, SynthesisSource, TierThresholds};
pub use record::{ExecutionRecord, StageTimings};
pub use tool_result::{clamp_contribution, ToolResult, ToolStatus};
pub use transaction::{GeoPoint, Transaction, TransactionMetadata};
