use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::AgentContext;
use crate::decision::Decision;
use crate::tool_result::ToolResult;
use crate::transaction::Transaction;

/// Wall-clock time spent in each orchestration stage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageTimings {
    pub context_ms: u64,
    pub tools_ms: u64,
    pub synthesis_ms: u64,
}

/// Write-once audit record of one processed transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub request_id: Uuid,
    pub transaction: Transaction,
    pub context: AgentContext,
    pub tool_results: Vec<ToolResult>,
    pub decision: Decision,
    pub stage_timings: StageTimings,
    pub total_latency_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn transaction_id(&self) -> &str {
        &self.transaction.id
    }
}
