use serde::{Deserialize, Serialize};

/// Terminal state of one tool invocation. There is no pending state: a
/// ToolResult only exists once the tool has finished, failed, or run out of time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    /// The tool ran but the context it needs was absent, so it has no opinion.
    NoSignal,
    Failed,
    TimedOut,
}

/// Bound a raw contribution to [0.0, 1.0]. NaN collapses to 0.0.
pub fn clamp_contribution(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Output of one tool for one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool: String,
    /// 0.0 to 1.0 contribution to risk. Always 0.0 for non-ok results, which
    /// are excluded from scoring rather than counted as low risk.
    pub contribution: f64,
    pub rationale: String,
    /// Short machine-readable factor names (e.g., "suspicious_late_night_hour").
    pub risk_factors: Vec<String>,
    /// Tool-specific structured details.
    pub details: serde_json::Value,
    pub status: ToolStatus,
    pub latency_ms: u64,
}

impl ToolResult {
    pub fn ok(
        tool: &str,
        contribution: f64,
        rationale: String,
        risk_factors: Vec<String>,
        details: serde_json::Value,
        latency_ms: u64,
    ) -> Self {
        Self {
            tool: tool.to_string(),
            contribution: clamp_contribution(contribution),
            rationale,
            risk_factors,
            details,
            status: ToolStatus::Ok,
            latency_ms,
        }
    }

    pub fn failed(tool: &str, reason: &str, latency_ms: u64) -> Self {
        Self {
            tool: tool.to_string(),
            contribution: 0.0,
            rationale: format!("{tool} failed: {reason}"),
            risk_factors: vec![],
            details: serde_json::Value::Null,
            status: ToolStatus::Failed,
            latency_ms,
        }
    }

    pub fn no_signal(tool: &str, reason: &str, latency_ms: u64) -> Self {
        Self {
            tool: tool.to_string(),
            contribution: 0.0,
            rationale: reason.to_string(),
            risk_factors: vec![],
            details: serde_json::Value::Null,
            status: ToolStatus::NoSignal,
            latency_ms,
        }
    }

    pub fn timed_out(tool: &str, latency_ms: u64) -> Self {
        Self {
            tool: tool.to_string(),
            contribution: 0.0,
            rationale: format!("{tool} timed out after {latency_ms} ms"),
            risk_factors: vec![],
            details: serde_json::Value::Null,
            status: ToolStatus::TimedOut,
            latency_ms,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }
}
