//! Analysis tools and the registry they are installed into at startup.

pub mod amount;
pub mod counterparty_geo;
pub mod merchant;
pub mod temporal;
pub mod velocity;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fros_models::{AgentContext, FrosConfig, Transaction};
use tracing::warn;

use crate::error::ToolError;

pub use amount::AmountDeviationTool;
pub use counterparty_geo::CounterpartyGeoTool;
pub use merchant::MerchantRiskTool;
pub use temporal::TemporalAnomalyTool;
pub use velocity::VelocityTool;

/// What a tool concluded. The orchestrator turns it into a `ToolResult`
/// with status and latency attached, clamping the contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub contribution: f64,
    pub rationale: String,
    pub risk_factors: Vec<String>,
    pub details: serde_json::Value,
}

impl Finding {
    pub fn new(contribution: f64, rationale: impl Into<String>) -> Self {
        Self {
            contribution,
            rationale: rationale.into(),
            risk_factors: Vec::new(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_factors(mut self, factors: Vec<String>) -> Self {
        self.risk_factors = factors;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// An independent, stateless analysis routine.
///
/// `analyze` must be a pure function of its inputs and must not look at any
/// other tool's output. It is awaited under the tool's own timeout, so a tool
/// that waits on I/O must do so asynchronously to be cancellable.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn analyze(&self, tx: &Transaction, ctx: &AgentContext) -> Result<Finding, ToolError>;
}

#[derive(Clone)]
pub struct RegisteredTool {
    pub tool: Arc<dyn Tool>,
    pub timeout: Duration,
}

impl RegisteredTool {
    pub fn name(&self) -> &str {
        self.tool.name()
    }
}

/// Fixed catalog of tools, built once at process start.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations under an existing name replace the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>, timeout: Duration) -> &mut Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(RegisteredTool { tool, timeout });
        self
    }

    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `(name, description)` pairs, as listed by `fros tools`.
    pub fn catalog(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|t| (t.name().to_string(), t.tool.description().to_string()))
            .collect()
    }

    /// The built-in tools enabled in `config.tools`.
    pub fn standard(config: &FrosConfig) -> Self {
        let mut registry = Self::new();
        for entry in config.tools.iter().filter(|t| t.enabled) {
            let tool: Arc<dyn Tool> = match entry.name.as_str() {
                "amount_deviation" => Arc::new(AmountDeviationTool),
                "temporal_anomaly" => Arc::new(TemporalAnomalyTool),
                "counterparty_geo" => Arc::new(CounterpartyGeoTool),
                "velocity" => Arc::new(VelocityTool),
                "merchant_risk" => Arc::new(MerchantRiskTool),
                other => {
                    warn!(tool = %other, "Unknown tool in config, skipping");
                    continue;
                }
            };
            registry.register(tool, entry.timeout());
        }
        registry
    }
}

pub fn categorize_amount(major: f64) -> &'static str {
    if major < 10.0 {
        "micro"
    } else if major < 100.0 {
        "small"
    } else if major < 500.0 {
        "medium"
    } else if major < 2_000.0 {
        "large"
    } else {
        "very_large"
    }
}

pub fn categorize_hour(hour: u32) -> &'static str {
    match hour {
        6..=9 => "morning",
        10..=16 => "business_hours",
        17..=21 => "evening",
        22..=23 => "late_evening",
        _ => "night",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fros_models::ToolConfig;

    #[test]
    fn standard_registry_honours_enable_flags() {
        let mut config = FrosConfig::default();
        config.tools.retain(|t| t.name != "merchant_risk");
        config.tools[0].enabled = false;
        let mut slow = ToolConfig::new("velocity");
        slow.timeout_ms = 900;
        config.tools.push(slow);

        let registry = ToolRegistry::standard(&config);
        let names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["temporal_anomaly", "counterparty_geo", "velocity"]);
        assert_eq!(registry.get("velocity").unwrap().timeout, Duration::from_millis(900));
        assert!(registry.get("amount_deviation").is_none());
    }

    #[test]
    fn catalog_lists_descriptions() {
        let registry = ToolRegistry::standard(&FrosConfig::default());
        let catalog = registry.catalog();
        assert_eq!(catalog.len(), 5);
        assert!(catalog.iter().all(|(_, d)| !d.is_empty()));
    }

    #[test]
    fn amount_categories() {
        assert_eq!(categorize_amount(4.5), "micro");
        assert_eq!(categorize_amount(45.0), "small");
        assert_eq!(categorize_amount(450.0), "medium");
        assert_eq!(categorize_amount(1_999.99), "large");
        assert_eq!(categorize_amount(2_500.0), "very_large");
    }

    #[test]
    fn hour_categories() {
        assert_eq!(categorize_hour(3), "night");
        assert_eq!(categorize_hour(7), "morning");
        assert_eq!(categorize_hour(14), "business_hours");
        assert_eq!(categorize_hour(19), "evening");
        assert_eq!(categorize_hour(23), "late_evening");
    }
}
