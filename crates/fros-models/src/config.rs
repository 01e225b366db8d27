use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decision::TierThresholds;
use crate::transaction::GeoPoint;

/// Top-level configuration for the scoring engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrosConfig {
    pub cache: CacheConfig,
    pub orchestrator: OrchestratorConfig,
    pub synthesis: SynthesisConfig,
    pub providers: Vec<ProviderConfig>,
    pub tools: Vec<ToolConfig>,
    pub ledger: LedgerConfig,
    pub reference: ReferenceConfig,
    pub bank: Option<BankConfig>,
}

impl Default for FrosConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            synthesis: SynthesisConfig::default(),
            providers: default_providers(),
            tools: default_tools(),
            ledger: LedgerConfig::default(),
            reference: ReferenceConfig::default(),
            bank: None,
        }
    }
}

impl FrosConfig {
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// Configuration for the in-memory context cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of fragments kept in memory.
    pub max_capacity: u64,
    /// Interval between sweeps of expired fragments.
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            sweep_interval_seconds: 60,
        }
    }
}

/// Per-stage deadlines. Total request latency is bounded by their sum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub context_stage_timeout_ms: u64,
    pub tool_stage_timeout_ms: u64,
    pub synthesis_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            context_stage_timeout_ms: 1_500,
            tool_stage_timeout_ms: 1_000,
            synthesis_timeout_ms: 30_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn context_stage_timeout(&self) -> Duration {
        Duration::from_millis(self.context_stage_timeout_ms)
    }

    pub fn tool_stage_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_stage_timeout_ms)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }

    /// Upper bound on time-to-decision.
    pub fn latency_budget(&self) -> Duration {
        self.context_stage_timeout() + self.tool_stage_timeout() + self.synthesis_timeout()
    }
}

/// Whether synthesis may call the external reasoning backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    #[default]
    Backend,
    /// Never call the backend; every decision is computed locally.
    FallbackOnly,
}

/// Configuration for the synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub mode: SynthesisMode,
    /// Model passed to the reasoning backend.
    pub model: String,
    pub thresholds: TierThresholds,
    /// Tool name -> weight in the fallback weighted sum.
    pub weights: BTreeMap<String, f64>,
    /// Weight for tools with no entry in `weights`.
    pub default_weight: f64,
    /// How many tools the fallback explanation names.
    pub top_contributors: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        let weights = [
            ("amount_deviation", 0.35),
            ("temporal_anomaly", 0.25),
            ("counterparty_geo", 0.30),
            ("velocity", 0.30),
            ("merchant_risk", 0.20),
        ]
        .into_iter()
        .map(|(name, w)| (name.to_string(), w))
        .collect();

        Self {
            mode: SynthesisMode::Backend,
            model: "claude-sonnet-4-5-20250929".to_string(),
            thresholds: TierThresholds::default(),
            weights,
            default_weight: 0.2,
            top_contributors: 3,
        }
    }
}

impl SynthesisConfig {
    pub fn weight_for(&self, tool: &str) -> f64 {
        self.weights
            .get(tool)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

/// Configuration for a single context provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_provider_timeout")]
    pub timeout_ms: u64,
    /// How long a fetched fragment is reused. 0 disables caching.
    #[serde(default = "default_provider_ttl")]
    pub cache_ttl_seconds: u64,
}

impl ProviderConfig {
    pub fn new(name: &str, cache_ttl_seconds: u64) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            timeout_ms: default_provider_timeout(),
            cache_ttl_seconds,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

/// Configuration for a single analysis tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tool_timeout")]
    pub timeout_ms: u64,
}

impl ToolConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            timeout_ms: default_tool_timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where execution records are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite file for a durable ledger. None keeps records in memory.
    pub sqlite_path: Option<String>,
}

/// A counterparty with a known fraud history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlaggedCounterparty {
    /// 0.0 to 1.0.
    pub risk_score: f64,
    #[serde(default)]
    pub fraud_reports: u32,
}

/// Reference data consumed by the built-in providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReferenceConfig {
    /// ISO alpha-2 country codes treated as high risk.
    pub high_risk_countries: Vec<String>,
    /// Account -> home location.
    pub home_locations: BTreeMap<String, GeoPoint>,
    pub flagged_counterparties: BTreeMap<String, FlaggedCounterparty>,
    /// Merchant category -> risk 0.0 to 1.0.
    pub merchant_category_risk: BTreeMap<String, f64>,
    /// How many past transactions feed the behavioural baseline.
    pub history_limit: usize,
    /// Sliding window for the velocity tool.
    pub velocity_window_seconds: u64,
    /// Regulatory reporting threshold in minor units (structuring detection).
    pub reporting_threshold_minor: i64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        let merchant_category_risk = [
            ("gambling", 0.7),
            ("crypto_exchange", 0.6),
            ("gift_cards", 0.6),
            ("money_transfer", 0.5),
            ("electronics", 0.4),
            ("travel", 0.2),
            ("retail", 0.1),
            ("grocery", 0.05),
            ("coffee_shop", 0.05),
        ]
        .into_iter()
        .map(|(name, r)| (name.to_string(), r))
        .collect();

        Self {
            high_risk_countries: vec!["KP".to_string(), "IR".to_string(), "SY".to_string()],
            home_locations: BTreeMap::new(),
            flagged_counterparties: BTreeMap::new(),
            merchant_category_risk,
            history_limit: 100,
            velocity_window_seconds: 300,
            reporting_threshold_minor: 1_000_000,
        }
    }
}

impl ReferenceConfig {
    pub fn velocity_window(&self) -> Duration {
        Duration::from_secs(self.velocity_window_seconds)
    }
}

/// Read-only access to the wrapped banking system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankConfig {
    pub base_url: String,
    #[serde(default = "default_bank_timeout")]
    pub request_timeout_ms: u64,
    /// Bearer token for the bank's public API, if it requires one.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl BankConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_true() -> bool {
    true
}
fn default_provider_timeout() -> u64 {
    500
}
fn default_provider_ttl() -> u64 {
    300
}
fn default_tool_timeout() -> u64 {
    200
}
fn default_bank_timeout() -> u64 {
    5_000
}

/// The built-in provider set with the cache lifetimes used in production.
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new("behavior", 300),
        ProviderConfig::new("recent_activity", 0),
        ProviderConfig::new("counterparty", 600),
        ProviderConfig::new("geolocation", 180),
        ProviderConfig::new("patterns", 900),
    ]
}

pub fn default_tools() -> Vec<ToolConfig> {
    [
        "amount_deviation",
        "temporal_anomaly",
        "counterparty_geo",
        "velocity",
        "merchant_risk",
    ]
    .into_iter()
    .map(ToolConfig::new)
    .collect()
}
