use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const OUTPUT_SCHEMA_VERSION: u32 = 1;

/// Discrete risk tier derived from the score by threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn action(self) -> RecommendedAction {
        match self {
            RiskTier::Low => RecommendedAction::Approve,
            RiskTier::Medium => RecommendedAction::Review,
            RiskTier::High => RecommendedAction::Block,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        };
        f.write_str(s)
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            other => Err(format!("unknown risk tier: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Approve,
    Review,
    Block,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecommendedAction::Approve => "approve",
            RecommendedAction::Review => "review",
            RecommendedAction::Block => "block",
        };
        f.write_str(s)
    }
}

impl FromStr for RecommendedAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(RecommendedAction::Approve),
            "review" => Ok(RecommendedAction::Review),
            "block" => Ok(RecommendedAction::Block),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Which synthesis path produced a decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisSource {
    Backend,
    Fallback,
}

/// Score boundaries between tiers: `score < review` is low,
/// `review <= score < block` is medium, `score >= block` is high.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierThresholds {
    pub review: f64,
    pub block: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            review: 0.3,
            block: 0.7,
        }
    }
}

impl TierThresholds {
    pub fn tier_for(&self, score: f64) -> RiskTier {
        if score >= self.block {
            RiskTier::High
        } else if score >= self.review {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.review)
            && (0.0..=1.0).contains(&self.block)
            && self.review <= self.block
    }
}

/// The terminal artifact of one request. Never mutated after it is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: Uuid,
    pub schema_version: u32,
    pub transaction_id: String,
    /// Aggregate risk 0.0 to 1.0.
    pub score: f64,
    pub tier: RiskTier,
    pub action: RecommendedAction,
    /// Ordered contributing rationales, most significant first.
    pub explanation: Vec<String>,
    pub primary_risk_factors: Vec<String>,
    /// Contribution of each tool that completed.
    pub component_scores: BTreeMap<String, f64>,
    /// 0.0 to 1.0 confidence in the score itself.
    pub confidence: f64,
    pub source: SynthesisSource,
    /// Why the backend was not used, for fallback decisions.
    #[serde(default)]
    pub fallback_reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_fallback(&self) -> bool {
        self.source == SynthesisSource::Fallback
    }
}
