use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fros_models::decision::OUTPUT_SCHEMA_VERSION;
use fros_models::{
    AgentContext, Decision, SynthesisConfig, SynthesisMode, SynthesisSource, ToolResult,
    Transaction,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BackendError;
use crate::parser::{parse_verdict, BackendVerdict};
use crate::prompts::{synthesis_user_prompt, synthesizer_system_prompt};

/// Score used when no tool produced a usable result. Lands in the middle
/// tier under the default thresholds so the transaction gets a human look.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// The external "score + explain" call. Returns raw text; validation is the
/// synthesizer's job.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn assess(&self, system_prompt: &str, user_prompt: &str) -> Result<String, BackendError>;
}

/// Combines tool findings into one Decision. Never fails: every backend
/// problem ends in the deterministic fallback.
pub struct Synthesizer {
    backend: Option<Arc<dyn ReasoningBackend>>,
    config: SynthesisConfig,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(
        backend: Option<Arc<dyn ReasoningBackend>>,
        config: SynthesisConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            config,
            timeout,
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub async fn synthesize(
        &self,
        tx: &Transaction,
        ctx: &AgentContext,
        results: &[ToolResult],
    ) -> Decision {
        match self.consult_backend(tx, ctx, results).await {
            Ok(verdict) => self.from_verdict(tx, results, verdict),
            Err(e) => {
                match &e {
                    BackendError::Disabled(_) => {
                        debug!(transaction_id = %tx.id, reason = %e, "Using fallback synthesis")
                    }
                    _ => warn!(transaction_id = %tx.id, error = %e, "Backend synthesis failed, using fallback"),
                }
                self.fallback(tx, results, e.to_string())
            }
        }
    }

    async fn consult_backend(
        &self,
        tx: &Transaction,
        ctx: &AgentContext,
        results: &[ToolResult],
    ) -> Result<BackendVerdict, BackendError> {
        if self.config.mode == SynthesisMode::FallbackOnly {
            return Err(BackendError::Disabled("fallback_only mode".to_string()));
        }
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| BackendError::Disabled("no reasoning backend configured".to_string()))?;

        let system_prompt = synthesizer_system_prompt(&self.config.thresholds);
        let user_prompt = synthesis_user_prompt(tx, ctx, results);

        debug!(transaction_id = %tx.id, backend = %backend.name(), "Requesting backend verdict");
        let raw = tokio::time::timeout(self.timeout, backend.assess(&system_prompt, &user_prompt))
            .await
            .map_err(|_| BackendError::Timeout(self.timeout.as_millis() as u64))??;

        parse_verdict(&raw)
    }

    fn from_verdict(&self, tx: &Transaction, results: &[ToolResult], verdict: BackendVerdict) -> Decision {
        let tier = self.config.thresholds.tier_for(verdict.score);
        let action = tier.action();
        if verdict.tier != tier || verdict.action != action {
            warn!(
                transaction_id = %tx.id,
                score = verdict.score,
                backend_tier = %verdict.tier,
                backend_action = %verdict.action,
                tier = %tier,
                "Backend tier disagrees with configured thresholds; using thresholds"
            );
        }

        let primary_risk_factors = if verdict.primary_risk_factors.is_empty() {
            self.top_factors(results)
        } else {
            verdict.primary_risk_factors
        };

        info!(transaction_id = %tx.id, score = verdict.score, tier = %tier, "Backend verdict accepted");

        Decision {
            id: Uuid::new_v4(),
            schema_version: OUTPUT_SCHEMA_VERSION,
            transaction_id: tx.id.clone(),
            score: verdict.score,
            tier,
            action,
            explanation: verdict.explanation,
            primary_risk_factors,
            component_scores: component_scores(results),
            confidence: verdict.confidence.unwrap_or_else(|| fallback_confidence(results)),
            source: SynthesisSource::Backend,
            fallback_reason: None,
            decided_at: Utc::now(),
        }
    }

    /// Weighted sum of ok contributions, clamped to [0, 1]. No-signal, failed
    /// and timed-out tools are neutral: they add nothing and are not counted.
    pub fn fallback_score(&self, results: &[ToolResult]) -> f64 {
        let ok: Vec<&ToolResult> = results.iter().filter(|r| r.is_ok()).collect();
        if ok.is_empty() {
            return NEUTRAL_SCORE;
        }
        let sum: f64 = ok
            .iter()
            .map(|r| self.config.weight_for(&r.tool) * r.contribution)
            .sum();
        if sum.is_finite() {
            sum.clamp(0.0, 1.0)
        } else {
            NEUTRAL_SCORE
        }
    }

    pub fn fallback(&self, tx: &Transaction, results: &[ToolResult], reason: String) -> Decision {
        let score = self.fallback_score(results);
        let tier = self.config.thresholds.tier_for(score);
        let ok_count = results.iter().filter(|r| r.is_ok()).count();

        let mut explanation = vec![format!(
            "Deterministic fallback score {score:.2} from {ok_count} of {} tools",
            results.len()
        )];
        let top = self.top_contributors(results);
        if top.is_empty() {
            explanation.push("No tool reported risk indicators".to_string());
        }
        for (r, weighted) in &top {
            explanation.push(format!("{} ({weighted:.2}): {}", r.tool, r.rationale));
        }
        let silent: Vec<&str> = results
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| r.tool.as_str())
            .collect();
        if !silent.is_empty() {
            explanation.push(format!("No signal from: {}", silent.join(", ")));
        }

        Decision {
            id: Uuid::new_v4(),
            schema_version: OUTPUT_SCHEMA_VERSION,
            transaction_id: tx.id.clone(),
            score,
            tier,
            action: tier.action(),
            explanation,
            primary_risk_factors: self.top_factors(results),
            component_scores: component_scores(results),
            confidence: fallback_confidence(results),
            source: SynthesisSource::Fallback,
            fallback_reason: Some(reason),
            decided_at: Utc::now(),
        }
    }

    /// Ok results with a positive weighted contribution, largest first.
    fn top_contributors<'a>(&self, results: &'a [ToolResult]) -> Vec<(&'a ToolResult, f64)> {
        let mut ranked: Vec<(&ToolResult, f64)> = results
            .iter()
            .filter(|r| r.is_ok())
            .map(|r| (r, self.config.weight_for(&r.tool) * r.contribution))
            .filter(|(_, w)| *w > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(self.config.top_contributors);
        ranked
    }

    fn top_factors(&self, results: &[ToolResult]) -> Vec<String> {
        let mut factors: Vec<String> = Vec::new();
        for (r, _) in self.top_contributors(results) {
            for f in &r.risk_factors {
                if !factors.contains(f) {
                    factors.push(f.clone());
                }
            }
        }
        factors
    }
}

fn component_scores(results: &[ToolResult]) -> BTreeMap<String, f64> {
    results
        .iter()
        .filter(|r| r.is_ok())
        .map(|r| (r.tool.clone(), r.contribution))
        .collect()
}

/// Agreement scaled by coverage: a decision resting on two of five tools is
/// less certain than the same agreement among all five.
pub fn fallback_confidence(results: &[ToolResult]) -> f64 {
    if results.is_empty() {
        return agreement_confidence(results);
    }
    let signalling = results.iter().filter(|r| r.is_ok()).count();
    agreement_confidence(results) * signalling as f64 / results.len() as f64
}

/// Agreement between tools: `max(0.5, 1 - variance)` over ok contributions.
pub fn agreement_confidence(results: &[ToolResult]) -> f64 {
    let scores: Vec<f64> = results
        .iter()
        .filter(|r| r.is_ok())
        .map(|r| r.contribution)
        .collect();
    if scores.is_empty() {
        return 0.5;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
    (1.0 - variance).max(0.5)
}
