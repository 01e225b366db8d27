//! Context providers: independent enrichment sources fetched concurrently
//! for every request and cached by `(provider, subject)`.

pub mod behavior;
pub mod counterparty;
pub mod geolocation;
pub mod patterns;
pub mod recent_activity;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fros_models::{AgentContext, FrosConfig, Transaction};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::ProviderError;
use crate::history::HistorySource;

pub use behavior::{baseline_as_of, AccountHistory, BehaviorBaseline, BehaviorProvider};
pub use counterparty::{CounterpartyProfile, CounterpartyProvider};
pub use geolocation::{GeoAssessment, GeolocationProvider};
pub use patterns::{PatternMatch, PatternProvider};
pub use recent_activity::{RecentActivity, RecentActivityProvider};

/// A source of enrichment data about some subject of a transaction.
///
/// `fetch` must depend only on the subject and the provider's own data
/// source, so that a cached value for the same subject is interchangeable
/// with a fresh one.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Cache subject this transaction maps to.
    fn subject(&self, tx: &Transaction) -> String;

    async fn fetch(&self, tx: &Transaction) -> Result<serde_json::Value, ProviderError>;
}

/// A provider plus the limits it was registered with.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub provider: Arc<dyn ContextProvider>,
    pub timeout: Duration,
    /// Zero disables caching.
    pub cache_ttl: Duration,
}

impl RegisteredProvider {
    pub fn new(provider: Arc<dyn ContextProvider>, timeout: Duration, cache_ttl: Duration) -> Self {
        Self {
            provider,
            timeout,
            cache_ttl,
        }
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }
}

/// Build the enabled built-in providers named in `config.providers`.
/// Unknown names are skipped with a warning.
pub fn standard_providers(
    config: &FrosConfig,
    history: Arc<dyn HistorySource>,
) -> Vec<RegisteredProvider> {
    let reference = &config.reference;
    let mut out = Vec::new();

    for entry in config.providers.iter().filter(|p| p.enabled) {
        let provider: Arc<dyn ContextProvider> = match entry.name.as_str() {
            "behavior" => Arc::new(BehaviorProvider::new(
                Arc::clone(&history),
                reference.history_limit,
            )),
            "recent_activity" => Arc::new(RecentActivityProvider::new(
                Arc::clone(&history),
                reference.velocity_window(),
                reference.history_limit,
            )),
            "counterparty" => Arc::new(CounterpartyProvider::new(
                reference.flagged_counterparties.clone(),
            )),
            "geolocation" => Arc::new(GeolocationProvider::new(
                reference.home_locations.clone(),
                reference.high_risk_countries.clone(),
            )),
            "patterns" => Arc::new(PatternProvider::new(
                reference.merchant_category_risk.clone(),
                reference.reporting_threshold_minor,
            )),
            other => {
                warn!(provider = %other, "Unknown provider in config, skipping");
                continue;
            }
        };
        out.push(RegisteredProvider::new(
            provider,
            entry.timeout(),
            entry.cache_ttl(),
        ));
    }

    out
}

/// Typed view of a provider's fragment. `None` when the provider delivered
/// nothing or delivered something of another shape; both mean "no signal".
pub fn fragment_as<T: DeserializeOwned>(ctx: &AgentContext, provider: &str) -> Option<T> {
    ctx.value(provider)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}
