use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// One unit of context produced by a provider for a subject, with an expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextFragment {
    pub provider: String,
    /// What the fragment describes (an account, a counterparty, a transaction shape).
    pub subject: String,
    pub value: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl ContextFragment {
    pub fn new(provider: &str, subject: &str, value: serde_json::Value, ttl: Duration) -> Self {
        Self {
            provider: provider.to_string(),
            subject: subject.to_string(),
            value,
            fetched_at: Utc::now(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.fetched_at + chrono::Duration::milliseconds(self.ttl_ms as i64)
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

/// Why a provider contributed no fragment to a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentAbsence {
    /// The provider reported `ProviderUnavailable`.
    Unavailable { reason: String },
    /// The provider did not answer within its own timeout or the stage cap.
    TimedOut,
    /// The provider task died without answering.
    Aborted { reason: String },
}

/// Where a present fragment came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FragmentOrigin {
    Cache,
    Fetched,
}

/// Context gathered for one request. Built once through [`AgentContextBuilder`]
/// and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentContext {
    transaction: Transaction,
    fragments: BTreeMap<String, ContextFragment>,
    origins: BTreeMap<String, FragmentOrigin>,
    absent: BTreeMap<String, FragmentAbsence>,
}

impl AgentContext {
    pub fn builder(transaction: Transaction) -> AgentContextBuilder {
        AgentContextBuilder {
            inner: AgentContext {
                transaction,
                fragments: BTreeMap::new(),
                origins: BTreeMap::new(),
                absent: BTreeMap::new(),
            },
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn fragment(&self, provider: &str) -> Option<&ContextFragment> {
        self.fragments.get(provider)
    }

    /// The fragment value for a provider, if the provider delivered one.
    pub fn value(&self, provider: &str) -> Option<&serde_json::Value> {
        self.fragments.get(provider).map(|f| &f.value)
    }

    pub fn fragments(&self) -> &BTreeMap<String, ContextFragment> {
        &self.fragments
    }

    pub fn origin(&self, provider: &str) -> Option<FragmentOrigin> {
        self.origins.get(provider).copied()
    }

    pub fn absent(&self) -> &BTreeMap<String, FragmentAbsence> {
        &self.absent
    }

    pub fn is_absent(&self, provider: &str) -> bool {
        self.absent.contains_key(provider)
    }
}

/// Mutable phase of an [`AgentContext`].
#[derive(Debug)]
pub struct AgentContextBuilder {
    inner: AgentContext,
}

impl AgentContextBuilder {
    pub fn insert(&mut self, fragment: ContextFragment, origin: FragmentOrigin) -> &mut Self {
        let provider = fragment.provider.clone();
        self.inner.absent.remove(&provider);
        self.inner.origins.insert(provider.clone(), origin);
        self.inner.fragments.insert(provider, fragment);
        self
    }

    pub fn mark_absent(&mut self, provider: &str, absence: FragmentAbsence) -> &mut Self {
        if !self.inner.fragments.contains_key(provider) {
            self.inner.absent.insert(provider.to_string(), absence);
        }
        self
    }

    pub fn freeze(self) -> AgentContext {
        self.inner
    }
}
