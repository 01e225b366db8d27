//! Scriptable providers, tools, histories and backends for exercising the
//! orchestrator without a network or the `claude` binary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fros_models::{
    AgentContext, ContextFragment, FragmentOrigin, GeoPoint, Transaction, TransactionMetadata,
};
use serde_json::{json, Value};

use crate::error::{BackendError, ProviderError, ToolError};
use crate::history::HistorySource;
use crate::providers::{AccountHistory, ContextProvider};
use crate::synthesizer::ReasoningBackend;
use crate::tools::{Finding, Tool};

pub fn tx_at(id: &str, amount: i64, timestamp: DateTime<Utc>, origin: &str, destination: &str) -> Transaction {
    Transaction {
        id: id.to_string(),
        amount,
        timestamp,
        origin_account: origin.to_string(),
        destination_account: destination.to_string(),
        metadata: None,
    }
}

pub fn with_location(mut tx: Transaction, location: GeoPoint) -> Transaction {
    tx.metadata.get_or_insert_with(TransactionMetadata::default).location = Some(location);
    tx
}

pub fn with_category(mut tx: Transaction, category: &str) -> Transaction {
    tx.metadata.get_or_insert_with(TransactionMetadata::default).merchant_category =
        Some(category.to_string());
    tx
}

/// A frozen context holding the given provider values, all freshly fetched.
pub fn context_with(tx: &Transaction, fragments: &[(&str, Value)]) -> AgentContext {
    let mut builder = AgentContext::builder(tx.clone());
    for (provider, value) in fragments {
        builder.insert(
            ContextFragment::new(provider, "test", value.clone(), Duration::from_secs(60)),
            FragmentOrigin::Fetched,
        );
    }
    builder.freeze()
}

/// A `behavior` fragment of `tx`'s origin account: one earlier transaction
/// per `(amount, counterparty, hour)`, a day apart going back from `tx`.
pub fn behavior_fragment(tx: &Transaction, past: &[(i64, &str, u32)]) -> Value {
    let transactions: Vec<Transaction> = past
        .iter()
        .enumerate()
        .map(|(i, (amount, counterparty, hour))| {
            let day = (tx.timestamp - chrono::Duration::days(i as i64 + 1)).date_naive();
            let timestamp = day
                .and_hms_opt(*hour, 0, 0)
                .map(|t| t.and_utc())
                .unwrap_or(tx.timestamp - chrono::Duration::days(i as i64 + 1));
            tx_at(&format!("past-{i}"), *amount, timestamp, &tx.origin_account, counterparty)
        })
        .collect();
    serde_json::to_value(AccountHistory {
        account: tx.origin_account.clone(),
        transactions,
    })
    .unwrap_or(Value::Null)
}

/// Fixed account history.
#[derive(Default)]
pub struct StaticHistory {
    transactions: Vec<Transaction>,
    failure: Option<String>,
}

impl StaticHistory {
    pub fn with(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            transactions: Vec::new(),
            failure: Some(reason.to_string()),
        }
    }
}

#[async_trait]
impl HistorySource for StaticHistory {
    fn name(&self) -> &str {
        "static"
    }

    async fn recent(&self, account: &str, limit: usize) -> Result<Vec<Transaction>, ProviderError> {
        if let Some(reason) = &self.failure {
            return Err(ProviderError::Unavailable(reason.clone()));
        }
        let mut out: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.origin_account == account)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(limit);
        Ok(out)
    }
}

enum Script {
    Reply(String),
    Fail(String),
    Hang,
}

/// A reasoning backend with a canned behaviour.
pub struct ScriptedBackend {
    script: Script,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(raw: &str) -> Self {
        Self::new(Script::Reply(raw.to_string()))
    }

    pub fn failing(reason: &str) -> Self {
        Self::new(Script::Fail(reason.to_string()))
    }

    /// Never answers; relies on the caller's timeout.
    pub fn hanging() -> Self {
        Self::new(Script::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn assess(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(user_prompt.to_string());
        }
        match &self.script {
            Script::Reply(raw) => Ok(raw.clone()),
            Script::Fail(reason) => Err(BackendError::Cli(reason.clone())),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Err(BackendError::Cli("hanging backend woke up".to_string()))
            }
        }
    }
}

/// Returns a fixed value keyed on the origin account and counts fetches.
pub struct CountingProvider {
    name: String,
    fetches: AtomicUsize,
}

impl CountingProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextProvider for CountingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn subject(&self, tx: &Transaction) -> String {
        tx.origin_account.clone()
    }

    async fn fetch(&self, tx: &Transaction) -> Result<Value, ProviderError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "account": tx.origin_account, "fetch": n }))
    }
}

/// Sleeps for `delay` before answering.
pub struct SlowProvider {
    name: String,
    delay: Duration,
}

impl SlowProvider {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl ContextProvider for SlowProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn subject(&self, tx: &Transaction) -> String {
        tx.origin_account.clone()
    }

    async fn fetch(&self, _tx: &Transaction) -> Result<Value, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!({ "slow": true }))
    }
}

pub struct FailingProvider {
    name: String,
}

impl FailingProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl ContextProvider for FailingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn subject(&self, tx: &Transaction) -> String {
        tx.origin_account.clone()
    }

    async fn fetch(&self, _tx: &Transaction) -> Result<Value, ProviderError> {
        Err(ProviderError::Unavailable("scripted outage".to_string()))
    }
}

/// Reports the same contribution for every transaction.
pub struct FixedTool {
    name: String,
    contribution: f64,
}

impl FixedTool {
    pub fn new(name: &str, contribution: f64) -> Self {
        Self {
            name: name.to_string(),
            contribution,
        }
    }
}

#[async_trait]
impl Tool for FixedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Fixed contribution"
    }

    async fn analyze(&self, _tx: &Transaction, _ctx: &AgentContext) -> Result<Finding, ToolError> {
        Ok(Finding::new(self.contribution, format!("{} fixed at {}", self.name, self.contribution))
            .with_factors(vec![format!("{}_fixed", self.name)]))
    }
}

pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn analyze(&self, _tx: &Transaction, _ctx: &AgentContext) -> Result<Finding, ToolError> {
        Err(ToolError::Failure("scripted failure".to_string()))
    }
}

pub struct PanickingTool {
    name: String,
}

impl PanickingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always panics"
    }

    async fn analyze(&self, _tx: &Transaction, _ctx: &AgentContext) -> Result<Finding, ToolError> {
        panic!("{} blew up", self.name)
    }
}

/// Takes `delay` to answer, then reports 1.0.
pub struct SlowTool {
    name: String,
    delay: Duration,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Slow to answer"
    }

    async fn analyze(&self, _tx: &Transaction, _ctx: &AgentContext) -> Result<Finding, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(Finding::new(1.0, "late answer"))
    }
}
