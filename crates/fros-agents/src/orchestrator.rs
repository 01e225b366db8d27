use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use fros_models::{
    AgentContext, ContextFragment, Decision, ExecutionRecord, FragmentAbsence, FragmentOrigin,
    OrchestratorConfig, StageTimings, ToolResult, ToolStatus, Transaction,
};
use fros_store::{ContextCache, ExecutionLedger, StoreError};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, ProviderError, ToolError};
use crate::providers::RegisteredProvider;
use crate::synthesizer::Synthesizer;
use crate::tools::ToolRegistry;

const NOTIFICATION_CAPACITY: usize = 256;

/// Lifecycle of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    ContextGathering,
    ToolExecution,
    Synthesizing,
    Complete,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::ContextGathering => "context_gathering",
            Stage::ToolExecution => "tool_execution",
            Stage::Synthesizing => "synthesizing",
            Stage::Complete => "complete",
            Stage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a request that did not fault.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Freshly computed and recorded.
    Decided(Decision),
    /// The identifier was already processed; this is the first-recorded decision.
    Duplicate(Decision),
}

impl Evaluation {
    pub fn decision(&self) -> &Decision {
        match self {
            Evaluation::Decided(d) | Evaluation::Duplicate(d) => d,
        }
    }

    pub fn into_decision(self) -> Decision {
        match self {
            Evaluation::Decided(d) | Evaluation::Duplicate(d) => d,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Evaluation::Duplicate(_))
    }
}

/// Handle to a request running in the background.
pub struct Submission {
    transaction_id: String,
    cancel: CancellationToken,
    receiver: oneshot::Receiver<Result<Evaluation, OrchestratorError>>,
}

impl Submission {
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Abandon the request. In-flight providers and tools are aborted and
    /// nothing is recorded. No effect once the decision has been recorded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<Evaluation, OrchestratorError> {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(OrchestratorError::Fault(
                "request task ended without reporting".to_string(),
            )),
        }
    }
}

/// Drives requests through context gathering, tool execution and synthesis.
pub struct Orchestrator {
    providers: Vec<RegisteredProvider>,
    tools: ToolRegistry,
    synthesizer: Synthesizer,
    cache: Arc<ContextCache>,
    ledger: Arc<dyn ExecutionLedger>,
    config: OrchestratorConfig,
    notifications: broadcast::Sender<Decision>,
}

impl Orchestrator {
    pub fn new(
        providers: Vec<RegisteredProvider>,
        tools: ToolRegistry,
        synthesizer: Synthesizer,
        cache: Arc<ContextCache>,
        ledger: Arc<dyn ExecutionLedger>,
        config: OrchestratorConfig,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            providers,
            tools,
            synthesizer,
            cache,
            ledger,
            config,
            notifications,
        }
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    pub fn ledger(&self) -> &Arc<dyn ExecutionLedger> {
        &self.ledger
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Receive every freshly recorded decision. Duplicates are not re-sent.
    pub fn subscribe(&self) -> broadcast::Receiver<Decision> {
        self.notifications.subscribe()
    }

    /// Audit lookup by transaction identifier.
    pub fn record(&self, transaction_id: &str) -> Result<Option<ExecutionRecord>, OrchestratorError> {
        Ok(self.ledger.get(transaction_id)?)
    }

    /// Start a request in the background and return immediately.
    pub fn submit(self: &Arc<Self>, tx: Transaction) -> Submission {
        let (sender, receiver) = oneshot::channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let transaction_id = tx.id.clone();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let id = tx.id.clone();
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(transaction_id = %id, "Request cancelled by caller");
                    Err(OrchestratorError::Cancelled)
                }
                result = this.evaluate(tx) => result,
            };
            // The caller may have dropped its handle.
            let _ = sender.send(outcome);
        });

        Submission {
            transaction_id,
            cancel,
            receiver,
        }
    }

    /// Run one request to completion.
    pub async fn evaluate(&self, tx: Transaction) -> Result<Evaluation, OrchestratorError> {
        let start = Instant::now();
        let request_id = Uuid::new_v4();
        self.enter(Stage::Received, &tx.id);
        info!(transaction_id = %tx.id, request_id = %request_id, amount = tx.amount, "Starting evaluation");

        if let Err(reason) = tx.validate() {
            warn!(transaction_id = %tx.id, reason = %reason, "Rejecting transaction");
            return Err(OrchestratorError::Rejected(reason));
        }

        if let Some(prior) = self.ledger.get(&tx.id).map_err(|e| self.fail(&tx.id, e))? {
            info!(transaction_id = %tx.id, "Transaction already processed, returning recorded decision");
            return Ok(Evaluation::Duplicate(prior.decision));
        }

        let tx = Arc::new(tx);

        self.enter(Stage::ContextGathering, &tx.id);
        let stage_start = Instant::now();
        let context = Arc::new(self.gather_context(&tx).await);
        let context_ms = stage_start.elapsed().as_millis() as u64;
        info!(
            transaction_id = %tx.id,
            fragments = context.fragments().len(),
            absent = context.absent().len(),
            elapsed_ms = context_ms,
            "Context gathered"
        );

        self.enter(Stage::ToolExecution, &tx.id);
        let stage_start = Instant::now();
        let tool_results = self.run_tools(&tx, &context).await;
        let tools_ms = stage_start.elapsed().as_millis() as u64;
        info!(
            transaction_id = %tx.id,
            ok = tool_results.iter().filter(|r| r.is_ok()).count(),
            total = tool_results.len(),
            elapsed_ms = tools_ms,
            "Tools finished"
        );

        if tool_results.len() != self.tools.len() {
            return Err(self.fault(
                &tx.id,
                format!(
                    "{} of {} tools reached a terminal state",
                    tool_results.len(),
                    self.tools.len()
                ),
            ));
        }

        self.enter(Stage::Synthesizing, &tx.id);
        let stage_start = Instant::now();
        let decision = self
            .synthesizer
            .synthesize(&tx, &context, &tool_results)
            .await;
        let synthesis_ms = stage_start.elapsed().as_millis() as u64;

        let record = ExecutionRecord {
            request_id,
            transaction: tx.as_ref().clone(),
            context: context.as_ref().clone(),
            tool_results,
            decision: decision.clone(),
            stage_timings: StageTimings {
                context_ms,
                tools_ms,
                synthesis_ms,
            },
            total_latency_ms: start.elapsed().as_millis() as u64,
            recorded_at: Utc::now(),
        };

        // Synchronous on purpose: no await point separates a decision from
        // its record, so a cancelled request leaves neither behind.
        match self.ledger.append(record) {
            Ok(()) => {}
            Err(StoreError::Duplicate(first)) => {
                info!(transaction_id = %tx.id, "Lost race with a concurrent submission, returning recorded decision");
                return Ok(Evaluation::Duplicate(first.decision));
            }
            Err(e) => return Err(self.fail(&tx.id, e)),
        }

        self.enter(Stage::Complete, &tx.id);
        info!(
            transaction_id = %tx.id,
            score = decision.score,
            tier = %decision.tier,
            action = %decision.action,
            source = ?decision.source,
            elapsed_ms = start.elapsed().as_millis(),
            "Evaluation complete"
        );

        // No subscribers is fine.
        let _ = self.notifications.send(decision.clone());
        Ok(Evaluation::Decided(decision))
    }

    /// Fan out to every provider; the stage ends when all have answered or
    /// the stage deadline passes, whichever is first.
    async fn gather_context(&self, tx: &Arc<Transaction>) -> AgentContext {
        let deadline = tokio::time::Instant::now() + self.config.context_stage_timeout();
        let mut builder = AgentContext::builder(tx.as_ref().clone());

        let mut handles = Vec::with_capacity(self.providers.len());
        for registered in &self.providers {
            let registered = registered.clone();
            let cache = Arc::clone(&self.cache);
            let tx = Arc::clone(tx);
            let name = registered.name().to_string();
            let handle = tokio::spawn(async move { fetch_fragment(registered, cache, tx).await });
            handles.push((name, AbortOnDropHandle::new(handle)));
        }

        for (name, handle) in handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(Ok((fragment, origin)))) => {
                    debug!(provider = %name, origin = ?origin, "Provider delivered");
                    builder.insert(fragment, origin);
                }
                Ok(Ok(Err(ProviderError::Timeout(ms)))) => {
                    warn!(transaction_id = %tx.id, provider = %name, timeout_ms = ms, "Provider timed out");
                    builder.mark_absent(&name, FragmentAbsence::TimedOut);
                }
                Ok(Ok(Err(ProviderError::Unavailable(reason)))) => {
                    warn!(transaction_id = %tx.id, provider = %name, reason = %reason, "Provider unavailable");
                    builder.mark_absent(&name, FragmentAbsence::Unavailable { reason });
                }
                Ok(Err(e)) => {
                    error!(transaction_id = %tx.id, provider = %name, error = %e, "Provider task panicked");
                    builder.mark_absent(
                        &name,
                        FragmentAbsence::Aborted {
                            reason: e.to_string(),
                        },
                    );
                }
                Err(_) => {
                    // Dropping the handle aborts the task.
                    warn!(transaction_id = %tx.id, provider = %name, "Provider cut off by context stage deadline");
                    builder.mark_absent(&name, FragmentAbsence::TimedOut);
                }
            }
        }

        builder.freeze()
    }

    /// Run every tool concurrently. Each yields exactly one terminal result.
    async fn run_tools(&self, tx: &Arc<Transaction>, ctx: &Arc<AgentContext>) -> Vec<ToolResult> {
        let stage_start = tokio::time::Instant::now();
        let deadline = stage_start + self.config.tool_stage_timeout();

        let mut handles = Vec::with_capacity(self.tools.len());
        for registered in self.tools.tools() {
            let tool = Arc::clone(&registered.tool);
            let timeout = registered.timeout;
            let tx = Arc::clone(tx);
            let ctx = Arc::clone(ctx);
            let name = registered.name().to_string();

            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let outcome = tokio::time::timeout(timeout, tool.analyze(&tx, &ctx)).await;
                let latency_ms = started.elapsed().as_millis() as u64;
                let name = tool.name();
                match outcome {
                    Ok(Ok(finding)) if finding.contribution.is_nan() => {
                        ToolResult::failed(name, "contribution is not a number", latency_ms)
                    }
                    Ok(Ok(finding)) => ToolResult::ok(
                        name,
                        finding.contribution,
                        finding.rationale,
                        finding.risk_factors,
                        finding.details,
                        latency_ms,
                    ),
                    Ok(Err(ToolError::NoSignal(reason))) => {
                        ToolResult::no_signal(name, &reason, latency_ms)
                    }
                    Ok(Err(e)) => ToolResult::failed(name, &e.to_string(), latency_ms),
                    Err(_) => ToolResult::timed_out(name, latency_ms),
                }
            });
            handles.push((name, AbortOnDropHandle::new(handle)));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    error!(transaction_id = %tx.id, tool = %name, error = %e, "Tool task panicked");
                    ToolResult::failed(&name, "task panicked", stage_start.elapsed().as_millis() as u64)
                }
                Err(_) => ToolResult::timed_out(&name, stage_start.elapsed().as_millis() as u64),
            };

            if result.is_ok() {
                debug!(tool = %name, contribution = result.contribution, latency_ms = result.latency_ms, "Tool succeeded");
            } else if result.status == ToolStatus::NoSignal {
                debug!(tool = %name, rationale = %result.rationale, "Tool had no signal");
            } else {
                warn!(transaction_id = %tx.id, tool = %name, status = ?result.status, rationale = %result.rationale, "Tool produced no signal");
            }
            results.push(result);
        }
        results
    }

    fn enter(&self, stage: Stage, transaction_id: &str) {
        debug!(transaction_id = %transaction_id, stage = %stage, "Stage transition");
    }

    fn fail(&self, transaction_id: &str, e: StoreError) -> OrchestratorError {
        self.enter(Stage::Failed, transaction_id);
        error!(transaction_id = %transaction_id, error = %e, "Ledger failure");
        OrchestratorError::Ledger(e)
    }

    fn fault(&self, transaction_id: &str, message: String) -> OrchestratorError {
        self.enter(Stage::Failed, transaction_id);
        error!(transaction_id = %transaction_id, message = %message, "Orchestrator fault");
        OrchestratorError::Fault(message)
    }
}

/// Cache first, then the provider under its own timeout, writing back on a fresh fetch.
async fn fetch_fragment(
    registered: RegisteredProvider,
    cache: Arc<ContextCache>,
    tx: Arc<Transaction>,
) -> Result<(ContextFragment, FragmentOrigin), ProviderError> {
    let name = registered.name().to_string();
    let subject = registered.provider.subject(&tx);

    if !registered.cache_ttl.is_zero() {
        if let Some(hit) = cache.get(&name, &subject).await {
            return Ok((hit, FragmentOrigin::Cache));
        }
    }

    let value = tokio::time::timeout(registered.timeout, registered.provider.fetch(&tx))
        .await
        .map_err(|_| ProviderError::Timeout(registered.timeout.as_millis() as u64))??;

    let fragment = ContextFragment::new(&name, &subject, value, registered.cache_ttl);
    cache.put(fragment.clone()).await;
    Ok((fragment, FragmentOrigin::Fetched))
}
