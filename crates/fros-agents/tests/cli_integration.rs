//! Tests against the real `claude` CLI.
//!
//! Ignored by default. They need the CLI on PATH with working credentials:
//! ```bash
//! cargo test -p fros-agents --test cli_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use fros_agents::claude_cli::check_cli_available;
use fros_agents::parser::parse_verdict;
use fros_agents::prompts::{synthesis_user_prompt, synthesizer_system_prompt};
use fros_agents::test_support::tx_at;
use fros_agents::{ClaudeCliBackend, Synthesizer};
use fros_models::{AgentContext, SynthesisConfig, TierThresholds, ToolResult};

const MODEL: &str = "claude-3-5-haiku-latest";

fn night_transfer_findings() -> Vec<ToolResult> {
    vec![
        ToolResult::ok(
            "amount_deviation",
            1.0,
            "Amount risk: amount 2500.00 exceeds 2000; 500.0x the account average of 5.00".into(),
            vec!["large_amount".into(), "extreme_amount_deviation".into()],
            serde_json::Value::Null,
            1,
        ),
        ToolResult::ok(
            "temporal_anomaly",
            0.8,
            "Timing risk: 03:45 falls in the 02-05 window; hour 03 is unusual for this account".into(),
            vec!["suspicious_late_night_hour".into()],
            serde_json::Value::Null,
            1,
        ),
        ToolResult::timed_out("velocity", 200),
    ]
}

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(check_cli_available("claude").await, "claude CLI not found on PATH");
}

/// Catches changes in the CLI's output format that would otherwise only
/// show up as a stream of fallback decisions in production.
#[tokio::test]
#[ignore]
async fn cli_answers_with_a_parseable_verdict() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let backend = ClaudeCliBackend::new(MODEL.to_string(), Duration::from_secs(60));
    let tx = tx_at(
        "cli-1",
        250_000,
        Utc.with_ymd_and_hms(2026, 3, 4, 3, 45, 0).unwrap(),
        "acct-1",
        "stranger",
    );
    let ctx = AgentContext::builder(tx.clone()).freeze();
    let system = synthesizer_system_prompt(&TierThresholds::default());
    let user = synthesis_user_prompt(&tx, &ctx, &night_transfer_findings());

    let raw = backend
        .request_verdict(&system, &user)
        .await
        .expect("claude CLI invocation failed");
    let verdict = parse_verdict(&raw).unwrap_or_else(|e| {
        panic!("CLI output no longer parses as a verdict ({e}).\nRaw output:\n---\n{raw}\n---")
    });
    assert!((0.0..=1.0).contains(&verdict.score));
    assert!(!verdict.explanation.is_empty());
}

#[tokio::test]
#[ignore]
async fn synthesizer_uses_backend_when_cli_works() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let backend = Arc::new(ClaudeCliBackend::new(MODEL.to_string(), Duration::from_secs(60)));
    let synthesizer = Synthesizer::new(
        Some(backend),
        SynthesisConfig::default(),
        Duration::from_secs(60),
    );
    let tx = tx_at(
        "cli-2",
        250_000,
        Utc.with_ymd_and_hms(2026, 3, 4, 3, 45, 0).unwrap(),
        "acct-1",
        "stranger",
    );
    let ctx = AgentContext::builder(tx.clone()).freeze();

    let decision = synthesizer
        .synthesize(&tx, &ctx, &night_transfer_findings())
        .await;
    assert!(
        !decision.is_fallback(),
        "fell back: {:?}",
        decision.fallback_reason
    );
}

#[tokio::test]
#[ignore]
async fn cli_reports_errors_for_invalid_model() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let backend = ClaudeCliBackend::new("nonexistent-model-12345".to_string(), Duration::from_secs(15));
    let result = backend.request_verdict("You are a test.", "hello").await;
    assert!(result.is_err(), "expected an error, got {:?}", result);
}
