use fros_models::{AgentContext, TierThresholds, ToolResult, Transaction};
use serde_json::json;

use crate::tools::{categorize_amount, categorize_hour};
use chrono::Timelike;

/// Schema the backend must answer with.
fn verdict_schema() -> String {
    let example = json!({
        "score": 0.42,
        "tier": "low | medium | high",
        "action": "approve | review | block",
        "explanation": ["<most important reason first>", "<next reason>"],
        "primary_risk_factors": ["<factor names from the findings>"],
        "confidence": 0.8
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

pub fn synthesizer_system_prompt(thresholds: &TierThresholds) -> String {
    format!(
        "You are the synthesis stage of a transaction fraud-scoring engine. Independent \
         analysis tools have already examined one transaction; combine their findings into a \
         single risk verdict.\n\n\
         ## INPUT\n\n\
         - `transaction`: amount (major units), amount category, UTC hour, time period, \
         origin and destination accounts, optional merchant category and location.\n\
         - `findings`: one entry per tool with `tool`, `status` (ok / no_signal / failed / timed_out), \
         `contribution` (0.0-1.0), `rationale`, and `risk_factors`.\n\
         - `missing_context`: context sources that delivered nothing for this request.\n\n\
         ## RULES\n\n\
         - Findings with status no_signal, failed or timed_out carry NO signal. Do not treat them as \
         evidence of fraud or of safety.\n\
         - Missing context means the corresponding signal is unknown, not zero risk.\n\
         - Weigh corroborating findings above isolated ones: a large amount at an unusual \
         hour to an unfamiliar counterparty is stronger than any one of those alone.\n\
         - score is a number between 0.0 and 1.0.\n\
         - Tier policy: score < {review} is low (approve); {review} <= score < {block} is \
         medium (review); score >= {block} is high (block). Keep tier and action consistent \
         with your score.\n\
         - explanation lists the contributing reasons, most important first, citing the \
         concrete amounts, times and distances from the findings.\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n\
         {schema}",
        review = thresholds.review,
        block = thresholds.block,
        schema = verdict_schema()
    )
}

/// The per-request user prompt: transaction summary plus every finding.
pub fn synthesis_user_prompt(
    tx: &Transaction,
    ctx: &AgentContext,
    results: &[ToolResult],
) -> String {
    let amount = tx.magnitude();
    let hour = tx.timestamp.hour();
    let findings: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            json!({
                "tool": r.tool,
                "status": r.status,
                "contribution": r.contribution,
                "rationale": r.rationale,
                "risk_factors": r.risk_factors,
            })
        })
        .collect();

    let input = json!({
        "transaction": {
            "id": tx.id,
            "amount": tx.amount_major().to_string(),
            "amount_category": categorize_amount(amount),
            "timestamp": tx.timestamp.to_rfc3339(),
            "hour_utc": hour,
            "time_period": categorize_hour(hour),
            "origin_account": tx.origin_account,
            "destination_account": tx.destination_account,
            "merchant_category": tx.merchant_category(),
            "location": tx.location(),
        },
        "findings": findings,
        "missing_context": ctx.absent().keys().collect::<Vec<_>>(),
    });
    serde_json::to_string_pretty(&input).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tx_at;
    use chrono::{TimeZone, Utc};
    use fros_models::FragmentAbsence;

    #[test]
    fn system_prompt_embeds_thresholds_and_schema() {
        let prompt = synthesizer_system_prompt(&TierThresholds {
            review: 0.25,
            block: 0.8,
        });
        assert!(prompt.contains("score < 0.25"));
        assert!(prompt.contains("score >= 0.8"));
        assert!(prompt.contains("primary_risk_factors"));
        assert!(prompt.contains("explanation"));
        assert!(prompt.contains("NO signal"));
    }

    #[test]
    fn user_prompt_summarises_transaction_and_findings() {
        let tx = tx_at(
            "tx-77",
            250_000,
            Utc.with_ymd_and_hms(2026, 3, 4, 3, 45, 0).unwrap(),
            "acct-1",
            "stranger",
        );
        let mut builder = AgentContext::builder(tx.clone());
        builder.mark_absent("geolocation", FragmentAbsence::TimedOut);
        let ctx = builder.freeze();
        let results = vec![
            ToolResult::ok(
                "amount_deviation",
                1.0,
                "Amount risk: amount 2500.00 exceeds 2000".into(),
                vec!["large_amount".into()],
                serde_json::Value::Null,
                2,
            ),
            ToolResult::timed_out("velocity", 200),
        ];

        let prompt = synthesis_user_prompt(&tx, &ctx, &results);
        let parsed: serde_json::Value = serde_json::from_str(&prompt).unwrap();
        assert_eq!(parsed["transaction"]["amount"], "2500.00");
        assert_eq!(parsed["transaction"]["amount_category"], "very_large");
        assert_eq!(parsed["transaction"]["time_period"], "night");
        assert_eq!(parsed["findings"][1]["status"], "timed_out");
        assert_eq!(parsed["missing_context"][0], "geolocation");
    }
}
