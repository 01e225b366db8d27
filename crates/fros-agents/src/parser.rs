use fros_models::{RecommendedAction, RiskTier};

use crate::error::BackendError;

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common Claude response formats:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the assessment:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, BackendError> {
    let trimmed = text.trim();

    // Try parsing the whole thing as JSON first
    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    // Try extracting from markdown code block
    if let Some(json_str) = extract_from_markdown_block(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    // Try finding the first { ... } pair using brace matching
    if let Some(json_str) = extract_first_object(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    Err(BackendError::Malformed(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

/// Extract JSON from a markdown code block (```json ... ``` or ``` ... ```)
fn extract_from_markdown_block(text: &str) -> Option<String> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let json_start = start + marker.len();
            if let Some(end) = text[json_start..].find("```") {
                let extracted = text[json_start..json_start + end].trim();
                return Some(extracted.to_string());
            }
        }
    }

    None
}

/// Find the first balanced { ... } in the text.
fn extract_first_object(text: &str) -> Option<String> {
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// A backend answer that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendVerdict {
    pub score: f64,
    pub tier: RiskTier,
    pub action: RecommendedAction,
    pub explanation: Vec<String>,
    pub primary_risk_factors: Vec<String>,
    pub confidence: Option<f64>,
}

/// Parse and validate a verdict from raw backend output.
///
/// Rejects: no JSON object, missing or non-numeric `score`, a score outside
/// [0, 1], a tier or action outside the enumerated sets, an empty explanation.
pub fn parse_verdict(raw: &str) -> Result<BackendVerdict, BackendError> {
    let json_str = extract_json(raw)?;
    let value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| BackendError::Malformed(format!("Verdict JSON parse error: {e}")))?;

    let score = value
        .get("score")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .ok_or_else(|| BackendError::Malformed("Missing or non-numeric field: score".to_string()))?;
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(BackendError::Malformed(format!("score out of range: {score}")));
    }

    let tier: RiskTier = string_field(&value, "tier")?
        .parse()
        .map_err(BackendError::Malformed)?;
    let action: RecommendedAction = string_field(&value, "action")?
        .parse()
        .map_err(BackendError::Malformed)?;

    let explanation = match value.get("explanation") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(serde_json::Value::Array(items)) => string_list(items),
        _ => vec![],
    };
    if explanation.is_empty() {
        return Err(BackendError::Malformed(
            "Missing or empty field: explanation".to_string(),
        ));
    }

    let primary_risk_factors = value
        .get("primary_risk_factors")
        .and_then(|v| v.as_array())
        .map(|items| string_list(items))
        .unwrap_or_default();

    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0));

    Ok(BackendVerdict {
        score,
        tier,
        action,
        explanation,
        primary_risk_factors,
        confidence,
    })
}

fn string_field<'a>(value: &'a serde_json::Value, field: &str) -> Result<&'a str, BackendError> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| BackendError::Malformed(format!("Missing field: {field}")))
}

fn string_list(items: &[serde_json::Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
