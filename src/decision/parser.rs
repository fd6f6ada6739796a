//! Decision parsing: a structured JSON parser with a keyword fallback.
//!
//! Both paths produce the same `Decision`. The fallback only runs when the
//! JSON parser fails.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;

use super::DecisionError;
use crate::domain::{AdvisoryLevels, Decision, DecisionSide};

/// Confidence assumed when free text names a side but no number.
const DEFAULT_TEXT_CONFIDENCE: f64 = 0.5;

const SIDE_KEYS: &[&str] = &["side", "action", "decision", "signal", "recommendation"];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "confianza", "probability"];
const RATIONALE_KEYS: &[&str] = &["rationale", "reason", "reasoning", "explanation", "razon"];
const STOP_KEYS: &[&str] = &["stop_loss", "sl", "stop"];
const TARGET_KEYS: &[&str] = &["take_profit", "tp", "target"];

/// Parses a raw decision-source response.
pub fn parse_decision(raw: &str, strategy_tag: &str) -> Result<Decision, DecisionError> {
    match parse_json(raw, strategy_tag) {
        Ok(decision) => Ok(decision),
        Err(json_err) => {
            debug!(error = %json_err, "Structured parse failed, trying keywords");
            parse_keywords(raw, strategy_tag)
        }
    }
}

/// Maps a side word in English or Spanish to a decision side.
fn side_from_word(word: &str) -> Option<DecisionSide> {
    match word.to_ascii_uppercase().as_str() {
        "BUY" | "LONG" | "COMPRA" | "COMPRAR" => Some(DecisionSide::Long),
        "SELL" | "SHORT" | "VENTA" | "VENDER" => Some(DecisionSide::Short),
        "HOLD" | "WAIT" | "SKIP" | "NONE" | "ESPERA" | "ESPERAR" | "MANTENER" => {
            Some(DecisionSide::Skip)
        }
        _ => None,
    }
}

/// Accepts confidence as a 0..1 fraction or a 0..100 percentage.
pub fn normalize_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let fraction = if value > 1.0 { value / 100.0 } else { value };
    fraction.clamp(0.0, 1.0)
}

/// Structured parser. Tolerates prose around a single JSON object.
pub fn parse_json(raw: &str, strategy_tag: &str) -> Result<Decision, DecisionError> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(DecisionError::Malformed("no JSON object".into()));
    };
    if end < start {
        return Err(DecisionError::Malformed("no JSON object".into()));
    }

    let value: Value = serde_json::from_str(&raw[start..=end])
        .map_err(|e| DecisionError::Malformed(format!("invalid JSON: {}", e)))?;
    let Value::Object(fields) = value else {
        return Err(DecisionError::Malformed("decision is not an object".into()));
    };

    let side = lookup(&fields, SIDE_KEYS)
        .and_then(Value::as_str)
        .and_then(side_from_word)
        .ok_or_else(|| DecisionError::Malformed("missing or unknown side".into()))?;

    let confidence = lookup(&fields, CONFIDENCE_KEYS)
        .and_then(as_f64)
        .map(normalize_confidence)
        .ok_or_else(|| DecisionError::Malformed("missing confidence".into()))?;

    let rationale = lookup(&fields, RATIONALE_KEYS)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let advisory = AdvisoryLevels {
        stop_loss: lookup(&fields, STOP_KEYS).and_then(as_decimal),
        take_profit: lookup(&fields, TARGET_KEYS).and_then(as_decimal),
    };

    Ok(Decision {
        side,
        confidence,
        rationale,
        advisory,
        strategy_tag: strategy_tag.to_string(),
    })
}

/// Best-effort text parser: the first side keyword wins; the first number
/// after a confidence label is the confidence.
pub fn parse_keywords(raw: &str, strategy_tag: &str) -> Result<Decision, DecisionError> {
    let words: Vec<&str> = raw
        .split(|c: char| !(c.is_alphanumeric() || c == '.' || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();

    let side = words
        .iter()
        .find_map(|w| side_from_word(w.trim_matches('.')))
        .ok_or_else(|| DecisionError::Malformed("no side keyword in response".into()))?;

    let confidence = words
        .iter()
        .position(|w| {
            CONFIDENCE_KEYS
                .iter()
                .any(|k| w.trim_matches('.').eq_ignore_ascii_case(k))
        })
        .and_then(|i| {
            words[i + 1..]
                .iter()
                .find_map(|w| w.trim_end_matches('.').parse::<f64>().ok())
        })
        .map(normalize_confidence)
        .unwrap_or(DEFAULT_TEXT_CONFIDENCE);

    Ok(Decision {
        side,
        confidence,
        rationale: raw.trim().chars().take(280).collect(),
        advisory: AdvisoryLevels::default(),
        strategy_tag: strategy_tag.to_string(),
    })
}

fn lookup<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    fields.iter().find_map(|(k, v)| {
        keys.iter()
            .any(|key| k.eq_ignore_ascii_case(key))
            .then_some(v)
    })
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}
