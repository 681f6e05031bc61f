//! Payload translation.
//!
//! Converts a raw MQTT payload into a Signal K [`Delta`] according to the
//! matched rule's payload format. Context and path come from the rule when it
//! sets them, otherwise they are derived from the topic.

use serde_json::Value;

use crate::identity::{is_transport_literal, to_canonical_form, VesselIdentity};
use crate::model::{now_timestamp, Delta, Source, SELF_CONTEXT};
use crate::rule::{ImportRule, PayloadFormat};
use crate::topic::{strip_prefix, SELF_ALIAS, VESSELS_SEGMENT};

/// Errors that prevent a payload from becoming a delta.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("payload looks like a delta but is malformed: {0}")]
    InvalidDelta(#[source] serde_json::Error),
}

/// A payload value before it is placed into a delta.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    /// Any JSON document.
    Structured(Value),
    /// Non-JSON text that reads as a finite decimal number.
    Number(f64),
    /// Anything else, kept verbatim.
    Text(String),
}

impl PayloadValue {
    /// Interpret a value-only payload: JSON first, then a number, then text.
    pub fn parse(payload: &str) -> Self {
        if let Ok(value) = serde_json::from_str::<Value>(payload) {
            return PayloadValue::Structured(value);
        }

        let trimmed = payload.trim();
        if !trimmed.is_empty() {
            if let Ok(n) = trimmed.parse::<f64>() {
                if n.is_finite() {
                    return PayloadValue::Number(n);
                }
            }
        }

        PayloadValue::Text(payload.to_string())
    }

    pub fn into_json(self) -> Value {
        match self {
            PayloadValue::Structured(value) => value,
            PayloadValue::Number(n) => number_value(n),
            PayloadValue::Text(text) => Value::String(text),
        }
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Topic-level facts needed to derive context and path.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicContext<'a> {
    pub prefix: Option<&'a str>,
    pub identity: Option<&'a VesselIdentity>,
}

/// Derive the Signal K context from a topic.
///
/// `vessels/<id>/<more>` names a vessel: the local one maps to
/// `vessels.self`, anything else to `vessels.<id>` in canonical form. Every
/// other topic shape falls back to `vessels.self`.
pub fn derive_context(topic: &str, ctx: TopicContext<'_>) -> String {
    let levels: Vec<&str> = strip_prefix(ctx.prefix, topic).split('/').collect();

    if levels.len() > 2 && levels[0] == VESSELS_SEGMENT {
        let vessel = levels[1];
        let is_self = vessel == SELF_ALIAS
            || ctx.identity.is_some_and(|id| id.matches_segment(vessel));
        if is_self {
            return SELF_CONTEXT.to_string();
        }
        if is_transport_literal(vessel) {
            return format!("{VESSELS_SEGMENT}.{}", to_canonical_form(vessel));
        }
        return format!("{VESSELS_SEGMENT}.{vessel}");
    }

    SELF_CONTEXT.to_string()
}

/// Derive the Signal K path from a topic.
///
/// When the rule's pattern ends in `#`, the levels it captured become the
/// path. Otherwise vessel topics drop their `vessels/<id>` head and other
/// topics are used whole.
pub fn derive_path(topic: &str, capture: Option<&str>, ctx: TopicContext<'_>) -> String {
    if let Some(capture) = capture.filter(|c| !c.is_empty()) {
        return capture.replace('/', ".");
    }

    let clean = strip_prefix(ctx.prefix, topic);
    let levels: Vec<&str> = clean.split('/').collect();
    if levels.len() > 2 && levels[0] == VESSELS_SEGMENT {
        return levels[2..].join(".");
    }
    clean.replace('/', ".")
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn looks_like_delta(value: &Value) -> bool {
    value.get("context").is_some_and(is_truthy) && value.get("updates").is_some_and(is_truthy)
}

/// Translate a payload for the matched rule.
///
/// `capture` is the part of the topic consumed by the rule's trailing `#`.
pub fn translate(
    payload: &str,
    rule: &ImportRule,
    topic: &str,
    capture: Option<&str>,
    ctx: TopicContext<'_>,
) -> Result<Delta, TranslateError> {
    let (payload_context, value) = match rule.payload_format {
        PayloadFormat::ValueOnly => (None, PayloadValue::parse(payload).into_json()),
        PayloadFormat::Full => {
            let parsed: Value = serde_json::from_str(payload).map_err(TranslateError::InvalidJson)?;
            if looks_like_delta(&parsed) {
                return serde_json::from_value(parsed).map_err(TranslateError::InvalidDelta);
            }
            let embedded = parsed
                .get("context")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(String::from);
            (embedded, parsed)
        }
    };

    let context = if !rule.context.is_empty() {
        rule.context.clone()
    } else {
        payload_context.unwrap_or_else(|| derive_context(topic, ctx))
    };

    let path = if !rule.path.is_empty() {
        rule.path.clone()
    } else {
        derive_path(topic, capture, ctx)
    };

    Ok(Delta::single(
        context,
        Source::mqtt(&rule.source_label),
        now_timestamp(),
        path,
        value,
    ))
}
