// event.rs — InvocationEvent: one model invocation outcome.
//
// Records arrive as camelCase JSON:
//   {"requestId": "...", "confidenceScore": 0.42, "timestamp": "<RFC3339>", "modelId": "..."}
// `confidenceScore` may be absent or null. Everything else is required.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RouterError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub model_id: String,
}

impl InvocationEvent {
    pub fn new(
        request_id: impl Into<String>,
        model_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            confidence_score: None,
            timestamp,
            model_id: model_id.into(),
        }
    }

    pub fn with_confidence(mut self, score: f64) -> Self {
        self.confidence_score = Some(score);
        self
    }

    /// Parse and validate a raw record.
    ///
    /// Field-level problems are reported as `MalformedEvent` rather than a
    /// serde error, so the caller sees which field was wrong.
    pub fn from_json(raw: &Value) -> Result<Self, RouterError> {
        let object = raw
            .as_object()
            .ok_or_else(|| RouterError::malformed("record is not a JSON object", None))?;

        let request_id = required_id(object, "requestId", None)?;
        let id = Some(request_id);

        let model_id = required_id(object, "modelId", id)?;
        let timestamp = required_str(object, "timestamp", id)?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| RouterError::malformed(format!("timestamp is not RFC 3339: {}", e), id))?
            .with_timezone(&Utc);

        let confidence_score = match object.get("confidenceScore") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => {
                let score = n
                    .as_f64()
                    .ok_or_else(|| RouterError::malformed("confidenceScore is not a number", id))?;
                if !(0.0..=1.0).contains(&score) {
                    return Err(RouterError::malformed(
                        format!("confidenceScore {} is outside [0, 1]", score),
                        id,
                    ));
                }
                Some(score)
            }
            Some(_) => return Err(RouterError::malformed("confidenceScore is not a number", id)),
        };

        Ok(Self {
            request_id: request_id.to_string(),
            confidence_score,
            timestamp,
            model_id: model_id.to_string(),
        })
    }

    /// Parse one JSONL line.
    pub fn from_line(line: &str) -> Result<Self, RouterError> {
        let raw: Value = serde_json::from_str(line)
            .map_err(|e| RouterError::malformed(format!("invalid JSON: {}", e), None))?;
        Self::from_json(&raw)
    }
}

/// A required string that must not be blank.
fn required_id<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    request_id: Option<&str>,
) -> Result<&'a str, RouterError> {
    let value = required_str(object, field, request_id)?;
    if value.trim().is_empty() {
        return Err(RouterError::malformed(format!("{} is empty", field), request_id));
    }
    Ok(value)
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    request_id: Option<&str>,
) -> Result<&'a str, RouterError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(RouterError::malformed(
            format!("{} is not a string", field),
            request_id,
        )),
        None => Err(RouterError::malformed(
            format!("missing {}", field),
            request_id,
        )),
    }
}
