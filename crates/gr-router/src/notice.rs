// notice.rs — EscalationNotice: a request handed to human review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::InvocationEvent;

/// Reason attached by the confidence-threshold rule.
pub const LOW_CONFIDENCE_REASON: &str = "low-confidence";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationNotice {
    pub request_id: String,
    pub reason: String,
    /// Timestamp of the triggering event, not of evaluation.
    pub timestamp: DateTime<Utc>,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
}

impl EscalationNotice {
    /// Build a notice for `event` carrying `reason`.
    pub fn for_event(event: &InvocationEvent, reason: impl Into<String>) -> Self {
        Self {
            request_id: event.request_id.clone(),
            reason: reason.into(),
            timestamp: event.timestamp,
            model_id: event.model_id.clone(),
            confidence_score: event.confidence_score,
        }
    }
}
