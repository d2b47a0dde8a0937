// router.rs — Router: evaluate invocation events against an escalation rule.

use serde_json::Value;
use tracing::debug;

use crate::error::RouterError;
use crate::event::InvocationEvent;
use crate::notice::EscalationNotice;
use crate::rule::{ConfidenceThresholdRule, EscalationRule};

/// Stateless event evaluator. Safe to share across threads.
pub struct Router {
    rule: Box<dyn EscalationRule>,
}

impl Router {
    pub fn new(rule: impl EscalationRule + 'static) -> Self {
        Self {
            rule: Box::new(rule),
        }
    }

    /// Router using the confidence-threshold rule at `threshold`.
    pub fn with_threshold(threshold: f64) -> Result<Self, RouterError> {
        Ok(Self::new(ConfidenceThresholdRule::new(threshold)?))
    }

    pub fn rule_name(&self) -> &str {
        self.rule.name()
    }

    /// Decide whether `event` needs human review.
    pub fn evaluate(&self, event: &InvocationEvent) -> Option<EscalationNotice> {
        let notice = self.rule.check(event);
        if let Some(n) = &notice {
            debug!(request_id = %n.request_id, reason = %n.reason, rule = self.rule.name(), "escalating");
        }
        notice
    }

    /// Parse a raw record and evaluate it. A malformed record yields an
    /// error and never a notice.
    pub fn evaluate_json(&self, raw: &Value) -> Result<Option<EscalationNotice>, RouterError> {
        let event = InvocationEvent::from_json(raw)?;
        Ok(self.evaluate(&event))
    }

    /// [`Router::evaluate_json`] for one JSONL line.
    pub fn evaluate_line(&self, line: &str) -> Result<Option<EscalationNotice>, RouterError> {
        let event = InvocationEvent::from_line(line)?;
        Ok(self.evaluate(&event))
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(ConfidenceThresholdRule::default())
    }
}
