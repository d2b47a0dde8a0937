// rule.rs — Escalation rules.
//
// A rule looks at one event and either produces a notice or nothing. Rules
// are pure: same event in, same answer out. New triggers are added as new
// `EscalationRule` implementations and combined with `AnyRule`, so the
// router's contract never changes.

use crate::error::RouterError;
use crate::event::InvocationEvent;
use crate::notice::{EscalationNotice, LOW_CONFIDENCE_REASON};

/// Default confidence threshold below which a response needs review.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;

pub trait EscalationRule: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    fn check(&self, event: &InvocationEvent) -> Option<EscalationNotice>;
}

/// Escalates when a confidence score is present and strictly below the threshold.
///
/// Events without a score are not escalated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceThresholdRule {
    threshold: f64,
}

impl ConfidenceThresholdRule {
    pub fn new(threshold: f64) -> Result<Self, RouterError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RouterError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for ConfidenceThresholdRule {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl EscalationRule for ConfidenceThresholdRule {
    fn name(&self) -> &str {
        "confidence-threshold"
    }

    fn check(&self, event: &InvocationEvent) -> Option<EscalationNotice> {
        let score = event.confidence_score?;
        (score < self.threshold).then(|| EscalationNotice::for_event(event, LOW_CONFIDENCE_REASON))
    }
}

/// First matching rule wins.
#[derive(Default)]
pub struct AnyRule {
    rules: Vec<Box<dyn EscalationRule>>,
}

impl AnyRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: impl EscalationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl EscalationRule for AnyRule {
    fn name(&self) -> &str {
        "any"
    }

    fn check(&self, event: &InvocationEvent) -> Option<EscalationNotice> {
        self.rules.iter().find_map(|rule| rule.check(event))
    }
}
