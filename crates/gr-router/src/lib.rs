//! # gr-router
//!
//! Low-confidence escalation for model invocation outcomes.
//!
//! A [`Router`] evaluates each [`InvocationEvent`] against an
//! [`EscalationRule`] and returns an [`EscalationNotice`] when the response
//! should be looked at by a human. By default that means a confidence score
//! strictly below 0.6. Events without a score are never escalated.
//!
//! Evaluation is pure and side-effect free; delivering notices is the job of
//! a [`NotificationChannel`], and [`route_lines`] wires the two together for
//! a JSONL event stream.

pub mod channel;
pub mod error;
pub mod event;
pub mod notice;
pub mod route;
pub mod router;
pub mod rule;

pub use channel::{LogChannel, NotificationChannel, TopicChannel};
pub use error::RouterError;
pub use event::InvocationEvent;
pub use notice::{EscalationNotice, LOW_CONFIDENCE_REASON};
pub use route::{route_lines, DeadLetter, DeadLetterLog, RouteSummary};
pub use router::Router;
pub use rule::{AnyRule, ConfidenceThresholdRule, EscalationRule, DEFAULT_CONFIDENCE_THRESHOLD};
