//! # gr-policy
//!
//! Content-safety policy descriptors for Guardrail Ops.
//!
//! A [`PolicyDescriptor`] is the desired state of one guardrail: category
//! filters, PII rules, blocked terms and intents, and the messages users see
//! when content is blocked. [`GuardrailPayload::build`] validates a descriptor
//! and translates it into the remote control plane's wire form.
//!
//! ## Key invariants
//!
//! - **Identity**: `name` + `environment` identify a policy for its lifetime.
//! - **Validate before sending**: an invalid descriptor never produces a payload.
//! - **Canonical payloads**: equal descriptors produce equal payloads and
//!   equal fingerprints, regardless of declaration order.

pub mod descriptor;
pub mod error;
pub mod payload;

pub use descriptor::{
    BlockedIntent, ContentFilter, FilterCategory, FilterStrength, Messaging, PiiAction,
    PiiEntity, PiiRule, PolicyDescriptor,
};
pub use error::PolicyError;
pub use payload::GuardrailPayload;
