// error.rs — Error taxonomy for reconciliation.
//
// The kind of an error encodes what the orchestrator should do next, so it
// never has to parse messages:
//   Validation → fix the descriptor (not retryable)
//   Conflict   → operator intervention (not retryable)
//   NotFound   → the handle is stale, recreate
//   Transient  → safe to retry
//   Unknown    → surfaced verbatim, re-verify remote state before acting

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gr_policy::PolicyError;

use crate::handle::PolicyHandle;
use crate::reconciler::Verb;

/// Coarse classification of a [`ReconcileError`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Transient,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A failed remote call or a request rejected before any call was made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The descriptor (or request) is malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The handle's status does not allow the requested verb.
    #[error("cannot move guardrail {remote_id} from {from} to {to}")]
    InvalidTransition {
        remote_id: String,
        from: String,
        to: String,
    },

    /// A guardrail with the same name already exists remotely.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The remote resource does not exist (deleted out-of-band or never created).
    #[error("remote guardrail not found: {remote_id}")]
    NotFound { remote_id: String },

    /// Network failure or throttling.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Opaque remote failure, or an outcome that could not be confirmed.
    #[error("unknown failure: {0}")]
    Unknown(String),
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Validation(_) | ReconcileError::InvalidTransition { .. } => {
                ErrorKind::Validation
            }
            ReconcileError::Conflict(_) => ErrorKind::Conflict,
            ReconcileError::NotFound { .. } => ErrorKind::NotFound,
            ReconcileError::Transient(_) => ErrorKind::Transient,
            ReconcileError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Only transient failures are safe to retry unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<PolicyError> for ReconcileError {
    fn from(e: PolicyError) -> Self {
        ReconcileError::Validation(e.to_string())
    }
}

/// A failed reconcile: the error plus the handle the orchestrator should record.
///
/// `handle` is `None` when no resource was known (create), otherwise the
/// prior handle: unchanged when the remote side is unaffected, or with
/// status `failed` when the remote reported a non-transient error or the
/// outcome could not be confirmed. It is never advanced to `ready`.
#[derive(Debug, Error)]
#[error("{verb} failed: {error}")]
pub struct ReconcileFailure {
    pub verb: Verb,
    #[source]
    pub error: ReconcileError,
    pub handle: Option<PolicyHandle>,
}

impl ReconcileFailure {
    pub fn new(verb: Verb, error: ReconcileError, handle: Option<PolicyHandle>) -> Self {
        Self {
            verb,
            error,
            handle,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Errors from the on-disk handle store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
