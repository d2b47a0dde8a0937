// api.rs — GuardrailApi: the seam to the remote control plane.
//
// The remote service has no lifecycle primitive of its own: it only knows
// create, update, delete, and describe. Everything else (idempotency, handle
// tracking, failure classification) lives in the reconciler.
//
// Implementations:
//   - InMemoryGuardrailApi (memory.rs) — in-process control plane for tests
//     and dry runs
//   - HttpGuardrailApi (http.rs) — JSON over HTTP

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gr_policy::GuardrailPayload;

use crate::error::ReconcileError;
use crate::handle::HandleStatus;

/// Status reported by the remote control plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Creating,
    Updating,
    Versioning,
    Ready,
    Failed,
    Deleting,
}

impl RemoteStatus {
    /// Map the remote status onto the handle lifecycle.
    pub fn handle_status(&self) -> HandleStatus {
        match self {
            RemoteStatus::Creating => HandleStatus::Creating,
            RemoteStatus::Updating | RemoteStatus::Versioning => HandleStatus::Updating,
            RemoteStatus::Ready => HandleStatus::Ready,
            RemoteStatus::Failed => HandleStatus::Failed,
            RemoteStatus::Deleting => HandleStatus::Deleting,
        }
    }
}

/// Result of a remote read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGuardrail {
    pub guardrail_id: String,
    pub name: String,
    pub version: String,
    pub status: RemoteStatus,
}

/// Remote guardrail control plane.
///
/// Each method is exactly one remote call. Implementations classify failures
/// into the [`ReconcileError`] taxonomy and never retry internally.
#[async_trait]
pub trait GuardrailApi: Send + Sync {
    /// Create a guardrail and return its remote identifier.
    ///
    /// `client_token` makes the call idempotent: replaying a create with the
    /// same token returns the identifier of the guardrail it already created.
    async fn create(
        &self,
        payload: &GuardrailPayload,
        client_token: &str,
    ) -> Result<String, ReconcileError>;

    /// Replace the configuration of an existing guardrail and return the new version.
    async fn update(
        &self,
        remote_id: &str,
        payload: &GuardrailPayload,
    ) -> Result<String, ReconcileError>;

    /// Delete a guardrail. Returns `NotFound` if it does not exist.
    async fn delete(&self, remote_id: &str) -> Result<(), ReconcileError>;

    /// Read the current remote state. `Ok(None)` means the guardrail does not exist.
    async fn describe(&self, remote_id: &str) -> Result<Option<RemoteGuardrail>, ReconcileError>;

    /// Implementation name (for logs and CLI output).
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioning_counts_as_updating() {
        assert_eq!(
            RemoteStatus::Versioning.handle_status(),
            HandleStatus::Updating
        );
        assert_eq!(RemoteStatus::Ready.handle_status(), HandleStatus::Ready);
    }

    #[test]
    fn remote_guardrail_uses_wire_casing() {
        let json = r#"{"guardrailId":"abc","name":"safety-dev","version":"3","status":"READY"}"#;
        let remote: RemoteGuardrail = serde_json::from_str(json).unwrap();
        assert_eq!(remote.guardrail_id, "abc");
        assert_eq!(remote.status, RemoteStatus::Ready);
    }
}
