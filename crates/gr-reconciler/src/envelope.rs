// envelope.rs — Request/response envelope for external orchestrators.
//
// Some orchestrators drive custom resources with a fixed protocol: a request
// type plus properties in, a SUCCESS/FAILED status plus a physical resource
// id and a data map out. This module adapts that protocol onto
// `Reconciler::reconcile`. The response always carries a machine-readable
// error kind and retry hint, so the orchestrator never parses `reason`.

use serde::{Deserialize, Serialize};

use gr_policy::PolicyDescriptor;

use crate::error::{ErrorKind, ReconcileError, ReconcileFailure};
use crate::handle::PolicyHandle;
use crate::reconciler::{ReconcileOutcome, ReconcileRequest, Reconciler, Verb};

/// Inbound lifecycle request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRequest {
    /// Orchestrator-assigned correlation id, echoed in the response.
    pub request_id: String,
    pub request_type: Verb,
    /// Required for Create and Update, ignored for Delete.
    #[serde(default)]
    pub descriptor: Option<PolicyDescriptor>,
    /// Required for Update and Delete, absent for Create.
    #[serde(default)]
    pub handle: Option<PolicyHandle>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Structured result fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

/// Outbound lifecycle response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleResponse {
    pub request_id: String,
    pub status: ResponseStatus,
    /// Remote id of the resource the request concerned, when one is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    /// Human-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub data: ResponseData,
    /// Handle for the orchestrator to persist; `None` after a delete or a
    /// failed create. A rejected request echoes the handle it carried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<PolicyHandle>,
}

impl LifecycleRequest {
    /// Check that the inputs required by the verb are present.
    pub fn into_reconcile_request(self) -> Result<ReconcileRequest, ReconcileError> {
        let missing = |what: &str| {
            ReconcileError::Validation(format!(
                "{} request {} is missing its {}",
                self.request_type, self.request_id, what
            ))
        };

        match self.request_type {
            Verb::Create => {
                if self.handle.is_some() {
                    return Err(ReconcileError::Validation(format!(
                        "create request {} must not carry a handle",
                        self.request_id
                    )));
                }
                let descriptor = self.descriptor.clone().ok_or_else(|| missing("descriptor"))?;
                Ok(ReconcileRequest::Create { descriptor })
            }
            Verb::Update => {
                let descriptor = self.descriptor.clone().ok_or_else(|| missing("descriptor"))?;
                let handle = self.handle.clone().ok_or_else(|| missing("handle"))?;
                Ok(ReconcileRequest::Update { descriptor, handle })
            }
            Verb::Delete => {
                let handle = self.handle.clone().ok_or_else(|| missing("handle"))?;
                Ok(ReconcileRequest::Delete { handle })
            }
        }
    }
}

/// Handle one envelope request end to end. Never fails: errors become a
/// `FAILED` response.
pub async fn handle_lifecycle(reconciler: &Reconciler, request: LifecycleRequest) -> LifecycleResponse {
    let request_id = request.request_id.clone();
    let prior_handle = request.handle.clone();
    let prior_remote_id = prior_handle.as_ref().map(|h| h.remote_id.clone());
    let verb = request.request_type;

    let reconcile_request = match request.into_reconcile_request() {
        Ok(r) => r,
        Err(error) => {
            // Nothing was attempted; hand back whatever the caller holds.
            let failure = ReconcileFailure::new(verb, error, prior_handle);
            return failed(request_id, prior_remote_id, failure);
        }
    };

    match reconciler.reconcile(reconcile_request).await {
        Ok(outcome) => succeeded(request_id, prior_remote_id, outcome),
        Err(failure) => failed(request_id, prior_remote_id, failure),
    }
}

fn succeeded(
    request_id: String,
    prior_remote_id: Option<String>,
    outcome: ReconcileOutcome,
) -> LifecycleResponse {
    let physical_resource_id = outcome
        .handle
        .as_ref()
        .map(|h| h.remote_id.clone())
        .or(prior_remote_id);

    LifecycleResponse {
        request_id,
        status: ResponseStatus::Success,
        physical_resource_id: physical_resource_id.clone(),
        reason: None,
        data: ResponseData {
            remote_id: physical_resource_id,
            version: outcome.handle.as_ref().map(|h| h.version.clone()),
            error_kind: None,
            retryable: None,
        },
        handle: outcome.handle,
    }
}

fn failed(
    request_id: String,
    prior_remote_id: Option<String>,
    failure: ReconcileFailure,
) -> LifecycleResponse {
    let physical_resource_id = failure
        .handle
        .as_ref()
        .map(|h| h.remote_id.clone())
        .or(prior_remote_id);

    LifecycleResponse {
        request_id,
        status: ResponseStatus::Failed,
        physical_resource_id: physical_resource_id.clone(),
        reason: Some(failure.to_string()),
        data: ResponseData {
            remote_id: physical_resource_id,
            version: failure.handle.as_ref().map(|h| h.version.clone()),
            error_kind: Some(failure.kind()),
            retryable: Some(failure.error.is_retryable()),
        },
        handle: failure.handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryGuardrailApi;
    use std::sync::Arc;

    fn reconciler() -> Reconciler {
        Reconciler::new(Arc::new(InMemoryGuardrailApi::new()))
    }

    fn create_request() -> LifecycleRequest {
        LifecycleRequest {
            request_id: "req-1".to_string(),
            request_type: Verb::Create,
            descriptor: Some(PolicyDescriptor::new("safety", "dev").with_blocked_term("hack")),
            handle: None,
        }
    }

    #[tokio::test]
    async fn create_then_delete_through_envelope() {
        let reconciler = reconciler();
        let created = handle_lifecycle(&reconciler, create_request()).await;
        assert_eq!(created.status, ResponseStatus::Success);
        assert_eq!(created.request_id, "req-1");
        let handle = created.handle.clone().unwrap();
        assert_eq!(created.physical_resource_id.as_deref(), Some(handle.remote_id.as_str()));
        assert_eq!(created.data.version.as_deref(), Some("1"));

        let deleted = handle_lifecycle(
            &reconciler,
            LifecycleRequest {
                request_id: "req-2".to_string(),
                request_type: Verb::Delete,
                descriptor: None,
                handle: Some(handle.clone()),
            },
        )
        .await;
        assert_eq!(deleted.status, ResponseStatus::Success);
        assert!(deleted.handle.is_none());
        assert_eq!(deleted.physical_resource_id, Some(handle.remote_id));
    }

    #[tokio::test]
    async fn missing_handle_is_a_failed_validation_response() {
        let reconciler = reconciler();
        let response = handle_lifecycle(
            &reconciler,
            LifecycleRequest {
                request_id: "req-3".to_string(),
                request_type: Verb::Update,
                descriptor: Some(PolicyDescriptor::new("safety", "dev").with_blocked_term("hack")),
                handle: None,
            },
        )
        .await;
        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.data.error_kind, Some(ErrorKind::Validation));
        assert_eq!(response.data.retryable, Some(false));
        assert!(response.reason.unwrap().contains("missing its handle"));
    }

    #[tokio::test]
    async fn rejected_request_echoes_the_callers_handle() {
        let reconciler = reconciler();
        let handle = handle_lifecycle(&reconciler, create_request())
            .await
            .handle
            .unwrap();

        let response = handle_lifecycle(
            &reconciler,
            LifecycleRequest {
                request_id: "req-5".to_string(),
                request_type: Verb::Update,
                descriptor: None,
                handle: Some(handle.clone()),
            },
        )
        .await;
        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.data.error_kind, Some(ErrorKind::Validation));
        assert_eq!(response.handle, Some(handle.clone()));
        assert_eq!(response.data.version.as_deref(), Some("1"));
        assert_eq!(response.physical_resource_id, Some(handle.remote_id));
    }

    #[tokio::test]
    async fn stale_update_reports_not_found() {
        let reconciler = reconciler();
        let descriptor = PolicyDescriptor::new("safety", "dev").with_blocked_term("hack");
        let response = handle_lifecycle(
            &reconciler,
            LifecycleRequest {
                request_id: "req-4".to_string(),
                request_type: Verb::Update,
                descriptor: Some(descriptor.clone()),
                handle: Some(PolicyHandle::created("never-created", &descriptor)),
            },
        )
        .await;
        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.data.error_kind, Some(ErrorKind::NotFound));
        assert_eq!(response.physical_resource_id.as_deref(), Some("never-created"));
    }

    #[test]
    fn request_parses_from_wire_json() {
        let json = r#"{
            "requestId": "abc",
            "requestType": "Create",
            "descriptor": {"name": "safety", "environment": "dev", "blocked_terms": ["hack"]}
        }"#;
        let request: LifecycleRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.request_type, Verb::Create);
        assert!(matches!(
            request.into_reconcile_request().unwrap(),
            ReconcileRequest::Create { .. }
        ));
    }

    #[test]
    fn response_status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&ResponseStatus::Failed).unwrap(),
            "\"FAILED\""
        );
    }
}
