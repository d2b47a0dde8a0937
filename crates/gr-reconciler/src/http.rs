// http.rs — GuardrailApi over JSON/HTTP.
//
// Endpoints (relative to the configured base URL):
//   POST   /guardrails        create   (Idempotency-Key: <client token>)
//   PUT    /guardrails/{id}   update
//   DELETE /guardrails/{id}   delete
//   GET    /guardrails/{id}   describe
//
// Transport and status codes are classified into the reconcile taxonomy
// here, so the reconciler never looks at HTTP details.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use gr_policy::GuardrailPayload;

use crate::api::{GuardrailApi, RemoteGuardrail};
use crate::error::ReconcileError;

/// Header carrying the create client token.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    guardrail_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    version: String,
}

/// HTTP client for the remote guardrail control plane.
pub struct HttpGuardrailApi {
    client: Client,
    base_url: String,
}

impl HttpGuardrailApi {
    /// Build a client for `base_url`. `timeout` bounds each request; it is
    /// caller configuration, not a retry budget.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ReconcileError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReconcileError::Unknown(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/guardrails", self.base_url)
    }

    fn guardrail_url(&self, remote_id: &str) -> String {
        format!("{}/guardrails/{}", self.base_url, remote_id)
    }
}

/// Map a non-success HTTP status onto the reconcile taxonomy.
///
/// `remote_id` is the guardrail the request targeted; a 404 without one
/// (e.g. on create) means a misconfigured endpoint, not a stale handle.
pub fn classify_status(status: StatusCode, body: &str, remote_id: Option<&str>) -> ReconcileError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.trim())
    };

    match status.as_u16() {
        400 | 422 => ReconcileError::Validation(detail),
        409 => ReconcileError::Conflict(detail),
        404 => match remote_id {
            Some(id) => ReconcileError::NotFound {
                remote_id: id.to_string(),
            },
            None => ReconcileError::Unknown(detail),
        },
        408 | 429 | 500 | 502 | 503 | 504 => ReconcileError::Transient(detail),
        _ => ReconcileError::Unknown(detail),
    }
}

/// Map a transport-level failure (no HTTP status) onto the taxonomy.
fn classify_transport(err: reqwest::Error) -> ReconcileError {
    if err.is_timeout() || err.is_connect() {
        ReconcileError::Transient(err.to_string())
    } else {
        ReconcileError::Unknown(err.to_string())
    }
}

async fn check(response: Response, remote_id: Option<&str>) -> Result<Response, ReconcileError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body, remote_id))
}

#[async_trait]
impl GuardrailApi for HttpGuardrailApi {
    async fn create(
        &self,
        payload: &GuardrailPayload,
        client_token: &str,
    ) -> Result<String, ReconcileError> {
        let response = self
            .client
            .post(self.collection_url())
            .header(IDEMPOTENCY_HEADER, client_token)
            .json(payload)
            .send()
            .await
            .map_err(classify_transport)?;
        let created: CreateResponse = check(response, None)
            .await?
            .json()
            .await
            .map_err(|e| ReconcileError::Unknown(format!("malformed create response: {}", e)))?;
        Ok(created.guardrail_id)
    }

    async fn update(
        &self,
        remote_id: &str,
        payload: &GuardrailPayload,
    ) -> Result<String, ReconcileError> {
        let response = self
            .client
            .put(self.guardrail_url(remote_id))
            .json(payload)
            .send()
            .await
            .map_err(classify_transport)?;
        let updated: UpdateResponse = check(response, Some(remote_id))
            .await?
            .json()
            .await
            .map_err(|e| ReconcileError::Unknown(format!("malformed update response: {}", e)))?;
        Ok(updated.version)
    }

    async fn delete(&self, remote_id: &str) -> Result<(), ReconcileError> {
        let response = self
            .client
            .delete(self.guardrail_url(remote_id))
            .send()
            .await
            .map_err(classify_transport)?;
        check(response, Some(remote_id)).await?;
        Ok(())
    }

    async fn describe(&self, remote_id: &str) -> Result<Option<RemoteGuardrail>, ReconcileError> {
        let response = self
            .client
            .get(self.guardrail_url(remote_id))
            .send()
            .await
            .map_err(classify_transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let remote: RemoteGuardrail = check(response, Some(remote_id))
            .await?
            .json()
            .await
            .map_err(|e| ReconcileError::Unknown(format!("malformed describe response: {}", e)))?;
        Ok(Some(remote))
    }

    fn name(&self) -> &str {
        "http"
    }
}
