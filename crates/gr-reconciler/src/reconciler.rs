// reconciler.rs — Drive a remote guardrail toward a descriptor's desired state.
//
// One request = one verb = one remote mutating call. The request is a tagged
// variant so each verb carries exactly the inputs it needs:
//
//   Create { descriptor }           → new handle (ready) or no handle
//   Update { descriptor, handle }   → same remote_id, new version
//   Delete { handle }               → handle dropped; "already gone" is success
//
// No retries happen here. The orchestrator owns retry budgets and backoff,
// and uses the error kind to choose between retry, recreate, and escalate.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gr_policy::{GuardrailPayload, PolicyDescriptor};

use crate::api::GuardrailApi;
use crate::error::{ReconcileError, ReconcileFailure};
use crate::handle::{HandleStatus, PolicyHandle};

/// Lifecycle verb.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verb {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Create => write!(f, "create"),
            Verb::Update => write!(f, "update"),
            Verb::Delete => write!(f, "delete"),
        }
    }
}

/// One reconcile call.
#[derive(Debug, Clone)]
pub enum ReconcileRequest {
    Create {
        descriptor: PolicyDescriptor,
    },
    Update {
        descriptor: PolicyDescriptor,
        handle: PolicyHandle,
    },
    Delete {
        handle: PolicyHandle,
    },
}

impl ReconcileRequest {
    pub fn verb(&self) -> Verb {
        match self {
            ReconcileRequest::Create { .. } => Verb::Create,
            ReconcileRequest::Update { .. } => Verb::Update,
            ReconcileRequest::Delete { .. } => Verb::Delete,
        }
    }

    /// `<environment>/<name>` of the logical resource this request targets.
    pub fn identity(&self) -> String {
        match self {
            ReconcileRequest::Create { descriptor } => descriptor.identity(),
            ReconcileRequest::Update { handle, .. } | ReconcileRequest::Delete { handle } => {
                handle.identity()
            }
        }
    }

    /// The handle the caller currently holds, if any.
    pub fn prior_handle(&self) -> Option<&PolicyHandle> {
        match self {
            ReconcileRequest::Create { .. } => None,
            ReconcileRequest::Update { handle, .. } | ReconcileRequest::Delete { handle } => {
                Some(handle)
            }
        }
    }
}

/// A successful reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub verb: Verb,
    /// The handle to persist; `None` after a delete.
    pub handle: Option<PolicyHandle>,
}

/// Reconciler behavior switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Read the remote state before update/delete. Detects a stale handle
    /// without a mutating call, at the cost of one extra read.
    #[serde(default)]
    pub verify_before_mutate: bool,
}

/// Stateless reconciler over a [`GuardrailApi`].
///
/// Safe to share across tasks. Calls for the *same* policy must still be
/// serialized by the caller (see [`crate::SerializedReconciler`]).
pub struct Reconciler {
    api: Arc<dyn GuardrailApi>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(api: Arc<dyn GuardrailApi>) -> Self {
        Self {
            api,
            config: ReconcilerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_name(&self) -> &str {
        self.api.name()
    }

    /// Run one lifecycle call.
    pub async fn reconcile(
        &self,
        request: ReconcileRequest,
    ) -> Result<ReconcileOutcome, ReconcileFailure> {
        match request {
            ReconcileRequest::Create { descriptor } => self.create(&descriptor).await,
            ReconcileRequest::Update { descriptor, handle } => {
                self.update(&descriptor, handle).await
            }
            ReconcileRequest::Delete { handle } => self.delete(handle).await,
        }
    }

    /// Run one lifecycle call unless `cancelled` completes first.
    ///
    /// A cancelled call is reported as `Unknown`: the remote call may or may
    /// not have landed, so the prior handle (if any) comes back `failed` and
    /// the caller should re-verify with [`Reconciler::refresh`].
    pub async fn reconcile_with_cancel<F>(
        &self,
        request: ReconcileRequest,
        cancelled: F,
    ) -> Result<ReconcileOutcome, ReconcileFailure>
    where
        F: Future<Output = ()>,
    {
        let verb = request.verb();
        let prior = request.prior_handle().cloned();

        tokio::select! {
            biased;
            result = self.reconcile(request) => result,
            _ = cancelled => {
                let error = ReconcileError::Unknown(format!(
                    "{} cancelled before the remote outcome was confirmed",
                    verb
                ));
                warn!(%verb, "reconcile cancelled; remote state must be re-verified");
                let handle = prior.map(|mut h| {
                    h.mark_failed(&error);
                    h
                });
                Err(ReconcileFailure::new(verb, error, handle))
            }
        }
    }

    /// Run one lifecycle call with a deadline. Exceeding it behaves like cancellation.
    pub async fn reconcile_with_timeout(
        &self,
        request: ReconcileRequest,
        timeout: Duration,
    ) -> Result<ReconcileOutcome, ReconcileFailure> {
        self.reconcile_with_cancel(request, tokio::time::sleep(timeout))
            .await
    }

    /// Re-derive a handle from the remote state.
    ///
    /// Returns `Ok(None)` when the guardrail no longer exists.
    pub async fn refresh(
        &self,
        handle: &PolicyHandle,
    ) -> Result<Option<PolicyHandle>, ReconcileError> {
        let Some(remote) = self.api.describe(&handle.remote_id).await? else {
            info!(policy = %handle.identity(), remote_id = %handle.remote_id, "guardrail is gone");
            return Ok(None);
        };

        let mut refreshed = handle.clone();
        refreshed.version = remote.version;
        refreshed.status = remote.status.handle_status();
        refreshed.updated_at = Utc::now();
        if refreshed.status != HandleStatus::Failed {
            refreshed.last_error = None;
        }
        debug!(policy = %refreshed.identity(), status = %refreshed.status, "refreshed handle");
        Ok(Some(refreshed))
    }

    async fn create(
        &self,
        descriptor: &PolicyDescriptor,
    ) -> Result<ReconcileOutcome, ReconcileFailure> {
        let reject = |error: ReconcileError| ReconcileFailure::new(Verb::Create, error, None);

        let payload = GuardrailPayload::build(descriptor).map_err(|e| reject(e.into()))?;
        let token = payload.fingerprint().map_err(|e| reject(e.into()))?;
        debug!(policy = %descriptor.identity(), fingerprint = %token, "creating guardrail");

        match self.api.create(&payload, &token).await {
            Ok(remote_id) => {
                let handle = PolicyHandle::created(remote_id, descriptor);
                info!(
                    policy = %descriptor.identity(),
                    remote_id = %handle.remote_id,
                    "guardrail created"
                );
                Ok(ReconcileOutcome {
                    verb: Verb::Create,
                    handle: Some(handle),
                })
            }
            Err(error) => {
                warn!(policy = %descriptor.identity(), kind = %error.kind(), "create failed: {}", error);
                Err(reject(error))
            }
        }
    }

    async fn update(
        &self,
        descriptor: &PolicyDescriptor,
        prior: PolicyHandle,
    ) -> Result<ReconcileOutcome, ReconcileFailure> {
        if !prior.matches(descriptor) {
            let error = ReconcileError::Validation(format!(
                "descriptor {} does not match handle {}; name and environment cannot change",
                descriptor.identity(),
                prior.identity()
            ));
            return Err(ReconcileFailure::new(Verb::Update, error, Some(prior)));
        }

        let payload = match GuardrailPayload::build(descriptor) {
            Ok(payload) => payload,
            Err(e) => return Err(ReconcileFailure::new(Verb::Update, e.into(), Some(prior))),
        };

        let mut working = prior.clone();
        if let Err(error) = working.transition(HandleStatus::Updating) {
            return Err(ReconcileFailure::new(Verb::Update, error, Some(prior)));
        }

        if self.config.verify_before_mutate {
            match self.api.describe(&prior.remote_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    let error = ReconcileError::NotFound {
                        remote_id: prior.remote_id.clone(),
                    };
                    return Err(remote_failure(Verb::Update, error, prior, working));
                }
                Err(error) => return Err(remote_failure(Verb::Update, error, prior, working)),
            }
        }

        match self.api.update(&prior.remote_id, &payload).await {
            Ok(version) => {
                working.mark_ready(version);
                info!(
                    policy = %working.identity(),
                    remote_id = %working.remote_id,
                    version = %working.version,
                    "guardrail updated"
                );
                Ok(ReconcileOutcome {
                    verb: Verb::Update,
                    handle: Some(working),
                })
            }
            Err(error) => Err(remote_failure(Verb::Update, error, prior, working)),
        }
    }

    async fn delete(&self, prior: PolicyHandle) -> Result<ReconcileOutcome, ReconcileFailure> {
        let mut working = prior.clone();
        if let Err(error) = working.transition(HandleStatus::Deleting) {
            return Err(ReconcileFailure::new(Verb::Delete, error, Some(prior)));
        }

        let deleted = ReconcileOutcome {
            verb: Verb::Delete,
            handle: None,
        };

        if self.config.verify_before_mutate {
            match self.api.describe(&prior.remote_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    info!(policy = %prior.identity(), remote_id = %prior.remote_id, "guardrail already absent");
                    return Ok(deleted);
                }
                Err(error) => return Err(remote_failure(Verb::Delete, error, prior, working)),
            }
        }

        match self.api.delete(&prior.remote_id).await {
            Ok(()) => {
                info!(policy = %prior.identity(), remote_id = %prior.remote_id, "guardrail deleted");
                Ok(deleted)
            }
            Err(ReconcileError::NotFound { .. }) => {
                info!(policy = %prior.identity(), remote_id = %prior.remote_id, "guardrail already absent");
                Ok(deleted)
            }
            Err(error) => Err(remote_failure(Verb::Delete, error, prior, working)),
        }
    }
}

/// Pick the handle to report after a remote-side failure.
///
/// Transient failures leave the remote untouched, so the prior handle stands.
/// Anything else moves the in-progress handle to `failed`.
fn remote_failure(
    verb: Verb,
    error: ReconcileError,
    prior: PolicyHandle,
    mut working: PolicyHandle,
) -> ReconcileFailure {
    warn!(
        policy = %prior.identity(),
        remote_id = %prior.remote_id,
        kind = %error.kind(),
        "{} failed: {}",
        verb,
        error
    );

    if error.is_retryable() {
        return ReconcileFailure::new(verb, error, Some(prior));
    }
    working.mark_failed(&error);
    ReconcileFailure::new(verb, error, Some(working))
}
