//! # gr-reconciler
//!
//! Declarative lifecycle management for remote guardrail resources.
//!
//! The remote control plane only offers create/update/delete/describe. The
//! [`Reconciler`] turns a [`gr_policy::PolicyDescriptor`] plus a lifecycle
//! verb into exactly one remote mutating call and reports the outcome as a
//! typed result plus a [`PolicyHandle`] for the caller to persist.
//!
//! ## Key invariants
//!
//! - **One call per invocation**: no internal retries. Retry policy belongs
//!   to the orchestrator, guided by [`ErrorKind`].
//! - **Handle is the key**: update and delete act on `handle.remote_id`,
//!   never on a name lookup.
//! - **Idempotent delete**: deleting an absent guardrail succeeds.
//! - **No guessed success**: a failure never reports a `ready` handle; a
//!   cancelled call is `Unknown`.
//!
//! ## Key components
//!
//! - [`Reconciler`] / [`ReconcileRequest`] — per-verb dispatch
//! - [`SerializedReconciler`] — one in-flight call per policy name
//! - [`GuardrailApi`] — remote seam ([`InMemoryGuardrailApi`], [`HttpGuardrailApi`])
//! - [`HandleStore`] — JSON persistence for handles
//! - [`envelope`] — SUCCESS/FAILED protocol for external orchestrators

pub mod api;
pub mod envelope;
pub mod error;
pub mod handle;
pub mod http;
pub mod memory;
pub mod reconciler;
pub mod serialized;
pub mod store;

pub use api::{GuardrailApi, RemoteGuardrail, RemoteStatus};
pub use envelope::{handle_lifecycle, LifecycleRequest, LifecycleResponse, ResponseStatus};
pub use error::{ErrorKind, ReconcileError, ReconcileFailure, StoreError};
pub use handle::{HandleStatus, PolicyHandle};
pub use http::HttpGuardrailApi;
pub use memory::{CallCounts, InMemoryGuardrailApi};
pub use reconciler::{ReconcileOutcome, ReconcileRequest, Reconciler, ReconcilerConfig, Verb};
pub use serialized::SerializedReconciler;
pub use store::HandleStore;
