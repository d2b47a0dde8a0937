// handle.rs — PolicyHandle: the caller-owned record of a remote guardrail.
//
// The reconciler is stateless across calls. Whoever drives it (the CLI, an
// external orchestrator) persists the handle returned by one call and passes
// it back on the next. The handle, not the descriptor, is the authoritative
// key for update and delete.
//
// Status lifecycle, as seen through repeated reconcile calls:
//   creating → ready → updating → ready → deleting → (handle dropped)
//   creating | updating | deleting → failed
//   failed → creating | updating (retry once the cause is fixed)
//   any status → deleting (delete is always allowed)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gr_policy::PolicyDescriptor;

use crate::error::ReconcileError;

/// Lifecycle status of a remote guardrail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandleStatus {
    Creating,
    Ready,
    Updating,
    Deleting,
    Failed,
}

impl fmt::Display for HandleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleStatus::Creating => write!(f, "creating"),
            HandleStatus::Ready => write!(f, "ready"),
            HandleStatus::Updating => write!(f, "updating"),
            HandleStatus::Deleting => write!(f, "deleting"),
            HandleStatus::Failed => write!(f, "failed"),
        }
    }
}

impl HandleStatus {
    /// Whether moving from this status to `next` is allowed.
    ///
    /// `updating → updating` and `deleting → deleting` let an interrupted
    /// call be re-issued. `failed` is never terminal, and every status can
    /// move to `deleting`.
    pub fn can_transition_to(&self, next: HandleStatus) -> bool {
        use HandleStatus::*;

        if next == Deleting {
            return true;
        }
        matches!(
            (self, next),
            (Creating, Ready)
                | (Creating, Failed)
                | (Ready, Updating)
                | (Updating, Ready)
                | (Updating, Updating)
                | (Updating, Failed)
                | (Deleting, Failed)
                | (Failed, Creating)
                | (Failed, Updating)
        )
    }

    /// True while a mutating call may still be in flight remotely.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            HandleStatus::Creating | HandleStatus::Updating | HandleStatus::Deleting
        )
    }
}

/// The reconciler's record of a previously created remote guardrail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyHandle {
    /// Identifier assigned by the remote control plane.
    pub remote_id: String,

    /// Remote version, bumped on every successful update.
    pub version: String,

    pub status: HandleStatus,

    /// Descriptor name this handle was created for.
    pub name: String,

    /// Descriptor environment this handle was created for.
    pub environment: String,

    /// When the handle last changed.
    pub updated_at: DateTime<Utc>,

    /// Message of the error that moved the handle to `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PolicyHandle {
    /// Version assigned to a freshly created guardrail.
    pub const INITIAL_VERSION: &'static str = "1";

    /// Handle for a guardrail the remote side just confirmed creating.
    pub fn created(remote_id: impl Into<String>, descriptor: &PolicyDescriptor) -> Self {
        Self {
            remote_id: remote_id.into(),
            version: Self::INITIAL_VERSION.to_string(),
            status: HandleStatus::Ready,
            name: descriptor.name.clone(),
            environment: descriptor.environment.clone(),
            updated_at: Utc::now(),
            last_error: None,
        }
    }

    /// `<environment>/<name>`, matching [`PolicyDescriptor::identity`].
    pub fn identity(&self) -> String {
        format!("{}/{}", self.environment, self.name)
    }

    /// Whether this handle belongs to `descriptor`'s policy.
    pub fn matches(&self, descriptor: &PolicyDescriptor) -> bool {
        self.name == descriptor.name && self.environment == descriptor.environment
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: HandleStatus) -> Result<(), ReconcileError> {
        if !self.status.can_transition_to(next) {
            return Err(ReconcileError::InvalidTransition {
                remote_id: self.remote_id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a confirmed remote mutation.
    pub(crate) fn mark_ready(&mut self, version: impl Into<String>) {
        self.version = version.into();
        self.status = HandleStatus::Ready;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// Record that the remote state is now failed or indeterminate.
    pub fn mark_failed(&mut self, error: &ReconcileError) {
        self.status = HandleStatus::Failed;
        self.last_error = Some(error.to_string());
        self.updated_at = Utc::now();
    }
}
