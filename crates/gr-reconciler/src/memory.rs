// memory.rs — In-process guardrail control plane.
//
// Behaves like the real service where the reconciler cares:
//   - guardrail names are unique (second create with a new token → Conflict)
//   - create is idempotent per client token
//   - unknown identifiers → NotFound
//   - every successful update bumps the version
//
// Also counts calls, tracks in-flight concurrency, and can inject faults, so
// tests can assert "exactly one mutating call" and per-name serialization.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use gr_policy::GuardrailPayload;

use crate::api::{GuardrailApi, RemoteGuardrail, RemoteStatus};
use crate::error::ReconcileError;

/// Number of calls received per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub describe: usize,
}

impl CallCounts {
    /// Calls that can change remote state.
    pub fn mutating(&self) -> usize {
        self.create + self.update + self.delete
    }
}

#[derive(Debug, Clone)]
struct StoredGuardrail {
    payload: GuardrailPayload,
    version: u64,
}

#[derive(Default)]
struct MemoryState {
    guardrails: HashMap<String, StoredGuardrail>,
    /// client token → remote id
    tokens: HashMap<String, String>,
    calls: CallCounts,
    faults: VecDeque<ReconcileError>,
}

/// Guardrail control plane held entirely in memory.
#[derive(Default)]
pub struct InMemoryGuardrailApi {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryGuardrailApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every mutating call, to make overlapping calls observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next call (of any kind) fail with `error`.
    pub fn fail_next(&self, error: ReconcileError) {
        self.lock().faults.push_back(error);
    }

    /// Delete a guardrail behind the reconciler's back.
    pub fn remove_out_of_band(&self, remote_id: &str) -> bool {
        self.lock().guardrails.remove(remote_id).is_some()
    }

    /// The payload currently stored for `remote_id`.
    pub fn payload(&self, remote_id: &str) -> Option<GuardrailPayload> {
        self.lock()
            .guardrails
            .get(remote_id)
            .map(|g| g.payload.clone())
    }

    /// Number of guardrails that currently exist.
    pub fn len(&self) -> usize {
        self.lock().guardrails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Highest number of mutating calls ever observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and pop an injected fault, if any.
    fn begin_call(&self, count: impl FnOnce(&mut CallCounts)) -> Result<(), ReconcileError> {
        let mut state = self.lock();
        count(&mut state.calls);
        match state.faults.pop_front() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    async fn simulate_latency(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GuardrailApi for InMemoryGuardrailApi {
    async fn create(
        &self,
        payload: &GuardrailPayload,
        client_token: &str,
    ) -> Result<String, ReconcileError> {
        self.begin_call(|c| c.create += 1)?;
        self.simulate_latency().await;

        let mut state = self.lock();

        // A replayed token converges only while the guardrail still holds
        // the payload it was created with. After an update it is just a
        // taken name.
        if let Some(existing) = state.tokens.get(client_token) {
            if state
                .guardrails
                .get(existing)
                .is_some_and(|g| g.payload == *payload)
            {
                return Ok(existing.clone());
            }
        }

        if state.guardrails.values().any(|g| g.payload.name == payload.name) {
            return Err(ReconcileError::Conflict(format!(
                "a guardrail named '{}' already exists",
                payload.name
            )));
        }

        let remote_id = Uuid::new_v4().simple().to_string()[..12].to_string();
        state.guardrails.insert(
            remote_id.clone(),
            StoredGuardrail {
                payload: payload.clone(),
                version: 1,
            },
        );
        state
            .tokens
            .insert(client_token.to_string(), remote_id.clone());
        Ok(remote_id)
    }

    async fn update(
        &self,
        remote_id: &str,
        payload: &GuardrailPayload,
    ) -> Result<String, ReconcileError> {
        self.begin_call(|c| c.update += 1)?;
        self.simulate_latency().await;

        let mut state = self.lock();

        let name_taken = state
            .guardrails
            .iter()
            .any(|(id, g)| id != remote_id && g.payload.name == payload.name);

        let stored = state
            .guardrails
            .get_mut(remote_id)
            .ok_or_else(|| ReconcileError::NotFound {
                remote_id: remote_id.to_string(),
            })?;

        if name_taken {
            return Err(ReconcileError::Conflict(format!(
                "a guardrail named '{}' already exists",
                payload.name
            )));
        }

        stored.payload = payload.clone();
        stored.version += 1;
        Ok(stored.version.to_string())
    }

    async fn delete(&self, remote_id: &str) -> Result<(), ReconcileError> {
        self.begin_call(|c| c.delete += 1)?;
        self.simulate_latency().await;

        match self.lock().guardrails.remove(remote_id) {
            Some(_) => Ok(()),
            None => Err(ReconcileError::NotFound {
                remote_id: remote_id.to_string(),
            }),
        }
    }

    async fn describe(&self, remote_id: &str) -> Result<Option<RemoteGuardrail>, ReconcileError> {
        self.begin_call(|c| c.describe += 1)?;

        Ok(self
            .lock()
            .guardrails
            .get(remote_id)
            .map(|g| RemoteGuardrail {
                guardrail_id: remote_id.to_string(),
                name: g.payload.name.clone(),
                version: g.version.to_string(),
                status: RemoteStatus::Ready,
            }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
