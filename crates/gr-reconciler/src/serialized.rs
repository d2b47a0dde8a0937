// serialized.rs — At most one in-flight reconcile per logical policy.
//
// The remote API does not serialize concurrent create/update/delete on one
// guardrail. SerializedReconciler keeps one async lock per
// `<environment>/<name>`: calls for the same policy queue up, calls for
// different policies run concurrently. A lock lives only while some call
// holds or waits on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::error::ReconcileFailure;
use crate::reconciler::{ReconcileOutcome, ReconcileRequest, Reconciler};

pub struct SerializedReconciler {
    inner: Reconciler,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SerializedReconciler {
    pub fn new(inner: Reconciler) -> Self {
        Self {
            inner,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &Reconciler {
        &self.inner
    }

    /// Reconcile, waiting for any in-flight call on the same policy first.
    pub async fn reconcile(
        &self,
        request: ReconcileRequest,
    ) -> Result<ReconcileOutcome, ReconcileFailure> {
        let identity = request.identity();
        let lock = self.lock_for(&identity);
        let result = {
            let _guard = lock.lock().await;
            self.inner.reconcile(request).await
        };
        self.release(&identity, lock);
        result
    }

    /// Like [`SerializedReconciler::reconcile`]; the deadline starts once the
    /// policy's lock is held.
    pub async fn reconcile_with_timeout(
        &self,
        request: ReconcileRequest,
        timeout: Duration,
    ) -> Result<ReconcileOutcome, ReconcileFailure> {
        let identity = request.identity();
        let lock = self.lock_for(&identity);
        let result = {
            let _guard = lock.lock().await;
            self.inner.reconcile_with_timeout(request, timeout).await
        };
        self.release(&identity, lock);
        result
    }

    /// Number of policies with a call holding or waiting on their lock.
    pub fn tracked_policies(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn lock_for(&self, identity: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Sweep entries left behind by calls that were dropped mid-flight.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(identity.to_string()).or_default().clone()
    }

    /// Drop the caller's reference and forget the lock if nobody else has it.
    /// Clones only happen under the map lock, so a count of one is final.
    fn release(&self, identity: &str, lock: Arc<AsyncMutex<()>>) {
        drop(lock);
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(identity)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryGuardrailApi;
    use gr_policy::PolicyDescriptor;

    fn create(name: &str) -> ReconcileRequest {
        ReconcileRequest::Create {
            descriptor: PolicyDescriptor::new(name, "dev").with_blocked_term("hack"),
        }
    }

    #[tokio::test]
    async fn locks_are_dropped_once_calls_finish() {
        let reconciler =
            SerializedReconciler::new(Reconciler::new(Arc::new(InMemoryGuardrailApi::new())));

        for i in 0..20 {
            reconciler.reconcile(create(&format!("policy_{}", i))).await.unwrap();
        }
        reconciler
            .reconcile_with_timeout(create("timed"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reconciler.tracked_policies(), 0);
    }

    #[tokio::test]
    async fn abandoned_call_is_swept_on_next_lookup() {
        let reconciler =
            SerializedReconciler::new(Reconciler::new(Arc::new(InMemoryGuardrailApi::new())));

        // Hold a policy's lock, then abandon a second call queued behind it.
        let held = reconciler.lock_for("dev/busy");
        let guard = held.lock().await;
        let queued = reconciler.reconcile(create("busy"));
        let abandoned = tokio::time::timeout(Duration::from_millis(20), queued).await;
        assert!(abandoned.is_err());
        drop(guard);
        drop(held);
        assert_eq!(reconciler.tracked_policies(), 1);

        reconciler.reconcile(create("other")).await.unwrap();
        assert_eq!(reconciler.tracked_policies(), 0);
    }
}
