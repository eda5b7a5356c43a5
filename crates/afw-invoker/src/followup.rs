//! Detached background work spawned on behalf of handlers.
//!
//! Every followup is tracked from the moment `schedule` returns until its task
//! terminates, whether it succeeds, fails, panics or is dropped with the runtime.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use afw_operation::{FollowupHandle, InvokeError, OperationDef};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Non-publishing invocation path used for scheduled operations.
pub(crate) type InvokeFn =
    Arc<dyn Fn(Arc<OperationDef>, Value) -> BoxFuture<'static, Result<Value, InvokeError>> + Send + Sync>;

#[derive(Clone)]
pub struct FollowupScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    invoke: InvokeFn,
    /// Receivers close when the matching task's guard drops.
    tracked: Mutex<HashMap<u64, watch::Receiver<()>>>,
    next_id: AtomicU64,
}

impl SchedulerInner {
    fn tracked(&self) -> std::sync::MutexGuard<'_, HashMap<u64, watch::Receiver<()>>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owned by the spawned task; untracks the followup when the task ends.
struct TrackingGuard {
    inner: Arc<SchedulerInner>,
    id: u64,
    _done: watch::Sender<()>,
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        self.inner.tracked().remove(&self.id);
    }
}

impl FollowupScheduler {
    pub(crate) fn new(invoke: InvokeFn) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                invoke,
                tracked: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Runs `op` through the non-publishing path in the background.
    pub fn schedule(&self, op: Arc<OperationDef>, input: Value) -> Result<FollowupHandle, InvokeError> {
        let label = op.key().to_string();
        let pending = (self.inner.invoke)(op, input);
        self.spawn(label, async move { pending.await.map(drop).map_err(anyhow::Error::from) }.boxed())
    }

    pub fn schedule_effect<F>(&self, effect: F) -> Result<FollowupHandle, InvokeError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.spawn("effect".to_string(), effect.boxed())
    }

    /// Followups scheduled and not yet terminated.
    pub fn pending(&self) -> usize {
        self.inner.tracked().len()
    }

    /// Waits for every followup tracked at the time of the call. Followups
    /// scheduled while waiting may or may not be covered; dropping the returned
    /// future stops the wait without affecting the followups.
    pub async fn await_all(&self) {
        let waiters: Vec<_> = self.inner.tracked().values().cloned().collect();
        for mut done in waiters {
            // Nothing is ever sent; this resolves when the sender drops.
            while done.changed().await.is_ok() {}
        }
    }

    pub(crate) fn spawn_boxed(
        &self,
        effect: BoxFuture<'static, anyhow::Result<()>>,
    ) -> Result<FollowupHandle, InvokeError> {
        self.spawn("effect".to_string(), effect)
    }

    fn spawn(
        &self,
        label: String,
        work: BoxFuture<'static, anyhow::Result<()>>,
    ) -> Result<FollowupHandle, InvokeError> {
        let runtime = Handle::try_current().map_err(|_| InvokeError::NoRuntime)?;
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (done_tx, done_rx) = watch::channel(());
        self.inner.tracked().insert(id, done_rx);
        let guard = TrackingGuard {
            inner: self.inner.clone(),
            id,
            _done: done_tx,
        };
        debug!(followup = id, %label, "followup scheduled");

        runtime.spawn(async move {
            let _guard = guard;
            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(())) => debug!(followup = id, %label, "followup finished"),
                Ok(Err(err)) => warn!(followup = id, %label, error = %err, "followup failed"),
                Err(_) => warn!(followup = id, %label, "followup panicked"),
            }
        });
        Ok(FollowupHandle::new(id))
    }
}

impl std::fmt::Debug for FollowupScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowupScheduler")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anyhow::anyhow;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn scheduler() -> FollowupScheduler {
        FollowupScheduler::new(Arc::new(|op: Arc<OperationDef>, input: Value| {
            async move {
                if op.key().as_str() == "test.fail" {
                    return Err(InvokeError::NoHandler(op.key().clone()));
                }
                Ok(input)
            }
            .boxed()
        }))
    }

    #[tokio::test]
    async fn tracked_until_terminated() {
        let followups = scheduler();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        followups
            .schedule_effect(async move {
                let _ = release_rx.await;
                anyhow::Ok(())
            })
            .expect("runtime available");
        assert_eq!(followups.pending(), 1);

        release_tx.send(()).expect("followup waiting");
        followups.await_all().await;
        assert_eq!(followups.pending(), 0);
    }

    #[tokio::test]
    async fn failures_and_panics_are_untracked() {
        let followups = scheduler();
        followups
            .schedule(Arc::new(OperationDef::new("test.fail")), json!(null))
            .expect("scheduled");
        followups
            .schedule_effect(async { Err::<(), _>(anyhow!("effect failed")) })
            .expect("scheduled");
        followups
            .schedule_effect(async {
                let missing: Option<()> = None;
                missing.expect("effect panicked");
                anyhow::Ok(())
            })
            .expect("scheduled");
        assert_eq!(followups.pending(), 3);

        followups.await_all().await;
        assert_eq!(followups.pending(), 0);
    }

    #[tokio::test]
    async fn handles_are_unique() {
        let followups = scheduler();
        let a = followups.schedule_effect(async { anyhow::Ok(()) }).expect("scheduled");
        let b = followups.schedule_effect(async { anyhow::Ok(()) }).expect("scheduled");
        assert_ne!(a, b);
        followups.await_all().await;
    }

    #[tokio::test]
    async fn dropping_the_wait_leaves_followups_running() {
        let followups = scheduler();
        let (done_tx, done_rx) = oneshot::channel();
        followups
            .schedule_effect(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let _ = done_tx.send(());
                anyhow::Ok(())
            })
            .expect("scheduled");

        let wait = tokio::time::timeout(Duration::from_millis(1), followups.await_all()).await;
        assert!(wait.is_err());
        done_rx.await.expect("followup completed");
        followups.await_all().await;
        assert_eq!(followups.pending(), 0);
    }

    #[test]
    fn scheduling_outside_a_runtime_fails() {
        let err = scheduler()
            .schedule_effect(async { anyhow::Ok(()) })
            .expect_err("no runtime");
        assert!(matches!(err, InvokeError::NoRuntime));
    }
}
