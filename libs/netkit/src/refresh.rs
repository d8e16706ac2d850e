//! Single-flight coordination of credential refreshes.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

/// Shared outcome of one refresh; `true` when new credentials are in place.
pub type RefreshHandle = Shared<BoxFuture<'static, bool>>;

/// Ensures at most one refresh runs at a time.
///
/// Every caller that asks while a refresh is in flight receives a clone of the
/// same [`RefreshHandle`] and observes the same outcome. The slot is cleared
/// when the refresh finishes, so the next 401 starts a new one.
#[derive(Clone, Default)]
pub struct RefreshCoordinator {
    slot: Arc<Mutex<Option<RefreshHandle>>>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the in-flight handle, or create one from `start`.
    ///
    /// The handle is stored before anyone awaits it; check and store happen
    /// under one lock. `start` runs under that lock and must only build the
    /// future, not poll it.
    pub fn handle<F>(&self, start: F) -> RefreshHandle
    where
        F: FnOnce() -> BoxFuture<'static, bool>,
    {
        let mut slot = self.slot.lock();
        if let Some(existing) = slot.as_ref() {
            return existing.clone();
        }

        let refresh = start();
        let clear = Arc::clone(&self.slot);
        let handle = async move {
            let refreshed = refresh.await;
            clear.lock().take();
            tracing::debug!(refreshed, "credential refresh finished");
            refreshed
        }
        .boxed()
        .shared();

        *slot = Some(handle.clone());
        handle
    }

    /// Whether a refresh is currently pending.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(calls: &Arc<AtomicUsize>, outcome: bool) -> impl FnOnce() -> BoxFuture<'static, bool> + use<> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                outcome
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let coordinator = RefreshCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| coordinator.handle(counting(&calls, true)))
            .collect();
        assert!(coordinator.in_flight());

        let results = futures::future::join_all(handles).await;
        assert!(results.into_iter().all(|ok| ok));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.in_flight());
    }

    #[tokio::test]
    async fn failure_is_shared_and_slot_clears() {
        let coordinator = RefreshCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = coordinator.handle(counting(&calls, false));
        let b = coordinator.handle(counting(&calls, true));
        let (a, b) = tokio::join!(a, b);
        assert!(!a);
        assert!(!b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // a new need after completion starts a fresh refresh
        assert!(coordinator.handle(counting(&calls, true)).await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn spawned_callers_share_one_refresh() {
        let coordinator = RefreshCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                let start = counting(&calls, true);
                tokio::spawn(async move { coordinator.handle(start).await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
