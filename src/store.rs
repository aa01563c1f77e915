use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::ApiError;

/// Snapshot of a polled collection: last-known-good data plus fetch status.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub error: Option<String>,
    pub is_loading: bool,
    pub updated_at: Option<DateTime<Local>>,
}

impl<T> QueryState<T> {
    fn loading() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: true,
            updated_at: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Handle that forces a store's next fetch to run immediately.
#[derive(Clone)]
pub struct RefreshHandle(Arc<Notify>);

impl RefreshHandle {
    pub fn invalidate(&self) {
        self.0.notify_one();
    }
}

/// Periodically refreshed single-slot cache for a remotely-owned collection.
///
/// One background task owns the timer and serializes fetches: a tick or an
/// invalidation arriving while a fetch is in flight coalesces into at most
/// one follow-up fetch. Subscribers observe `QueryState` snapshots through a
/// watch channel. A failed refresh keeps the previous data and records the
/// error; the next tick retries on its own.
pub struct PolledStore<T> {
    state: watch::Receiver<QueryState<T>>,
    refresh: RefreshHandle,
    task: JoinHandle<()>,
}

impl<T: Clone + Send + Sync + 'static> PolledStore<T> {
    /// Spawn the polling task: one fetch immediately, then one per interval.
    pub fn spawn<F, Fut>(interval: Duration, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send,
    {
        let (tx, rx) = watch::channel(QueryState::loading());
        let refresh = RefreshHandle(Arc::new(Notify::new()));
        let wakeup = refresh.0.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = wakeup.notified() => {
                        // A forced refresh restarts the cadence.
                        ticker.reset();
                    }
                }

                match fetch().await {
                    Ok(data) => tx.send_modify(|state| {
                        state.data = Some(data);
                        state.error = None;
                        state.is_loading = false;
                        state.updated_at = Some(Local::now());
                    }),
                    Err(err) => {
                        tracing::warn!("poll failed: {err}");
                        tx.send_modify(|state| {
                            state.error = Some(err.to_string());
                            state.is_loading = false;
                        });
                    }
                }
            }
        });

        Self {
            state: rx,
            refresh,
            task,
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    /// Watch snapshots as they are published.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.clone()
    }

    /// Force the next fetch to run now instead of at the next tick.
    pub fn invalidate(&self) {
        self.refresh.invalidate();
    }

    /// Detachable handle for triggering refreshes from elsewhere.
    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.clone()
    }
}

impl<T> Drop for PolledStore<T> {
    fn drop(&mut self) {
        // Cancels the timer and discards any fetch still in flight.
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const INTERVAL: Duration = Duration::from_millis(5000);

    #[tokio::test(start_paused = true)]
    async fn test_initial_fetch_then_interval_refetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let store = PolledStore::spawn(INTERVAL, move || {
            let counter = counter.clone();
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        });
        let mut sub = store.subscribe();
        assert!(store.state().is_loading);

        sub.changed().await.unwrap();
        let state = store.state();
        assert_eq!(state.data, Some(1));
        assert!(!state.is_loading);
        assert!(!state.is_error());
        assert!(state.updated_at.is_some());

        // Paused clock advances to the next tick on its own.
        sub.changed().await.unwrap();
        assert_eq!(store.state().data, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refetch_keeps_previous_data() {
        let failing = Arc::new(AtomicBool::new(false));
        let flag = failing.clone();
        let store = PolledStore::spawn(INTERVAL, move || {
            let flag = flag.clone();
            async move {
                if flag.load(Ordering::SeqCst) {
                    Err(ApiError::Transport("connection refused".into()))
                } else {
                    Ok(vec!["p1".to_string()])
                }
            }
        });
        let mut sub = store.subscribe();

        sub.changed().await.unwrap();
        assert_eq!(store.state().data, Some(vec!["p1".to_string()]));

        failing.store(true, Ordering::SeqCst);
        store.invalidate();
        sub.changed().await.unwrap();

        let state = store.state();
        assert_eq!(state.data, Some(vec!["p1".to_string()]));
        assert!(state.is_error());
        assert!(state.error.unwrap().contains("connection refused"));

        // Recovery on a later cycle clears the error.
        failing.store(false, Ordering::SeqCst);
        sub.changed().await.unwrap();
        assert!(!store.state().is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_settles_loading_state() {
        let store = PolledStore::spawn(INTERVAL, || async {
            Err::<usize, _>(ApiError::Transport("down".into()))
        });
        let mut sub = store.subscribe();

        sub.changed().await.unwrap();
        let state = store.state();
        assert!(!state.is_loading);
        assert!(state.is_error());
        assert_eq!(state.data, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_triggers_immediate_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let store = PolledStore::spawn(INTERVAL, move || {
            let counter = counter.clone();
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        });
        let mut sub = store.subscribe();
        sub.changed().await.unwrap();

        store.invalidate();
        // Must complete well inside the 5s cadence; the timeout timer fires
        // first if the refetch did not run immediately.
        tokio::time::timeout(Duration::from_millis(50), sub.changed())
            .await
            .expect("invalidate did not trigger a prompt refetch")
            .unwrap();
        assert_eq!(store.state().data, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_invalidations_coalesce() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let counter = calls.clone();
        let release = gate.clone();
        let store = PolledStore::spawn(INTERVAL, move || {
            let counter = counter.clone();
            let release = release.clone();
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if call == 1 {
                    // Hold the first fetch open until the test releases it.
                    release.notified().await;
                }
                Ok(call)
            }
        });
        let mut sub = store.subscribe();
        let start = tokio::time::Instant::now();
        // Let the task start its first (blocked) fetch.
        tokio::task::yield_now().await;

        store.invalidate();
        store.invalidate();
        store.invalidate();
        gate.notify_one();

        // The queued invalidations collapse into exactly one follow-up fetch,
        // well before the 5s tick would have produced a second one.
        sub.wait_for(|state| state.data == Some(2)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() < INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let store = PolledStore::spawn(INTERVAL, move || {
            let counter = counter.clone();
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        });
        let mut sub = store.subscribe();
        sub.changed().await.unwrap();

        drop(store);
        let before = calls.load(Ordering::SeqCst);
        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_replaced_wholesale_on_success() {
        let snapshots = Arc::new(Mutex::new(vec!["a".to_string(), "b".to_string()]));
        let source = snapshots.clone();
        let store = PolledStore::spawn(INTERVAL, move || {
            let source = source.clone();
            async move { Ok(source.lock().unwrap().clone()) }
        });
        let mut sub = store.subscribe();
        sub.changed().await.unwrap();
        assert_eq!(
            store.state().data,
            Some(vec!["a".to_string(), "b".to_string()])
        );

        // The next snapshot supersedes the old one entirely, no merging.
        *snapshots.lock().unwrap() = vec!["c".to_string()];
        store.invalidate();
        sub.changed().await.unwrap();
        assert_eq!(store.state().data, Some(vec!["c".to_string()]));
    }
}
