use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::{PoolClient, ProxyRecord};
use crate::error::ApiError;
use crate::store::{PolledStore, RefreshHandle};

/// Client-side claim on a single pool member.
///
/// At most one allocation is tracked at a time. A reconciliation task watches
/// the proxies store and drops the claim as soon as a poll shows the proxy
/// missing from the pool or marked dead, so a stale allocation never outlives
/// one polling interval.
pub struct AllocationTracker {
    client: Arc<PoolClient>,
    allocated: Arc<watch::Sender<Option<String>>>,
    proxies_refresh: RefreshHandle,
    reconcile: JoinHandle<()>,
}

impl AllocationTracker {
    /// Attach to the proxies store whose snapshots decide allocation validity.
    pub fn attach(client: Arc<PoolClient>, proxies: &PolledStore<Vec<ProxyRecord>>) -> Self {
        let (tx, _) = watch::channel(None);
        let allocated = Arc::new(tx);

        let mut updates = proxies.subscribe();
        let held = allocated.clone();
        let reconcile = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let snapshot = updates.borrow_and_update().clone();
                // Failed polls keep the previous data; only a fresh snapshot
                // can invalidate the claim.
                let Some(pool) = snapshot.data else { continue };
                held.send_if_modified(|claim| {
                    let Some(url) = claim.as_deref() else {
                        return false;
                    };
                    if pool.iter().any(|p| p.url == url && p.alive) {
                        return false;
                    }
                    tracing::info!("allocated proxy {url} left the pool or died, clearing");
                    *claim = None;
                    true
                });
            }
        });

        Self {
            client,
            allocated,
            proxies_refresh: proxies.refresh_handle(),
            reconcile,
        }
    }

    /// Request one allocation from the pool.
    ///
    /// On success the held URL is replaced and the proxies store is refreshed
    /// immediately, since the allocation changes pool state server-side. On
    /// failure the held state is untouched; retrying is the caller's call.
    pub async fn allocate(&self) -> Result<String, ApiError> {
        let allocation = self.client.allocate().await?;
        self.allocated
            .send_replace(Some(allocation.allocated.clone()));
        self.proxies_refresh.invalidate();
        Ok(allocation.allocated)
    }

    /// Drop the held allocation client-side. The server is not notified.
    pub fn clear(&self) {
        self.allocated.send_replace(None);
    }

    /// Currently held allocation, if any.
    pub fn current(&self) -> Option<String> {
        self.allocated.borrow().clone()
    }

    /// Watch the allocation as reconciliation updates it.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.allocated.subscribe()
    }
}

impl Drop for AllocationTracker {
    fn drop(&mut self) {
        self.reconcile.abort();
    }
}
