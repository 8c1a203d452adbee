//! Token-guarded TTL lock serializing the matching step across processes.
//!
//! The lease self-expires, so a crashed holder cannot wedge matchmaking.
//! The random token prevents the classic lost-update hazard: a holder whose
//! lease already expired can no longer delete or extend the lock a newer
//! holder owns, because release and extend compare the stored token server
//! side before acting.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{LockError, StoreError};
use crate::metrics;
use crate::store::{keys, Store};

/// One holder's handle on the matchmaking lock.
///
/// Each engine instance owns one `MatchLock` with its own token. Contention
/// is not an error: `acquire` polls until it wins, bounded only by the
/// caller's cancellation token. That retry has no backoff ceiling; under a
/// long store outage an engine just keeps trying, which is the intended
/// liveness-over-responsiveness trade.
pub struct MatchLock {
    store: Arc<dyn Store>,
    key: String,
    token: String,
    ttl: Duration,
    retry: Duration,
}

impl MatchLock {
    /// Create a lock handle with a fresh random token.
    pub fn new(store: Arc<dyn Store>, ttl: Duration, retry: Duration) -> Self {
        Self {
            store,
            key: keys::MATCH_LOCK.to_string(),
            token: Uuid::new_v4().to_string(),
            ttl,
            retry,
        }
    }

    /// This holder's token. Exposed for tests and diagnostics.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Block until the lock is ours, retrying at the configured interval.
    ///
    /// Store failures during acquisition are transient: they are logged,
    /// counted, and retried like any contended attempt.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), LockError> {
        loop {
            if cancel.is_cancelled() {
                return Err(LockError::Cancelled);
            }
            match self.store.set_nx_ex(&self.key, &self.token, self.ttl).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    metrics::record_lock_retry();
                }
                Err(e) => {
                    warn!(error = %e, "lock acquisition attempt failed");
                    metrics::record_store_error(e.error_code());
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(LockError::Cancelled),
                _ = tokio::time::sleep(self.retry) => {}
            }
        }
    }

    /// Release the lock if we still own it.
    ///
    /// Losing the race (lease expired, someone else acquired) is absorbed
    /// silently: the key now legitimately belongs to another holder.
    pub async fn release(&self) -> Result<(), StoreError> {
        match self.store.compare_and_delete(&self.key, &self.token).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!("lock already expired or taken over; release is a no-op");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Reset the lease to the full TTL if we still own it. Token mismatch
    /// is a silent no-op, same as `release`.
    pub async fn extend(&self) -> Result<(), StoreError> {
        match self
            .store
            .compare_and_extend(&self.key, &self.token, self.ttl)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!("lock already expired or taken over; extend is a no-op");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn lock_with(store: &Arc<MemoryStore>, ttl_ms: u64) -> MatchLock {
        MatchLock::new(
            Arc::clone(store) as Arc<dyn Store>,
            Duration::from_millis(ttl_ms),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_acquire_release_acquire() {
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();

        let a = lock_with(&store, 10_000);
        let b = lock_with(&store, 10_000);

        a.acquire(&cancel).await.unwrap();
        a.release().await.unwrap();
        b.acquire(&cancel).await.unwrap();
        b.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_acquire_blocks_until_release() {
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();

        let a = Arc::new(lock_with(&store, 10_000));
        let b = lock_with(&store, 10_000);

        a.acquire(&cancel).await.unwrap();

        let holder = Arc::clone(&a);
        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            holder.release().await.unwrap();
        });

        // Blocks across several retry intervals, then succeeds.
        b.acquire(&cancel).await.unwrap();
        releaser.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_release_does_not_disturb_new_holder() {
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();

        let stale = lock_with(&store, 10);
        stale.acquire(&cancel).await.unwrap();

        // Lease expires; a different holder takes over.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let fresh = lock_with(&store, 10_000);
        fresh.acquire(&cancel).await.unwrap();

        // The stale holder's release and extend are silent no-ops.
        stale.release().await.unwrap();
        stale.extend().await.unwrap();

        // The fresh holder still owns the key: a third party cannot take it.
        assert!(
            !store
                .set_nx_ex(keys::MATCH_LOCK, "third", Duration::from_secs(1))
                .await
                .unwrap()
        );
        fresh.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_extend_keeps_lease_alive() {
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();

        let a = lock_with(&store, 50);
        a.acquire(&cancel).await.unwrap();
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            a.extend().await.unwrap();
        }
        // Well past the original 50ms lease, the key is still held.
        assert!(
            !store
                .set_nx_ex(keys::MATCH_LOCK, "intruder", Duration::from_secs(1))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_acquire_cancellable_mid_wait() {
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();

        let a = lock_with(&store, 10_000);
        a.acquire(&cancel).await.unwrap();

        let b = lock_with(&store, 10_000);
        let waiter_cancel = cancel.clone();
        let waiter = tokio::spawn(async move {
            b.acquire(&waiter_cancel).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert!(matches!(waiter.await.unwrap(), Err(LockError::Cancelled)));
    }
}
