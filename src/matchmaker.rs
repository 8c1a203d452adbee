//! The matchmaking engine.
//!
//! One or more engine instances run per process, all sharing the same
//! store. The distributed lock is the sole mechanism preventing two
//! instances from popping overlapping users; the queue pop and active-set
//! removal are the durable signal of "already matched", so a store failure
//! mid-cycle never leaves partial-match state visible to anyone.
//!
//! Lock discipline: release-and-reacquire. After a completed match the
//! engine releases the lock and loops back to acquire, giving engines in
//! other processes a fair shot between matches. The lease is extended once
//! right after the length check so it cannot lapse while the pop/publish/
//! prune steps run.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stranger_proto::{channel, ChatMsg};

use crate::config::MatchmakerConfig;
use crate::error::StoreError;
use crate::lock::MatchLock;
use crate::metrics;
use crate::store::{keys, Store, Subscription};

/// What one pass of the engine loop did.
enum Cycle {
    /// Popped and notified a pair.
    Matched,
    /// Nothing to do this pass (queue raced short, or a stale duplicate).
    Skipped,
    /// Cancelled or the notification channel closed; stop the engine.
    Stopped,
}

/// How far a match got before a failure. Users whose Join never went out
/// may still be restored to the queue.
#[derive(Default)]
struct MatchProgress {
    first_notified: bool,
    second_notified: bool,
}

/// One matchmaking engine instance.
pub struct Matchmaker {
    store: Arc<dyn Store>,
    lock: MatchLock,
    retry: Duration,
    id: usize,
}

impl Matchmaker {
    /// Create an engine with its own lock token.
    pub fn new(store: Arc<dyn Store>, config: &MatchmakerConfig, id: usize) -> Self {
        let lock = MatchLock::new(Arc::clone(&store), config.lock_ttl(), config.lock_retry());
        Self {
            store,
            lock,
            retry: config.lock_retry(),
            id,
        }
    }

    /// Spawn the configured number of engine instances.
    pub fn spawn_engines(
        store: Arc<dyn Store>,
        config: &MatchmakerConfig,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..config.engines.max(1))
            .map(|id| {
                let engine = Matchmaker::new(Arc::clone(&store), config, id);
                let cancel = cancel.clone();
                tokio::spawn(async move { engine.run(cancel).await })
            })
            .collect()
    }

    /// Run the engine until cancelled.
    ///
    /// Store failures are transient: the failed iteration is abandoned, the
    /// lock released best-effort, and the loop starts over from acquire.
    pub async fn run(self, cancel: CancellationToken) {
        // Subscribe before the first queue-length check. Subscribing later
        // could miss the notification that arrives between the check and
        // the wait, leaving the engine asleep with a full queue.
        let mut joined = match self.store.subscribe(channel::USER_JOINED).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(engine = self.id, error = %e, "cannot subscribe to join notifications");
                metrics::record_store_error(e.error_code());
                return;
            }
        };

        info!(engine = self.id, "matchmaking engine running");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.cycle(&mut joined, &cancel).await {
                Ok(Cycle::Matched) | Ok(Cycle::Skipped) => {}
                Ok(Cycle::Stopped) => break,
                Err(e) => {
                    warn!(engine = self.id, error = %e, "match cycle failed; retrying");
                    metrics::record_store_error(e.error_code());
                    // The lock may still be held from the failed cycle.
                    let _ = self.lock.release().await;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.retry) => {}
                    }
                }
            }
        }
        info!(engine = self.id, "matchmaking engine stopped");
    }

    /// One pass: acquire the lock, wait out a short queue, pop a pair,
    /// notify both sides, prune the active set, release.
    async fn cycle(
        &self,
        joined: &mut Subscription,
        cancel: &CancellationToken,
    ) -> Result<Cycle, StoreError> {
        if self.lock.acquire(cancel).await.is_err() {
            return Ok(Cycle::Stopped);
        }

        loop {
            let len = self.store.list_len(keys::WAIT_QUEUE).await?;
            metrics::set_waiting_users(len as i64);
            if len >= 2 {
                break;
            }
            // Idle: hand the lock back so other instances can try, then
            // sleep until the next enqueue announcement.
            self.lock.release().await?;
            tokio::select! {
                _ = cancel.cancelled() => return Ok(Cycle::Stopped),
                notif = joined.recv() => {
                    if notif.is_none() {
                        return Ok(Cycle::Stopped);
                    }
                }
            }
            if self.lock.acquire(cancel).await.is_err() {
                return Ok(Cycle::Stopped);
            }
        }

        let started = Instant::now();
        // Fresh lease so it cannot lapse while we pop, publish, and prune.
        self.lock.extend().await?;

        // Sessions may dequeue without the lock, so pops can still come up
        // short despite the length check above.
        let Some(first) = self.store.list_pop_front(keys::WAIT_QUEUE).await? else {
            self.lock.release().await?;
            return Ok(Cycle::Skipped);
        };
        let Some(second) = self.store.list_pop_front(keys::WAIT_QUEUE).await? else {
            self.store.list_push_front(keys::WAIT_QUEUE, &first).await?;
            self.lock.release().await?;
            return Ok(Cycle::Skipped);
        };

        if first == second {
            // Stale duplicate of a requeued user: keep one entry, match
            // nobody. A user is never paired with itself.
            self.store.list_push_front(keys::WAIT_QUEUE, &first).await?;
            self.lock.release().await?;
            return Ok(Cycle::Skipped);
        }

        // Both keys are popped now. A failure part-way through notification
        // must not strand them: whoever never saw a Join goes back to the
        // queue head, oldest in front, before the error propagates.
        let mut progress = MatchProgress::default();
        if let Err(e) = self.notify_pair(&first, &second, &mut progress).await {
            if !progress.second_notified {
                self.restore(&second).await;
            }
            if !progress.first_notified {
                self.restore(&first).await;
            }
            let _ = self.lock.release().await;
            return Err(e);
        }

        self.lock.release().await?;

        info!(engine = self.id, a = %first, b = %second, "matched pair");
        metrics::record_match(started.elapsed().as_secs_f64());
        Ok(Cycle::Matched)
    }

    /// Tell each side the other's public key, then prune both from the
    /// active set. `progress` records which Joins actually went out so the
    /// caller can restore the rest of the pair on failure.
    async fn notify_pair(
        &self,
        first: &str,
        second: &str,
        progress: &mut MatchProgress,
    ) -> Result<(), StoreError> {
        let to_first = encode_join(second)?;
        let to_second = encode_join(first)?;
        self.store.publish(&channel::user(first), &to_first).await?;
        progress.first_notified = true;
        self.store
            .publish(&channel::user(second), &to_second)
            .await?;
        progress.second_notified = true;

        self.store.set_remove(keys::ACTIVE_SET, first).await?;
        self.store.set_remove(keys::ACTIVE_SET, second).await?;
        Ok(())
    }

    /// Best-effort return of a popped-but-unnotified user to the queue
    /// head. If even the restore fails, the error already en route to the
    /// caller is the one worth reporting.
    async fn restore(&self, key: &str) {
        if let Err(e) = self.store.list_push_front(keys::WAIT_QUEUE, key).await {
            warn!(engine = self.id, user = %key, error = %e, "could not restore popped user");
            metrics::record_store_error(e.error_code());
        }
    }
}

fn encode_join(peer_key: &str) -> Result<Vec<u8>, StoreError> {
    // Join payloads are plain strings; an encode failure here means the
    // cycle is retried like any other transient fault.
    ChatMsg::join(peer_key)
        .encode()
        .map_err(|e| StoreError::Transport(format!("encode join message: {e}")))
}
