//! Coordination store abstraction.
//!
//! Queue, active set, lock lease, and pub/sub all live in one shared store;
//! it is the only thing matchmaking engines and sessions in different
//! processes have in common. Two backends:
//! - [`memory::MemoryStore`]: single-process deployments and tests
//! - [`redis::RedisStore`]: multi-process deployments
//!
//! Every mutation of a shared resource goes through an atomic operation on
//! this trait; no caller may read-modify-write store state unguarded.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::StoreConfig;
use crate::error::StoreError;

/// Construct the configured store backend.
///
/// An unknown backend name is a startup error rather than a silent memory
/// fallback: in a multi-process deployment a typo here would quietly split
/// the matchmaking network.
pub async fn from_config(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(memory::MemoryStore::new())),
        "redis" => Ok(Arc::new(redis::RedisStore::connect(&config.url).await?)),
        other => Err(StoreError::Config(format!(
            "unknown store backend {other:?} (expected \"memory\" or \"redis\")"
        ))),
    }
}

/// Well-known store key names.
pub mod keys {
    /// FIFO queue of waiting users' public keys.
    pub const WAIT_QUEUE: &str = "stranger:queue";
    /// Set of public keys currently waiting or matched.
    pub const ACTIVE_SET: &str = "stranger:active";
    /// The matchmaking mutual-exclusion lease.
    pub const MATCH_LOCK: &str = "stranger:match_lock";
}

/// A live subscription to one pub/sub channel.
///
/// `recv` yields raw payloads in publish order (single publisher per
/// channel); `None` means the channel is closed and the listener must stop.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Subscription {
    /// Wrap a receiver fed by a backend.
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self { rx }
    }

    /// Receive the next published payload, or `None` once closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// Operations the matchmaking system needs from a shared store.
///
/// Mirrors what Redis offers natively: lists, sets, expiring keys with
/// check-and-act scripts, pub/sub, and atomic multi-operation transactions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Set `key` to `value` with expiry `ttl` only if absent. Returns
    /// whether the set happened.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete `key` only if it currently holds `token`, atomically.
    /// Returns whether the delete happened.
    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, StoreError>;

    /// Reset the expiry of `key` to `ttl` only if it currently holds
    /// `token`, atomically. Returns whether the extension happened.
    async fn compare_and_extend(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Pop the front element of a list.
    async fn list_pop_front(&self, list: &str) -> Result<Option<String>, StoreError>;

    /// Push an element onto the front of a list.
    async fn list_push_front(&self, list: &str, value: &str) -> Result<(), StoreError>;

    /// Length of a list (0 if absent).
    async fn list_len(&self, list: &str) -> Result<usize, StoreError>;

    /// Whether `member` is in `set`.
    async fn set_contains(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove `member` from `set`. Removing an absent member is a no-op.
    async fn set_remove(&self, set: &str, member: &str) -> Result<(), StoreError>;

    /// Publish a payload to a channel. Fire-and-forget: payloads for
    /// channels without subscribers are dropped.
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError>;

    /// Subscribe to a channel. The subscription must be live before this
    /// returns, so no payload published afterwards is missed.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError>;

    /// In one atomic transaction: push `member` to the tail of `list`, add
    /// it to `set`, and publish `payload` on `channel`.
    async fn tx_push_add_publish(
        &self,
        list: &str,
        set: &str,
        member: &str,
        channel: &str,
        payload: &[u8],
    ) -> Result<(), StoreError>;

    /// In one atomic transaction: remove every occurrence of `member` from
    /// `list` and remove it from `set`. Idempotent.
    async fn tx_remove(&self, list: &str, set: &str, member: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_builds_memory_backend() {
        let config = StoreConfig::default();
        assert!(from_config(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_from_config_rejects_unknown_backend() {
        let config = StoreConfig {
            backend: "etcd".to_string(),
            ..StoreConfig::default()
        };
        match from_config(&config).await {
            Err(StoreError::Config(msg)) => assert!(msg.contains("etcd")),
            other => panic!("expected a config error, got {:?}", other.map(|_| ())),
        }
    }
}
