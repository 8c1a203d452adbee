//! In-memory store backend.
//!
//! Serves single-process deployments and the test suite. One mutex over the
//! keyspace gives every operation, including the multi-key transactions,
//! the same atomicity the redis backend gets from MULTI/EXEC and scripts.
//! Lock leases expire lazily: an expired lease is treated as absent by the
//! next operation that touches its key.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use async_trait::async_trait;

use super::{Store, Subscription};
use crate::error::StoreError;

/// An expiring key holding a lock token.
struct Lease {
    token: String,
    deadline: Instant,
}

impl Lease {
    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[derive(Default)]
struct Keyspace {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    leases: HashMap<String, Lease>,
}

/// Single-process coordination store.
#[derive(Default)]
pub struct MemoryStore {
    keyspace: Mutex<Keyspace>,
    subscribers: DashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every subscriber, so blocked listeners observe closure.
    pub fn close(&self) {
        self.subscribers.clear();
    }

    /// Deliver a payload to a channel's live subscribers, pruning dead ones.
    fn fan_out(&self, channel: &str, payload: &[u8]) {
        if let Some(mut senders) = self.subscribers.get_mut(channel) {
            senders.retain(|tx| tx.send(payload.to_vec()).is_ok());
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut ks = self.keyspace.lock();
        let held = ks.leases.get(key).map_or(false, |l| !l.expired());
        if held {
            return Ok(false);
        }
        ks.leases.insert(
            key.to_string(),
            Lease {
                token: value.to_string(),
                deadline: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        let mut ks = self.keyspace.lock();
        let owned = ks
            .leases
            .get(key)
            .map_or(false, |l| !l.expired() && l.token == token);
        if owned {
            ks.leases.remove(key);
        }
        Ok(owned)
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut ks = self.keyspace.lock();
        match ks.leases.get_mut(key) {
            Some(lease) if !lease.expired() && lease.token == token => {
                lease.deadline = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_pop_front(&self, list: &str) -> Result<Option<String>, StoreError> {
        let mut ks = self.keyspace.lock();
        Ok(ks.lists.get_mut(list).and_then(|l| l.pop_front()))
    }

    async fn list_push_front(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let mut ks = self.keyspace.lock();
        ks.lists
            .entry(list.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        let ks = self.keyspace.lock();
        Ok(ks.lists.get(list).map_or(0, |l| l.len()))
    }

    async fn set_contains(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let ks = self.keyspace.lock();
        Ok(ks.sets.get(set).is_some_and(|s| s.contains(member)))
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut ks = self.keyspace.lock();
        if let Some(s) = ks.sets.get_mut(set) {
            s.remove(member);
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError> {
        self.fan_out(channel, payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription::new(rx))
    }

    async fn tx_push_add_publish(
        &self,
        list: &str,
        set: &str,
        member: &str,
        channel: &str,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        {
            let mut ks = self.keyspace.lock();
            ks.lists
                .entry(list.to_string())
                .or_default()
                .push_back(member.to_string());
            ks.sets
                .entry(set.to_string())
                .or_default()
                .insert(member.to_string());
        }
        // Publish after the keyspace mutation commits, like EXEC does.
        self.fan_out(channel, payload);
        Ok(())
    }

    async fn tx_remove(&self, list: &str, set: &str, member: &str) -> Result<(), StoreError> {
        let mut ks = self.keyspace.lock();
        if let Some(l) = ks.lists.get_mut(list) {
            l.retain(|v| v != member);
        }
        if let Some(s) = ks.sets.get_mut(set) {
            s.remove(member);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;

    #[tokio::test]
    async fn test_set_nx_ex_respects_existing_lease() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);
        assert!(store.set_nx_ex(keys::MATCH_LOCK, "a", ttl).await.unwrap());
        assert!(!store.set_nx_ex(keys::MATCH_LOCK, "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_is_absent() {
        let store = MemoryStore::new();
        let ttl = Duration::from_millis(10);
        assert!(store.set_nx_ex(keys::MATCH_LOCK, "a", ttl).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Expired lease no longer blocks a new holder, nor can the old
        // holder delete or extend it.
        assert!(!store.compare_and_delete(keys::MATCH_LOCK, "a").await.unwrap());
        assert!(
            !store
                .compare_and_extend(keys::MATCH_LOCK, "a", ttl)
                .await
                .unwrap()
        );
        assert!(store.set_nx_ex(keys::MATCH_LOCK, "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete_requires_matching_token() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);
        store.set_nx_ex("k", "mine", ttl).await.unwrap();
        assert!(!store.compare_and_delete("k", "theirs").await.unwrap());
        assert!(store.compare_and_delete("k", "mine").await.unwrap());
        // Second delete finds nothing.
        assert!(!store.compare_and_delete("k", "mine").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_fifo_order() {
        let store = MemoryStore::new();
        for key in ["a", "b", "c"] {
            store
                .tx_push_add_publish(keys::WAIT_QUEUE, keys::ACTIVE_SET, key, "ch", b"n")
                .await
                .unwrap();
        }
        assert_eq!(store.list_len(keys::WAIT_QUEUE).await.unwrap(), 3);
        assert_eq!(
            store.list_pop_front(keys::WAIT_QUEUE).await.unwrap(),
            Some("a".to_string())
        );
        assert_eq!(
            store.list_pop_front(keys::WAIT_QUEUE).await.unwrap(),
            Some("b".to_string())
        );
    }

    #[tokio::test]
    async fn test_push_front_restores_queue_head() {
        let store = MemoryStore::new();
        store
            .tx_push_add_publish(keys::WAIT_QUEUE, keys::ACTIVE_SET, "x", "ch", b"n")
            .await
            .unwrap();
        let popped = store.list_pop_front(keys::WAIT_QUEUE).await.unwrap().unwrap();
        store
            .list_push_front(keys::WAIT_QUEUE, &popped)
            .await
            .unwrap();
        assert_eq!(
            store.list_pop_front(keys::WAIT_QUEUE).await.unwrap(),
            Some("x".to_string())
        );
    }

    #[tokio::test]
    async fn test_tx_remove_is_idempotent() {
        let store = MemoryStore::new();
        store
            .tx_push_add_publish(keys::WAIT_QUEUE, keys::ACTIVE_SET, "x", "ch", b"n")
            .await
            .unwrap();
        store
            .tx_remove(keys::WAIT_QUEUE, keys::ACTIVE_SET, "x")
            .await
            .unwrap();
        assert!(!store.set_contains(keys::ACTIVE_SET, "x").await.unwrap());
        // Removing again is a no-op, not an error.
        store
            .tx_remove(keys::WAIT_QUEUE, keys::ACTIVE_SET, "x")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pub_sub_delivery_and_closure() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("ch").await.unwrap();
        store.publish("ch", b"one").await.unwrap();
        store.publish("ch", b"two").await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), b"one");
        assert_eq!(sub.recv().await.unwrap(), b"two");

        store.close();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let store = MemoryStore::new();
        // At-most-once: nobody listening means the payload is gone.
        store.publish("nowhere", b"lost").await.unwrap();
        let mut sub = store.subscribe("nowhere").await.unwrap();
        store.publish("nowhere", b"kept").await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), b"kept");
    }
}
