//! Redis store backend.
//!
//! The shared-store deployment: every strangerd process points at the same
//! Redis, so queue, active set, lock lease, and pub/sub are visible across
//! process boundaries. Check-and-act operations run as Lua scripts server
//! side; the multi-key transactions use MULTI/EXEC pipelines.

use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::Script;
use std::time::Duration;
use tokio::sync::mpsc;

use async_trait::async_trait;

use super::{Store, Subscription};
use crate::error::StoreError;

/// Delete the key only if it still holds the caller's token. Running this
/// server-side closes the read/delete race against a concurrent acquirer.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Reset the key's expiry only if it still holds the caller's token.
const COMPARE_AND_EXTEND: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("pexpire", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Multi-process coordination store backed by Redis.
pub struct RedisStore {
    client: redis::Client,
    conn: MultiplexedConnection,
    cad: Script,
    cae: Script,
}

impl RedisStore {
    /// Connect to the Redis instance at `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self {
            client,
            conn,
            cad: Script::new(COMPARE_AND_DELETE),
            cae: Script::new(COMPARE_AND_EXTEND),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is invalid; round sub-millisecond leases up.
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl Store for RedisStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let deleted: i64 = self
            .cad
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let extended: i64 = self
            .cae
            .key(key)
            .arg(token)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn list_pop_front(&self, list: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        let value: Option<String> = redis::cmd("LPOP").arg(list).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn list_push_front(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = redis::cmd("LPUSH")
            .arg(list)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        let len: usize = redis::cmd("LLEN").arg(list).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn set_contains(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let is_member: bool = redis::cmd("SISMEMBER")
            .arg(set)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(is_member)
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = redis::cmd("SREM")
            .arg(set)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        // Pub/sub needs its own connection; the multiplexed one cannot
        // enter subscriber mode.
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let channel = channel.to_string();
        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                if tx.send(msg.get_payload_bytes().to_vec()).is_err() {
                    break;
                }
            }
            tracing::debug!(channel = %channel, "pubsub reader finished");
        });
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
        let mut conn = self.conn();
        let _: () = redis::pipe()
            .atomic()
            .cmd("RPUSH")
            .arg(list)
            .arg(member)
            .ignore()
            .cmd("SADD")
            .arg(set)
            .arg(member)
            .ignore()
            .cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn tx_remove(&self, list: &str, set: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(list)
            .arg(0)
            .arg(member)
            .ignore()
            .cmd("SREM")
            .arg(set)
            .arg(member)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
