//! Per-user session and message relay.
//!
//! A `Session` is owned exclusively by the connection that created it. It
//! exposes the queue operations the presentation layer drives (enqueue,
//! dequeue, presence), the relay operations for an active pairing (send,
//! leave, listen), and the dispatch state machine turning inbound chat
//! events into presentation-facing [`SessionEvent`]s.
//!
//! During an active pairing, `send` publishes straight to the peer's
//! private channel; the queue and lock are not involved. Delivery is
//! at-most-once: if the peer's subscriber is gone, the message is dropped.

use std::sync::Arc;
use tracing::debug;

use stranger_proto::{channel, ChatMsg, ChatMsgKind};

use crate::error::SessionError;
use crate::metrics;
use crate::store::{keys, Store, Subscription};

/// Default Leave notice, matching what peers expect to display verbatim.
const LEAVE_NOTICE: &str = "Stranger has left the chat";

/// What an inbound chat event means to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Paired up; `peer` is the other side's public key.
    Matched {
        /// The peer's public key.
        peer: String,
    },
    /// A chat line from the current peer.
    Message(String),
    /// The peer left. `requeued` reports whether this session already put
    /// itself back in the waiting queue.
    PeerLeft {
        /// Whether auto-requeue re-entered the queue.
        requeued: bool,
    },
    /// A non-fatal error to show the user; no state changed.
    Error(String),
    /// The private channel closed; stop listening and tear down.
    Closed,
}

/// One connected user.
pub struct Session {
    public_key: String,
    peer_key: Option<String>,
    auto_requeue: bool,
    store: Arc<dyn Store>,
    inbox: Subscription,
}

impl Session {
    /// Create a session for `public_key`, subscribing its private channel.
    ///
    /// The subscription is live before this returns, so a Join published
    /// right after an `enqueue` cannot be missed.
    pub async fn connect(
        store: Arc<dyn Store>,
        public_key: impl Into<String>,
        auto_requeue: bool,
    ) -> Result<Self, SessionError> {
        let public_key = public_key.into();
        let inbox = store.subscribe(&channel::user(&public_key)).await?;
        Ok(Self {
            public_key,
            peer_key: None,
            auto_requeue,
            store,
            inbox,
        })
    }

    /// This user's stable external identity.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// The current match, if any.
    pub fn peer_key(&self) -> Option<&str> {
        self.peer_key.as_deref()
    }

    /// Join the waiting queue: one transaction pushes this key to the queue
    /// tail, adds it to the active set, and wakes idle engines.
    ///
    /// On failure the caller must not assume the user is queued.
    pub async fn enqueue(&self) -> Result<(), SessionError> {
        self.store
            .tx_push_add_publish(
                keys::WAIT_QUEUE,
                keys::ACTIVE_SET,
                &self.public_key,
                channel::USER_JOINED,
                self.public_key.as_bytes(),
            )
            .await?;
        metrics::record_enqueue();
        debug!(user = %self.public_key, "enqueued");
        Ok(())
    }

    /// Leave the waiting queue and the active set. Idempotent: a key that
    /// is already gone (matched meanwhile, or never queued) is a no-op.
    pub async fn dequeue(&self) -> Result<(), SessionError> {
        self.store
            .tx_remove(keys::WAIT_QUEUE, keys::ACTIVE_SET, &self.public_key)
            .await?;
        debug!(user = %self.public_key, "dequeued");
        Ok(())
    }

    /// Whether `key` is currently known to the system (waiting or matched).
    pub async fn has_user(&self, key: &str) -> Result<bool, SessionError> {
        Ok(self.store.set_contains(keys::ACTIVE_SET, key).await?)
    }

    /// Publish a message to the current peer's private channel.
    ///
    /// With no peer this succeeds as a no-op: there is nobody to send to.
    /// Fire-and-forget beyond the store accepting the publish.
    pub async fn send(&self, msg: &ChatMsg) -> Result<(), SessionError> {
        let Some(peer) = &self.peer_key else {
            return Ok(());
        };
        let payload = msg.encode()?;
        self.store.publish(&channel::user(peer), &payload).await?;
        metrics::record_relayed();
        Ok(())
    }

    /// Cleanly end the active pairing from this side: notify the peer,
    /// then clear the match.
    pub async fn leave(&mut self) -> Result<(), SessionError> {
        self.send(&ChatMsg::leave(LEAVE_NOTICE)).await?;
        self.peer_key = None;
        Ok(())
    }

    /// Receive exactly one message from this user's private channel.
    ///
    /// Blocks until a message arrives; `Ok(None)` signals the channel is
    /// closed and the caller must stop listening. There is no implicit
    /// loop: callers re-invoke to keep listening. A decode failure is
    /// fatal to that message only.
    pub async fn listen(&mut self) -> Result<Option<ChatMsg>, SessionError> {
        match self.inbox.recv().await {
            None => Ok(None),
            Some(payload) => Ok(Some(ChatMsg::decode(&payload)?)),
        }
    }

    /// Apply one inbound event to the session state machine.
    ///
    /// Join records the sender as peer; Leave clears the peer and, when
    /// auto-requeue is on, immediately re-enters the waiting queue; Error
    /// changes nothing.
    pub async fn dispatch(&mut self, msg: ChatMsg) -> Result<SessionEvent, SessionError> {
        match msg.kind {
            ChatMsgKind::Join => {
                self.peer_key = Some(msg.content.clone());
                Ok(SessionEvent::Matched { peer: msg.content })
            }
            ChatMsgKind::Message => Ok(SessionEvent::Message(msg.content)),
            ChatMsgKind::Leave => {
                self.peer_key = None;
                let requeued = if self.auto_requeue {
                    self.enqueue().await?;
                    true
                } else {
                    false
                };
                Ok(SessionEvent::PeerLeft { requeued })
            }
            ChatMsgKind::Error => Ok(SessionEvent::Error(msg.content)),
        }
    }

    /// Listen for one message and dispatch it: the convenience form the
    /// presentation event loop drives.
    pub async fn next_event(&mut self) -> Result<SessionEvent, SessionError> {
        match self.listen().await? {
            None => Ok(SessionEvent::Closed),
            Some(msg) => self.dispatch(msg).await,
        }
    }
}
