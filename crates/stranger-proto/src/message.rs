//! Chat message types and their MessagePack codec.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Kind of a chat event, with wire values pinned.
///
/// The integer values are part of the wire contract and must never change:
/// 0 = Message, 1 = Join, 2 = Leave, 3 = Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatMsgKind {
    /// Free-text chat line from the current peer.
    Message,
    /// Pairing established; the content carries the peer's public key.
    Join,
    /// The peer left the chat.
    Leave,
    /// A non-fatal error to surface to the user.
    Error,
}

impl ChatMsgKind {
    /// Wire value of this kind.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Message => 0,
            Self::Join => 1,
            Self::Leave => 2,
            Self::Error => 3,
        }
    }

    /// Parse a wire value back into a kind.
    pub fn from_u8(value: u8) -> Result<Self, ProtoError> {
        match value {
            0 => Ok(Self::Message),
            1 => Ok(Self::Join),
            2 => Ok(Self::Leave),
            3 => Ok(Self::Error),
            other => Err(ProtoError::UnknownKind(other)),
        }
    }
}

/// One chat event, constructed once per occurrence and immutable after.
///
/// How `content` is interpreted depends entirely on `kind`: free text for
/// `Message`/`Leave`/`Error`, the peer's public key for `Join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMsg {
    /// What happened.
    pub kind: ChatMsgKind,
    /// Kind-dependent payload.
    pub content: String,
}

/// The record as it appears on the wire. Kept separate from [`ChatMsg`] so
/// the enum discriminants stay pinned no matter how the Rust enum evolves.
#[derive(Serialize, Deserialize)]
struct WireMsg {
    kind: u8,
    content: String,
}

impl ChatMsg {
    /// Construct a new event.
    pub fn new(kind: ChatMsgKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    /// A free-text chat line.
    pub fn message(content: impl Into<String>) -> Self {
        Self::new(ChatMsgKind::Message, content)
    }

    /// A pairing notification carrying the peer's public key.
    pub fn join(peer_key: impl Into<String>) -> Self {
        Self::new(ChatMsgKind::Join, peer_key)
    }

    /// A departure notification.
    pub fn leave(content: impl Into<String>) -> Self {
        Self::new(ChatMsgKind::Leave, content)
    }

    /// A user-visible error.
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(ChatMsgKind::Error, content)
    }

    /// Encode for cross-process transport.
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        let wire = WireMsg {
            kind: self.kind.as_u8(),
            content: self.content.clone(),
        };
        Ok(rmp_serde::to_vec(&wire)?)
    }

    /// Decode a record received from another process.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        let wire: WireMsg = rmp_serde::from_slice(bytes)?;
        Ok(Self {
            kind: ChatMsgKind::from_u8(wire.kind)?,
            content: wire.content,
        })
    }
}
