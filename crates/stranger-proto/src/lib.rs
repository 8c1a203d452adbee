//! # stranger-proto
//!
//! Wire format and naming conventions shared by every strangerd process.
//!
//! Chat events travel between processes as MessagePack-encoded [`ChatMsg`]
//! records published on per-user channels. This crate pins the encoding
//! (including the integer values of [`ChatMsgKind`]) and the channel names,
//! so that independently deployed daemons interoperate.
//!
//! ## Quick Start
//!
//! ```rust
//! use stranger_proto::{ChatMsg, channel};
//!
//! let msg = ChatMsg::message("hello there");
//! let bytes = msg.encode().expect("encodable");
//! let back = ChatMsg::decode(&bytes).expect("round-trips");
//! assert_eq!(msg, back);
//!
//! // Messages for a given user are published on a deterministic channel.
//! assert_eq!(channel::user("abc123"), "user:abc123");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod channel;
pub mod error;
pub mod message;

pub use self::error::ProtoError;
pub use self::message::{ChatMsg, ChatMsgKind};
