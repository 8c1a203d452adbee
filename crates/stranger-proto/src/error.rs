//! Error types for wire encoding and decoding.

use thiserror::Error;

/// Errors produced while encoding or decoding a [`crate::ChatMsg`].
#[derive(Debug, Error)]
pub enum ProtoError {
    /// MessagePack serialization failed.
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization failed.
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The wire record carried a message kind this version does not know.
    #[error("unknown message kind: {0}")]
    UnknownKind(u8),
}
