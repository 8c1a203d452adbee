//! Unified error handling for strangerd.
//!
//! Store failures are transient by design: the matchmaking loop retries
//! them, sessions surface them to the presentation layer as non-fatal
//! messages. Nothing in here terminates a healthy, unrelated session.

use thiserror::Error;

// ============================================================================
// Store Errors (shared coordination store)
// ============================================================================

/// Errors surfaced by a coordination store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store configuration is invalid; refusing to start.
    #[error("invalid store configuration: {0}")]
    Config(String),

    /// The store connection failed or a transaction could not commit.
    #[error("store transport error: {0}")]
    Transport(String),

    /// Redis backend failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store has been shut down.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Transport(_) => "transport",
            Self::Redis(_) => "redis",
            Self::Closed => "closed",
        }
    }
}

// ============================================================================
// Lock Errors (distributed lock)
// ============================================================================

/// Errors from the distributed match lock.
///
/// Contention is not an error (acquire retries until it wins) and
/// stale-token release/extend are absorbed as no-ops, so the only way out
/// of `acquire` besides success is cancellation.
#[derive(Debug, Error)]
pub enum LockError {
    /// The caller cancelled the acquisition wait.
    #[error("lock acquisition cancelled")]
    Cancelled,
}

// ============================================================================
// Session Errors (user-facing operations)
// ============================================================================

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying store operation failed. The user must not assume the
    /// operation took effect (e.g. not queued after a failed enqueue).
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    /// A single inbound message could not be decoded. Fatal to that message
    /// only; the caller should keep listening.
    #[error("message codec error: {0}")]
    Codec(#[from] stranger_proto::ProtoError),
}

impl SessionError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_code(),
            Self::Codec(_) => "codec",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_codes() {
        assert_eq!(StoreError::Config("x".into()).error_code(), "config");
        assert_eq!(StoreError::Transport("x".into()).error_code(), "transport");
        assert_eq!(StoreError::Closed.error_code(), "closed");
    }

    #[test]
    fn test_session_error_code_passes_through_store_code() {
        let e = SessionError::Store(StoreError::Closed);
        assert_eq!(e.error_code(), "closed");

        let e = SessionError::Codec(stranger_proto::ProtoError::UnknownKind(9));
        assert_eq!(e.error_code(), "codec");
    }
}
