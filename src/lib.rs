//! strangerd - distributed matchmaking and message relay for anonymous chat.
//!
//! Multiple independent server processes share one coordination store. Each
//! process hosts user sessions plus one or more matchmaking engines; the
//! engines pop waiting users off a shared FIFO queue under a token-guarded
//! TTL lock and wire matched pairs together over per-user pub/sub channels.

pub mod config;
pub mod error;
pub mod http;
pub mod lock;
pub mod matchmaker;
pub mod metrics;
pub mod session;
pub mod store;

pub use config::Config;
pub use error::{LockError, SessionError, StoreError};
pub use lock::MatchLock;
pub use matchmaker::Matchmaker;
pub use session::{Session, SessionEvent};
pub use store::{Store, Subscription};
