//! Integration test common infrastructure.
//!
//! Runs the whole matchmaking system in-process over a shared MemoryStore:
//! real engines, real sessions, no network.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use strangerd::config::MatchmakerConfig;
use strangerd::matchmaker::Matchmaker;
use strangerd::session::{Session, SessionEvent};
use strangerd::store::memory::MemoryStore;
use strangerd::store::Store;

/// An in-process matchmaking network.
pub struct TestNet {
    pub store: Arc<MemoryStore>,
    cancel: CancellationToken,
    engines: Vec<JoinHandle<()>>,
}

impl TestNet {
    /// Start a network with the given number of engine instances.
    pub fn start(engine_count: usize) -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = MatchmakerConfig {
            engines: engine_count,
            lock_ttl_ms: 1000,
            lock_retry_ms: 5,
        };
        let cancel = CancellationToken::new();
        let engines = Matchmaker::spawn_engines(
            Arc::clone(&store) as Arc<dyn Store>,
            &config,
            &cancel,
        );
        Self {
            store,
            cancel,
            engines,
        }
    }

    /// Connect a session for `key`.
    pub async fn session(&self, key: &str, auto_requeue: bool) -> Session {
        Session::connect(Arc::clone(&self.store) as Arc<dyn Store>, key, auto_requeue)
            .await
            .expect("session connects")
    }

    /// Cancel the engines and close the store.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.store.close();
        for engine in self.engines {
            engine.await.expect("engine task exits");
        }
    }
}

/// Wait for the session's next event, with a test deadline.
pub async fn expect_event(session: &mut Session) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), session.next_event())
        .await
        .expect("event within deadline")
        .expect("event decodes")
}
