//! Concurrency property tests: many engine instances, one shared store.
//!
//! The distributed lock is the only thing preventing two engines from
//! popping overlapping users. These tests run several engines at once and
//! check that the resulting pairing is a perfect matching: every user gets
//! exactly one peer, pairings are mutual, and nobody is paired with
//! themselves.

mod common;

use common::{expect_event, TestNet};
use std::collections::HashMap;
use strangerd::session::SessionEvent;

#[tokio::test]
async fn test_many_engines_never_double_match() {
    let net = TestNet::start(4);
    let user_count = 20;

    let keys: Vec<String> = (0..user_count).map(|i| format!("user-{i}")).collect();
    let mut sessions = Vec::with_capacity(user_count);
    for key in &keys {
        sessions.push(net.session(key, false).await);
    }

    // Enqueue everyone as fast as possible to maximize contention.
    for session in &sessions {
        session.enqueue().await.expect("enqueue");
    }

    // Everyone gets exactly one Join.
    let mut peer_of: HashMap<String, String> = HashMap::new();
    for session in &mut sessions {
        match expect_event(session).await {
            SessionEvent::Matched { peer } => {
                peer_of.insert(session.public_key().to_string(), peer);
            }
            other => panic!("expected a match, got {other:?}"),
        }
    }

    // The pairing is a perfect matching over distinct users.
    assert_eq!(peer_of.len(), user_count);
    for (user, peer) in &peer_of {
        assert_ne!(user, peer, "{user} was paired with itself");
        assert_eq!(
            peer_of.get(peer),
            Some(user),
            "{user} -> {peer} is not mutual"
        );
    }

    net.shutdown().await;
}

#[tokio::test]
async fn test_odd_user_out_stays_queued() {
    let net = TestNet::start(3);

    let keys: Vec<String> = (0..7).map(|i| format!("user-{i}")).collect();
    let mut sessions = Vec::new();
    for key in &keys {
        sessions.push(net.session(key, false).await);
    }
    for session in &sessions {
        session.enqueue().await.expect("enqueue");
    }

    // Six of seven get matched; exactly one stays in the active set.
    let mut matched = 0;
    let mut events = Vec::new();
    for session in &mut sessions {
        let fut = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            session.next_event(),
        );
        events.push(fut.await);
    }
    for event in &events {
        if let Ok(Ok(SessionEvent::Matched { .. })) = event {
            matched += 1;
        }
    }
    assert_eq!(matched, 6);

    let mut still_waiting = 0;
    for (session, key) in sessions.iter().zip(&keys) {
        if session.has_user(key).await.unwrap() {
            still_waiting += 1;
        }
    }
    assert_eq!(still_waiting, 1);

    net.shutdown().await;
}
