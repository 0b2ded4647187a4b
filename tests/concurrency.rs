//! Registry behaviour under parallel callers on a multi-threaded runtime.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bingo_engine::config::SessionConfig;
use bingo_engine::game::state::SessionError;
use bingo_engine::network::{MemoryResultStore, SessionRegistry};
use bingo_engine::{PlayerId, RegistryError, SessionId};

fn pid(n: u32) -> PlayerId {
    let mut bytes = [0u8; 16];
    bytes[..4].copy_from_slice(&n.to_be_bytes());
    PlayerId::new(bytes)
}

/// Sessions fill but never start during the test.
fn config() -> SessionConfig {
    SessionConfig {
        capacity: 5,
        min_players: 5,
        countdown: Duration::from_secs(600),
        ..SessionConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_joins_never_oversubscribe() {
    let registry = SessionRegistry::start(config(), Arc::new(MemoryResultStore::new()));

    let handles: Vec<_> = (0..23u32)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.join(pid(i), format!("p{i}")).await })
        })
        .collect();

    let mut seats: BTreeMap<SessionId, usize> = BTreeMap::new();
    for handle in handles {
        let seat = handle.await.unwrap().unwrap();
        *seats.entry(seat.result.session_id).or_default() += 1;
    }

    assert!(seats.values().all(|&n| n <= 5), "oversubscribed: {:?}", seats);
    assert_eq!(seats.values().sum::<usize>(), 23);
    // First-fit assignment packs 23 players into exactly five sessions.
    assert_eq!(seats.len(), 5);
    assert_eq!(registry.session_count().await, 5);

    for i in 0..23u32 {
        let sid = registry.session_of(&pid(i)).await.unwrap();
        assert!(seats.contains_key(&sid));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_duplicate_joins_seat_once() {
    let registry = SessionRegistry::start(config(), Arc::new(MemoryResultStore::new()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.join(pid(42), "twin".into()).await })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(RegistryError::Session(SessionError::AlreadyInSession)) => {}
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(registry.session_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_leaves_and_joins_stay_consistent() {
    let registry = SessionRegistry::start(config(), Arc::new(MemoryResultStore::new()));
    let mut seated = Vec::new();
    for i in 0..10u32 {
        let seat = registry.join(pid(i), format!("p{i}")).await.unwrap();
        seated.push((i, seat.result.session_id));
    }

    let leaves = seated.iter().map(|&(i, sid)| {
        let registry = registry.clone();
        tokio::spawn(async move { registry.leave(&sid, &pid(i)).await.map(|_| ()) })
    });
    let joins = (100..110u32).map(|i| {
        let registry = registry.clone();
        tokio::spawn(async move { registry.join(pid(i), format!("p{i}")).await.map(|_| ()) })
    });
    let handles: Vec<_> = leaves.chain(joins).collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for i in 0..10u32 {
        assert!(registry.session_of(&pid(i)).await.is_none());
    }
    let mut seats: BTreeMap<SessionId, usize> = BTreeMap::new();
    for i in 100..110u32 {
        let sid = registry.session_of(&pid(i)).await.unwrap();
        *seats.entry(sid).or_default() += 1;
    }
    assert!(seats.values().all(|&n| n <= 5));
    for (sid, count) in seats {
        assert_eq!(registry.snapshot(&sid).await.unwrap().players.len(), count);
    }
}
