//! Concurrency tests for usage-capped permissions.

use rights_core::id::ActorId;
use rights_core::types::TargetRef;
use rights_policy::*;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 16;
const CALLS_PER_THREAD: usize = 8;

fn burst<P, L>(engine: Arc<DecisionEngine<P, L>>, actor: i64) -> usize
where
    P: PolicyStore + 'static,
    L: DecisionLog + 'static,
{
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let request = EvaluationRequest::new(
                    TargetRef::new("collection", 7),
                    ActorId::new(actor),
                    ActionType::Use,
                );
                (0..CALLS_PER_THREAD)
                    .filter(|_| engine.evaluate(&request).unwrap().permitted())
                    .count()
            })
        })
        .collect();

    handles.into_iter().map(|handle| handle.join().unwrap()).sum()
}

#[test]
fn test_concurrent_burst_grants_exactly_cap_in_memory() {
    let store = InMemoryPolicyStore::new();
    store
        .create_policy(
            &PolicyDraft::new("collection", 7, "permission", "use")
                .with_constraints(json!({"max_uses": 10})),
        )
        .unwrap();
    let engine = Arc::new(DecisionEngine::new(store, InMemoryDecisionLog::new()));

    assert_eq!(burst(Arc::clone(&engine), 5), 10);
    assert_eq!(engine.decisions().len(), THREADS * CALLS_PER_THREAD);
}

#[test]
fn test_concurrent_burst_grants_exactly_cap_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SqliteRightsStore::open(&SqliteConfig::new(dir.path().join("burst.db"))).unwrap(),
    );
    store
        .create_policy(
            &PolicyDraft::new("collection", 7, "permission", "use")
                .with_constraints(json!({"max_uses": 7})),
        )
        .unwrap();
    let engine = Arc::new(DecisionEngine::new(Arc::clone(&store), Arc::clone(&store)));

    assert_eq!(burst(engine, 5), 7);
    let all = store.list_decisions(&DecisionFilter::default()).unwrap();
    assert_eq!(all.len(), THREADS * CALLS_PER_THREAD);
}

#[test]
fn test_caps_are_independent_per_actor() {
    let store = InMemoryPolicyStore::new();
    store
        .create_policy(
            &PolicyDraft::new("collection", 7, "permission", "use")
                .with_constraints(json!({"max_uses": 3})),
        )
        .unwrap();
    let engine = Arc::new(DecisionEngine::new(store, InMemoryDecisionLog::new()));

    let first = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || burst(engine, 1))
    };
    let second = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || burst(engine, 2))
    };

    assert_eq!(first.join().unwrap(), 3);
    assert_eq!(second.join().unwrap(), 3);
}
