//! Integration tests for policy evaluation.

use chrono::{Duration, TimeZone, Utc};
use rights_core::id::{ActorId, PolicyId};
use rights_core::types::TargetRef;
use rights_policy::*;
use serde_json::json;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

// Initialize tracing for tests
fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

type Engine = DecisionEngine<InMemoryPolicyStore, InMemoryDecisionLog>;

fn engine() -> Engine {
    init_tracing();
    DecisionEngine::new(InMemoryPolicyStore::new(), InMemoryDecisionLog::new())
}

fn collection() -> TargetRef {
    TargetRef::new("collection", 7)
}

fn add(engine: &Engine, policy_type: &str, constraints: serde_json::Value) -> PolicyId {
    engine
        .policies()
        .create_policy(
            &PolicyDraft::new("collection", 7, policy_type, "use").with_constraints(constraints),
        )
        .unwrap()
}

fn use_by(actor: i64) -> EvaluationRequest {
    EvaluationRequest::new(collection(), ActorId::new(actor), ActionType::Use)
}

#[test]
fn test_unconstrained_permission_scenario() {
    let engine = engine();
    let permission = add(&engine, "permission", json!({}));

    let evaluation = engine.evaluate(&use_by(3)).unwrap();
    assert!(evaluation.permitted());
    let matched: Vec<PolicyId> = evaluation.matched_policies.iter().map(|p| p.id).collect();
    assert_eq!(matched, vec![permission]);
}

#[test]
fn test_targeted_prohibition_scenario() {
    let engine = engine();
    add(&engine, "permission", json!({}));
    let prohibition = add(&engine, "prohibition", json!({"actor_ids": [3]}));

    let evaluation = engine.evaluate(&use_by(3)).unwrap();
    assert!(!evaluation.permitted());
    assert_eq!(evaluation.tier, EvaluationTier::Prohibition);
    assert_eq!(evaluation.matched_policies.len(), 1);
    assert_eq!(evaluation.matched_policies[0].id, prohibition);
    assert_eq!(evaluation.decision.policy_type, Some(PolicyType::Prohibition));
}

#[test]
fn test_single_use_scenario() {
    let engine = engine();
    let permission = add(&engine, "permission", json!({"max_uses": 1}));

    let first = engine.evaluate(&use_by(5)).unwrap();
    let second = engine.evaluate(&use_by(5)).unwrap();

    assert!(first.permitted());
    assert_eq!(first.decision.policy_id, Some(permission));
    assert!(!second.permitted());
    assert_eq!(second.tier, EvaluationTier::DefaultDeny);
}

#[test]
fn test_nth_plus_one_call_denied() {
    let engine = engine();
    add(&engine, "permission", json!({"max_uses": 3}));

    let outcomes: Vec<bool> = (0..5)
        .map(|_| engine.evaluate(&use_by(8)).unwrap().permitted())
        .collect();
    assert_eq!(outcomes, vec![true, true, true, false, false]);
}

#[test]
fn test_no_policies_for_action_denies() {
    let engine = engine();
    engine
        .policies()
        .create_policy(&PolicyDraft::new("collection", 7, "permission", "modify"))
        .unwrap();

    let evaluation = engine.evaluate(&use_by(3)).unwrap();
    assert!(!evaluation.permitted());
    assert!(evaluation.matched_policies.is_empty());
    assert!(evaluation.candidates.is_empty());
    assert_eq!(evaluation.decision.policy_id, None);
}

#[test]
fn test_validity_window_gates_permission() {
    let engine = engine();
    add(
        &engine,
        "permission",
        json!({"valid_from": "2024-01-01", "valid_to": "2024-01-31"}),
    );

    let inside = Utc.with_ymd_and_hms(2024, 1, 31, 18, 0, 0).unwrap();
    let before = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
    let after = inside + Duration::days(1);

    assert!(engine.evaluate_at(&use_by(1), inside).unwrap().permitted());
    assert!(!engine.evaluate_at(&use_by(1), before).unwrap().permitted());
    assert!(!engine.evaluate_at(&use_by(1), after).unwrap().permitted());
}

#[test]
fn test_unsatisfied_prohibition_falls_through() {
    let engine = engine();
    add(&engine, "prohibition", json!({"valid_to": "2000-01-01"}));
    let permission = add(&engine, "permission", json!({}));

    let evaluation = engine.evaluate(&use_by(3)).unwrap();
    assert!(evaluation.permitted());
    assert_eq!(evaluation.decision.policy_id, Some(permission));
}

#[test]
fn test_every_evaluation_logs_exactly_one_decision() {
    let engine = engine();
    add(&engine, "permission", json!({"actor_ids": [1]}));

    for actor in 0..6 {
        engine.evaluate(&use_by(actor)).unwrap();
    }
    assert_eq!(engine.decisions().len(), 6);

    let permitted = engine
        .decisions()
        .list_decisions(&DecisionFilter::default().with_outcome(Outcome::Permitted))
        .unwrap();
    assert_eq!(permitted.len(), 1);
    assert_eq!(permitted[0].actor_id, ActorId::new(1));
}

#[test]
fn test_deleted_policy_decisions_retained() {
    let engine = engine();
    let permission = add(&engine, "permission", json!({}));
    engine.evaluate(&use_by(3)).unwrap();

    assert!(engine.policies().delete_policy(permission).unwrap());

    let history = engine
        .decisions()
        .list_decisions(&DecisionFilter::default().for_policy(permission))
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].policy_type, Some(PolicyType::Permission));
    assert!(!engine.evaluate(&use_by(3)).unwrap().permitted());
}

#[test]
fn test_updated_policy_takes_effect() {
    let engine = engine();
    let policy = add(&engine, "permission", json!({}));

    let patch = PolicyPatch {
        policy_type: Some("prohibition".to_string()),
        ..PolicyPatch::default()
    };
    assert!(engine.policies().update_policy(policy, &patch).unwrap());

    let evaluation = engine.evaluate(&use_by(3)).unwrap();
    assert_eq!(evaluation.tier, EvaluationTier::Prohibition);
}

#[test]
fn test_evaluation_activity_carries_project() {
    let sink = InMemoryActivitySink::new();
    let engine = engine().with_activity_sink(Arc::new(sink.clone()));
    add(&engine, "permission", json!({}));

    engine
        .evaluate(&use_by(3).in_project(rights_core::id::ProjectId::new(4)))
        .unwrap();
    engine.evaluate(&use_by(3)).unwrap();

    let projects: Vec<_> = sink.events().iter().map(|event| event.project_id).collect();
    assert_eq!(projects, vec![Some(rights_core::id::ProjectId::new(4)), None]);
}
