//! Integration tests for the SQLite rights store.

use rights_core::error::Error;
use rights_core::id::{ActorId, PolicyId, ProjectId};
use rights_policy::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn open(dir: &TempDir) -> SqliteRightsStore {
    SqliteRightsStore::open(&SqliteConfig::new(dir.path().join("rights.db"))).unwrap()
}

type SqliteEngine = DecisionEngine<Arc<SqliteRightsStore>, Arc<SqliteRightsStore>>;

fn engine(store: &Arc<SqliteRightsStore>) -> SqliteEngine {
    DecisionEngine::new(Arc::clone(store), Arc::clone(store)).with_activity_sink(store.clone())
}

#[test]
fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = open(&dir);
        store
            .create_policy(
                &PolicyDraft::new("collection", 7, "permission", "use")
                    .with_constraints(json!({"max_uses": 2})),
            )
            .unwrap()
    };

    let store = open(&dir);
    let policy = store.get_policy(id).unwrap().unwrap();
    assert_eq!(policy.constraints.max_uses(), Some(2));
    assert_eq!(store.path(), Some(dir.path().join("rights.db").as_path()));
}

#[test]
fn test_ids_not_reused_after_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let draft = PolicyDraft::new("collection", 7, "permission", "use");

    let first = store.create_policy(&draft).unwrap();
    let second = store.create_policy(&draft).unwrap();
    assert!(store.delete_policy(second).unwrap());
    drop(store);

    let store = open(&dir);
    let third = store.create_policy(&draft).unwrap();
    assert!(third > second);
    assert!(second > first);
}

#[test]
fn test_usage_cap_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let request = EvaluationRequest::new(
        rights_core::types::TargetRef::new("collection", 7),
        ActorId::new(5),
        ActionType::Use,
    );

    {
        let store = Arc::new(open(&dir));
        store
            .create_policy(
                &PolicyDraft::new("collection", 7, "permission", "use")
                    .with_constraints(json!({"max_uses": 1})),
            )
            .unwrap();
        assert!(engine(&store).evaluate(&request).unwrap().permitted());
    }

    let store = Arc::new(open(&dir));
    assert!(!engine(&store).evaluate(&request).unwrap().permitted());
}

#[test]
fn test_decisions_outlive_deleted_policy() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open(&dir));
    let id = store
        .create_policy(&PolicyDraft::new("collection", 7, "prohibition", "display"))
        .unwrap();

    let request = EvaluationRequest::new(
        rights_core::types::TargetRef::new("collection", 7),
        ActorId::new(3),
        ActionType::Display,
    )
    .in_project(ProjectId::new(9));
    let evaluation = engine(&store).evaluate(&request).unwrap();
    assert!(!evaluation.permitted());

    assert!(store.delete_policy(id).unwrap());
    let history = store
        .list_decisions(&DecisionFilter::default().for_policy(id))
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, evaluation.decision.id);
    assert_eq!(history[0].policy_type, Some(PolicyType::Prohibition));

    let activity = store.list_activity().unwrap();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].entity_id, evaluation.decision.id.value());
    assert_eq!(activity[0].project_id, Some(ProjectId::new(9)));
}

#[test]
fn test_admin_over_sqlite_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::default().with_sqlite_path(dir.path().join("admin.db"));
    let admin = DynRightsAdmin::open(&config).unwrap();

    let created = admin
        .create_policy(
            PolicyDraft::new("collection", 7, "permission", "reproduce")
                .created_by(ActorId::new(1)),
        )
        .unwrap();
    let response = admin
        .evaluate(&EvaluateRequest {
            target_type: "collection".to_string(),
            target_id: 7,
            actor_id: ActorId::new(3),
            action: "reproduce".to_string(),
            project_id: None,
        })
        .unwrap();

    assert!(response.permitted);
    assert_eq!(response.matched_policies[0].id, created.id);
    assert!(matches!(
        admin.get_policy(PolicyId::new(created.id.value() + 1)),
        Err(Error::NotFound(_))
    ));
}
