//! Administrative API.
//!
//! `RightsAdmin` is the transport-agnostic surface other services call. It
//! takes loosely-typed requests, validates them, and delegates to the store,
//! the decision engine and the aggregator.

use chrono::{DateTime, Utc};
use rights_core::error::{Error, Result, ValidationError};
use rights_core::id::{ActorId, DecisionId, PolicyId, ProjectId};
use rights_core::types::TargetRef;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::activity::{
    emit_best_effort, ActivityEvent, TracingActivitySink, ENTITY_POLICY, POLICY_EVALUATED,
};
use crate::config::{EngineConfig, StorageConfig};
use crate::engine::{
    DecisionEngine, DecisionLog, InMemoryDecisionLog, PolicyAggregator, RightsSummary,
};
use crate::model::{
    Decision, DecisionFilter, EvaluationRequest, Outcome, Policy, PolicyDraft, PolicyPatch,
};
use crate::store::{InMemoryPolicyStore, PolicyStore, SqliteRightsStore};

/// Result of creating a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPolicy {
    /// The new policy's id.
    pub id: PolicyId,
}

/// An access request as received from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// The kind of resource.
    pub target_type: String,

    /// The resource identifier.
    pub target_id: i64,

    /// The requesting actor.
    pub actor_id: ActorId,

    /// The requested action name.
    pub action: String,

    /// Project context for the activity record.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
}

impl EvaluateRequest {
    /// Validate into a typed request.
    pub fn validate(&self) -> std::result::Result<EvaluationRequest, ValidationError> {
        if self.action.trim().is_empty() {
            return Err(ValidationError::MissingField("action"));
        }

        Ok(EvaluationRequest {
            target: TargetRef::parse(&self.target_type, self.target_id)?,
            actor_id: self.actor_id,
            action: self.action.parse()?,
            project_id: self.project_id,
        })
    }
}

/// The answer to an access request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateResponse {
    /// Whether the action is permitted.
    pub permitted: bool,

    /// The logged outcome.
    pub outcome: Outcome,

    /// The deciding policy, when one matched.
    pub matched_policies: Vec<Policy>,

    /// Human-readable explanation.
    pub rationale: String,

    /// Id of the logged decision.
    pub decision_id: DecisionId,
}

/// Administrative surface over a policy store and decision log.
pub struct RightsAdmin<P, L> {
    engine: DecisionEngine<P, L>,
}

/// An administrative API over whichever backend the configuration selects.
pub type DynRightsAdmin = RightsAdmin<Arc<dyn PolicyStore>, Arc<dyn DecisionLog>>;

impl DynRightsAdmin {
    /// Build the engine described by `config`.
    ///
    /// The SQLite backend serves as policy store, decision log and activity
    /// sink at once. The in-memory backend reports activity to the log.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let engine = match &config.storage {
            StorageConfig::Memory => {
                info!("Using in-memory rights store");
                let policies: Arc<dyn PolicyStore> = Arc::new(InMemoryPolicyStore::new());
                let decisions: Arc<dyn DecisionLog> = Arc::new(InMemoryDecisionLog::new());
                DecisionEngine::new(policies, decisions)
                    .with_activity_sink(Arc::new(TracingActivitySink))
            }
            StorageConfig::Sqlite(sqlite) => {
                let store = Arc::new(SqliteRightsStore::open(sqlite)?);
                let policies: Arc<dyn PolicyStore> = store.clone();
                let decisions: Arc<dyn DecisionLog> = store.clone();
                DecisionEngine::new(policies, decisions).with_activity_sink(store)
            }
        };

        Ok(Self::new(
            engine.with_usage_lock_timeout(config.usage_lock_timeout()),
        ))
    }
}

impl<P, L> RightsAdmin<P, L>
where
    P: PolicyStore,
    L: DecisionLog,
{
    /// Wrap a decision engine.
    pub fn new(engine: DecisionEngine<P, L>) -> Self {
        Self { engine }
    }

    /// The underlying engine.
    pub fn engine(&self) -> &DecisionEngine<P, L> {
        &self.engine
    }

    /// Create a policy.
    ///
    /// A `policy_evaluated` activity entry naming the new policy is recorded
    /// after the policy is stored, attributed to the creator when one is given.
    pub fn create_policy(&self, draft: PolicyDraft) -> Result<CreatedPolicy> {
        let id = self.engine.policies().create_policy(&draft)?;
        info!(policy_id = %id, "Policy created");

        let event = ActivityEvent::new(
            draft.created_by,
            POLICY_EVALUATED,
            ENTITY_POLICY,
            id.value(),
        )
        .in_project(draft.project_id)
        .titled(format!(
            "{} policy for {} on {}:{}",
            draft.policy_type.trim().to_ascii_lowercase(),
            draft.action_type.trim().to_ascii_lowercase(),
            draft.target_type.trim(),
            draft.target_id
        ));
        emit_best_effort(self.engine.activity(), &event);

        Ok(CreatedPolicy { id })
    }

    /// Get a policy.
    ///
    /// # Returns
    ///
    /// * `Ok(Policy)` - The policy.
    /// * `Err(Error::NotFound)` - If it does not exist.
    pub fn get_policy(&self, id: PolicyId) -> Result<Policy> {
        self.engine
            .policies()
            .get_policy(id)?
            .ok_or_else(|| Error::NotFound(format!("policy {}", id)))
    }

    /// List a target's policies.
    pub fn list_policies(&self, target_type: &str, target_id: i64) -> Result<Vec<Policy>> {
        let target = TargetRef::parse(target_type, target_id)?;
        self.engine.policies().list_policies(&target)
    }

    /// Patch a policy. Returns `false` if it does not exist.
    pub fn update_policy(&self, id: PolicyId, patch: &PolicyPatch) -> Result<bool> {
        self.engine.policies().update_policy(id, patch)
    }

    /// Delete a policy. Returns `false` if it does not exist.
    pub fn delete_policy(&self, id: PolicyId) -> Result<bool> {
        self.engine.policies().delete_policy(id)
    }

    /// Evaluate an access request and log the decision.
    pub fn evaluate(&self, request: &EvaluateRequest) -> Result<EvaluateResponse> {
        self.evaluate_at(request, Utc::now())
    }

    /// Evaluate an access request as of `now` and log the decision.
    pub fn evaluate_at(
        &self,
        request: &EvaluateRequest,
        now: DateTime<Utc>,
    ) -> Result<EvaluateResponse> {
        let request = request.validate()?;
        let evaluation = self.engine.evaluate_at(&request, now)?;

        Ok(EvaluateResponse {
            permitted: evaluation.permitted(),
            outcome: evaluation.decision.outcome,
            rationale: evaluation.decision.rationale.clone(),
            decision_id: evaluation.decision.id,
            matched_policies: evaluation.matched_policies,
        })
    }

    /// Summarize the rights attached to a target.
    pub fn rights_summary(&self, target_type: &str, target_id: i64) -> Result<RightsSummary> {
        let target = TargetRef::parse(target_type, target_id)?;
        PolicyAggregator::new(self.engine.policies()).rights_summary(&target)
    }

    /// Query the decision log.
    pub fn decisions(&self, filter: &DecisionFilter) -> Result<Vec<Decision>> {
        self.engine.decisions().list_decisions(filter)
    }
}
