//! Decision engine.
//!
//! This module resolves access requests against the stored policies and
//! records every outcome in the decision log.

use chrono::{DateTime, Utc};
use rights_core::error::Result;
use rights_core::id::ActorId;
use rights_core::types::TargetRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::audit::DecisionLog;
use super::constraints::ConstraintEvaluator;
use super::locks::{UsageKey, UsageLocks};
use crate::activity::{
    emit_best_effort, ActivityEvent, ActivitySink, TracingActivitySink, ENTITY_DECISION,
    POLICY_EVALUATED,
};
use crate::config::DEFAULT_USAGE_LOCK_TIMEOUT_MS;
use crate::model::{
    ActionType, Evaluation, EvaluationRequest, NewDecision, Outcome, Policy, PolicyType,
};
use crate::store::PolicyStore;

/// One step of the precedence walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationTier {
    /// A satisfied prohibition denies.
    Prohibition,

    /// A satisfied permission permits.
    Permission,

    /// Nothing applied.
    DefaultDeny,
}

impl EvaluationTier {
    /// Tiers in the order they are tried. A satisfied prohibition always
    /// beats a satisfied permission.
    pub const PRECEDENCE: [EvaluationTier; 3] =
        [Self::Prohibition, Self::Permission, Self::DefaultDeny];

    /// The policy type examined by this tier, if any.
    pub fn policy_type(&self) -> Option<PolicyType> {
        match self {
            Self::Prohibition => Some(PolicyType::Prohibition),
            Self::Permission => Some(PolicyType::Permission),
            Self::DefaultDeny => None,
        }
    }

    /// The outcome when this tier decides.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Permission => Outcome::Permitted,
            Self::Prohibition | Self::DefaultDeny => Outcome::Denied,
        }
    }
}

impl fmt::Display for EvaluationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prohibition => write!(f, "prohibition"),
            Self::Permission => write!(f, "permission"),
            Self::DefaultDeny => write!(f, "default deny"),
        }
    }
}

/// Decision engine.
///
/// The engine is a stateless coordinator over a policy store and a decision
/// log. Its only state is the usage lock table that keeps `max_uses` exact
/// within one process.
pub struct DecisionEngine<P, L> {
    /// The policy store.
    policies: P,

    /// The decision log.
    decisions: L,

    /// Where evaluation activity is reported.
    activity: Arc<dyn ActivitySink>,

    /// Per-policy, per-actor locks for usage-capped permissions.
    usage_locks: UsageLocks,
}

impl<P, L> DecisionEngine<P, L>
where
    P: PolicyStore,
    L: DecisionLog,
{
    /// Create a new decision engine.
    ///
    /// # Arguments
    ///
    /// * `policies` - The policy store.
    /// * `decisions` - The decision log.
    ///
    /// # Returns
    ///
    /// An engine reporting activity to the log and waiting at most the
    /// default usage lock timeout.
    pub fn new(policies: P, decisions: L) -> Self {
        Self {
            policies,
            decisions,
            activity: Arc::new(TracingActivitySink),
            usage_locks: UsageLocks::new(Duration::from_millis(DEFAULT_USAGE_LOCK_TIMEOUT_MS)),
        }
    }

    /// Report activity to `sink`.
    pub fn with_activity_sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.activity = sink;
        self
    }

    /// Wait at most `timeout` for each usage lock.
    pub fn with_usage_lock_timeout(mut self, timeout: Duration) -> Self {
        self.usage_locks = UsageLocks::new(timeout);
        self
    }

    /// The policy store.
    pub fn policies(&self) -> &P {
        &self.policies
    }

    /// The decision log.
    pub fn decisions(&self) -> &L {
        &self.decisions
    }

    /// The activity sink.
    pub fn activity(&self) -> &dyn ActivitySink {
        self.activity.as_ref()
    }

    /// Evaluate a request now.
    pub fn evaluate(&self, request: &EvaluationRequest) -> Result<Evaluation> {
        self.evaluate_at(request, Utc::now())
    }

    /// Evaluate a request as of `now`.
    ///
    /// Exactly one decision is appended on success. If the store or the log
    /// fails, the error is returned and nothing is recorded.
    ///
    /// # Arguments
    ///
    /// * `request` - The access request.
    /// * `now` - The evaluation instant.
    ///
    /// # Returns
    ///
    /// * `Ok(Evaluation)` - The logged decision and how it was reached.
    /// * `Err(Error::Timeout)` - If a usage lock or the store could not be
    ///   acquired in time.
    /// * `Err(Error::Storage)` - If the store or the log failed.
    pub fn evaluate_at(
        &self,
        request: &EvaluationRequest,
        now: DateTime<Utc>,
    ) -> Result<Evaluation> {
        let candidates = self
            .policies
            .policies_for_action(&request.target, request.action)?;
        debug!(
            policy_target = %request.target,
            action = %request.action,
            actor_id = %request.actor_id,
            candidates = candidates.len(),
            "Evaluating request"
        );

        let keys = usage_keys(&candidates, request.actor_id);
        let evaluation = self
            .usage_locks
            .run_exclusive(keys, || self.decide_and_record(request, &candidates, now))?;

        let decision = &evaluation.decision;
        info!(
            decision_id = %decision.id,
            outcome = %decision.outcome,
            tier = %evaluation.tier,
            "{}",
            decision.rationale
        );

        let event = ActivityEvent::new(
            request.actor_id,
            POLICY_EVALUATED,
            ENTITY_DECISION,
            decision.id.value(),
        )
        .in_project(request.project_id)
        .titled(decision.rationale.clone());
        emit_best_effort(self.activity.as_ref(), &event);

        Ok(evaluation)
    }

    fn decide_and_record(
        &self,
        request: &EvaluationRequest,
        candidates: &[Policy],
        now: DateTime<Utc>,
    ) -> Result<Evaluation> {
        let (tier, matched) = self.resolve(candidates, request.actor_id, now)?;
        let outcome = tier.outcome();

        let decision = self.decisions.append(NewDecision {
            policy_id: matched.map(|policy| policy.id),
            policy_type: matched.map(|policy| policy.policy_type),
            target: request.target.clone(),
            actor_id: request.actor_id,
            action_requested: request.action,
            outcome,
            rationale: rationale(request.action, &request.target, tier, matched),
            evaluated_at: now,
        })?;

        Ok(Evaluation {
            decision,
            tier,
            matched_policies: matched.into_iter().cloned().collect(),
            candidates: candidates.iter().map(|policy| policy.id).collect(),
        })
    }

    /// Walk the precedence tiers and return the first satisfied policy.
    fn resolve<'a>(
        &self,
        candidates: &'a [Policy],
        actor_id: ActorId,
        now: DateTime<Utc>,
    ) -> Result<(EvaluationTier, Option<&'a Policy>)> {
        let prior_grants =
            |policy_id, actor_id| self.decisions.count_permitted(policy_id, actor_id);

        for tier in EvaluationTier::PRECEDENCE {
            let Some(policy_type) = tier.policy_type() else {
                return Ok((tier, None));
            };

            for policy in candidates.iter().filter(|p| p.policy_type == policy_type) {
                if ConstraintEvaluator::satisfied(policy, actor_id, now, prior_grants)? {
                    return Ok((tier, Some(policy)));
                }
            }
        }

        Ok((EvaluationTier::DefaultDeny, None))
    }
}

/// Lock keys for every usage-capped permission among the candidates.
fn usage_keys(candidates: &[Policy], actor_id: ActorId) -> Vec<UsageKey> {
    candidates
        .iter()
        .filter(|policy| {
            policy.policy_type == PolicyType::Permission && policy.constraints.max_uses().is_some()
        })
        .map(|policy| (policy.id, actor_id))
        .collect()
}

/// Fixed-format explanation of a decision.
fn rationale(
    action: ActionType,
    target: &TargetRef,
    tier: EvaluationTier,
    matched: Option<&Policy>,
) -> String {
    match matched {
        Some(policy) => format!(
            "{} on {} {} by {} policy {}",
            action,
            target,
            tier.outcome(),
            policy.policy_type,
            policy.id
        ),
        None => format!(
            "{} on {} denied: no applicable policy (default deny)",
            action, target
        ),
    }
}
