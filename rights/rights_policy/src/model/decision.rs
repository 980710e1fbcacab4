//! Decision model.
//!
//! This module defines the records produced by evaluating an access request.

use chrono::{DateTime, Utc};
use rights_core::id::{ActorId, DecisionId, PolicyId, ProjectId};
use rights_core::types::TargetRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::engine::EvaluationTier;
use crate::model::{ActionType, Policy, PolicyType};

/// The outcome of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The action is permitted.
    Permitted,

    /// The action is denied.
    Denied,
}

impl Outcome {
    /// The stored name of this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permitted => "permitted",
            Self::Denied => "denied",
        }
    }

    /// Whether this outcome permits the action.
    pub fn is_permitted(&self) -> bool {
        matches!(self, Self::Permitted)
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permitted" => Ok(Self::Permitted),
            "denied" => Ok(Self::Denied),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision about to be appended to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDecision {
    /// The deciding policy, if any.
    pub policy_id: Option<PolicyId>,

    /// Snapshot of the deciding policy's type.
    pub policy_type: Option<PolicyType>,

    /// The target evaluated against.
    pub target: TargetRef,

    /// The requesting actor.
    pub actor_id: ActorId,

    /// The requested action.
    pub action_requested: ActionType,

    /// The outcome.
    pub outcome: Outcome,

    /// Human-readable explanation.
    pub rationale: String,

    /// When the evaluation happened.
    pub evaluated_at: DateTime<Utc>,
}

impl NewDecision {
    /// Attach the id assigned by the log.
    pub fn into_decision(self, id: DecisionId) -> Decision {
        Decision {
            id,
            policy_id: self.policy_id,
            policy_type: self.policy_type,
            target: self.target,
            actor_id: self.actor_id,
            action_requested: self.action_requested,
            outcome: self.outcome,
            rationale: self.rationale,
            evaluated_at: self.evaluated_at,
        }
    }
}

/// A logged decision. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Monotonic decision id.
    pub id: DecisionId,

    /// The deciding policy, `None` for a default deny.
    pub policy_id: Option<PolicyId>,

    /// Snapshot of the deciding policy's type. Survives deletion of the policy.
    pub policy_type: Option<PolicyType>,

    /// The target evaluated against.
    #[serde(flatten)]
    pub target: TargetRef,

    /// The requesting actor.
    pub actor_id: ActorId,

    /// The requested action.
    pub action_requested: ActionType,

    /// The outcome.
    pub outcome: Outcome,

    /// Human-readable explanation.
    pub rationale: String,

    /// When the evaluation happened.
    pub evaluated_at: DateTime<Utc>,
}

/// Query over the decision log. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionFilter {
    /// Only decisions made by this policy.
    #[serde(default)]
    pub policy_id: Option<PolicyId>,

    /// Only decisions for this actor.
    #[serde(default)]
    pub actor_id: Option<ActorId>,

    /// Only decisions with this outcome.
    #[serde(default)]
    pub outcome: Option<Outcome>,
}

impl DecisionFilter {
    /// Restrict to one policy.
    pub fn for_policy(mut self, policy_id: PolicyId) -> Self {
        self.policy_id = Some(policy_id);
        self
    }

    /// Restrict to one actor.
    pub fn for_actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Restrict to one outcome.
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Check a decision against this filter.
    pub fn matches(&self, decision: &Decision) -> bool {
        self.policy_id.map_or(true, |id| decision.policy_id == Some(id))
            && self.actor_id.map_or(true, |id| decision.actor_id == id)
            && self.outcome.map_or(true, |outcome| decision.outcome == outcome)
    }
}

/// A typed access request.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    /// The target.
    pub target: TargetRef,

    /// The requesting actor.
    pub actor_id: ActorId,

    /// The requested action.
    pub action: ActionType,

    /// Project context for the activity record.
    pub project_id: Option<ProjectId>,
}

impl EvaluationRequest {
    /// Create a request without project context.
    pub fn new(target: TargetRef, actor_id: ActorId, action: ActionType) -> Self {
        Self {
            target,
            actor_id,
            action,
            project_id: None,
        }
    }

    /// Attach project context.
    pub fn in_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

/// The full result of one evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The logged decision.
    pub decision: Decision,

    /// The tier that decided.
    pub tier: EvaluationTier,

    /// The deciding policy, when one matched.
    pub matched_policies: Vec<Policy>,

    /// Every candidate policy considered, in stored order.
    pub candidates: Vec<PolicyId>,
}

impl Evaluation {
    /// Whether the action was permitted.
    pub fn permitted(&self) -> bool {
        self.decision.outcome.is_permitted()
    }

    /// The decision rationale.
    pub fn rationale(&self) -> &str {
        &self.decision.rationale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(id: i64, policy: Option<i64>, actor: i64, outcome: Outcome) -> Decision {
        Decision {
            id: DecisionId::new(id),
            policy_id: policy.map(PolicyId::new),
            policy_type: policy.map(|_| PolicyType::Permission),
            target: TargetRef::new("collection", 7),
            actor_id: ActorId::new(actor),
            action_requested: ActionType::Use,
            outcome,
            rationale: String::new(),
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn test_outcome_parse() {
        assert_eq!("Permitted".parse::<Outcome>(), Ok(Outcome::Permitted));
        assert_eq!("denied".parse::<Outcome>(), Ok(Outcome::Denied));
        assert!("maybe".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_filter_matches() {
        let granted = decision(1, Some(4), 3, Outcome::Permitted);
        let default_deny = decision(2, None, 3, Outcome::Denied);

        assert!(DecisionFilter::default().matches(&granted));
        assert!(DecisionFilter::default().matches(&default_deny));

        let by_policy = DecisionFilter::default().for_policy(PolicyId::new(4));
        assert!(by_policy.matches(&granted));
        assert!(!by_policy.matches(&default_deny));

        let by_actor = DecisionFilter::default()
            .for_actor(ActorId::new(3))
            .with_outcome(Outcome::Denied);
        assert!(!by_actor.matches(&granted));
        assert!(by_actor.matches(&default_deny));
    }

    #[test]
    fn test_decision_serialization() {
        let value = serde_json::to_value(decision(1, None, 3, Outcome::Denied)).unwrap();
        assert_eq!(value["outcome"], "denied");
        assert_eq!(value["target_type"], "collection");
        assert!(value["policy_id"].is_null());
    }
}
