//! Decision log.
//!
//! This module provides the append-only audit trail of evaluations. The log
//! is also the source of usage counts for `max_uses` constraints.

use dashmap::DashMap;
use parking_lot::RwLock;
use rights_core::error::Result;
use rights_core::id::{ActorId, DecisionId, PolicyId};
use std::sync::Arc;

use crate::model::{Decision, DecisionFilter, NewDecision, Outcome};

/// Trait for the decision log.
pub trait DecisionLog: Send + Sync {
    /// Append a decision, assigning it the next id.
    ///
    /// # Arguments
    ///
    /// * `decision` - The decision to record.
    ///
    /// # Returns
    ///
    /// * `Ok(Decision)` - The recorded decision, with its id.
    /// * `Err` - If the decision could not be recorded.
    fn append(&self, decision: NewDecision) -> Result<Decision>;

    /// Count permitted decisions already recorded for a policy and actor.
    fn count_permitted(&self, policy_id: PolicyId, actor_id: ActorId) -> Result<u64>;

    /// List decisions matching a filter, in id order.
    fn list_decisions(&self, filter: &DecisionFilter) -> Result<Vec<Decision>>;
}

impl<L: DecisionLog + ?Sized> DecisionLog for Arc<L> {
    fn append(&self, decision: NewDecision) -> Result<Decision> {
        (**self).append(decision)
    }

    fn count_permitted(&self, policy_id: PolicyId, actor_id: ActorId) -> Result<u64> {
        (**self).count_permitted(policy_id, actor_id)
    }

    fn list_decisions(&self, filter: &DecisionFilter) -> Result<Vec<Decision>> {
        (**self).list_decisions(filter)
    }
}

/// An in-memory decision log.
#[derive(Clone, Default)]
pub struct InMemoryDecisionLog {
    /// Every decision, in id order.
    entries: Arc<RwLock<Vec<Decision>>>,

    /// Permitted decisions per policy and actor.
    grants: Arc<DashMap<(PolicyId, ActorId), u64>>,
}

impl InMemoryDecisionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded decisions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl DecisionLog for InMemoryDecisionLog {
    fn append(&self, decision: NewDecision) -> Result<Decision> {
        let mut entries = self.entries.write();
        let id = DecisionId::new(entries.len() as i64 + 1);
        let decision = decision.into_decision(id);

        if decision.outcome == Outcome::Permitted {
            if let Some(policy_id) = decision.policy_id {
                *self.grants.entry((policy_id, decision.actor_id)).or_insert(0) += 1;
            }
        }
        entries.push(decision.clone());

        Ok(decision)
    }

    fn count_permitted(&self, policy_id: PolicyId, actor_id: ActorId) -> Result<u64> {
        Ok(self
            .grants
            .get(&(policy_id, actor_id))
            .map(|count| *count)
            .unwrap_or(0))
    }

    fn list_decisions(&self, filter: &DecisionFilter) -> Result<Vec<Decision>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|decision| filter.matches(decision))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionType, PolicyType};
    use chrono::Utc;
    use rights_core::types::TargetRef;

    fn new_decision(policy: Option<i64>, actor: i64, outcome: Outcome) -> NewDecision {
        NewDecision {
            policy_id: policy.map(PolicyId::new),
            policy_type: policy.map(|_| PolicyType::Permission),
            target: TargetRef::new("collection", 7),
            actor_id: ActorId::new(actor),
            action_requested: ActionType::Use,
            outcome,
            rationale: "test".to_string(),
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn test_append_assigns_monotonic_ids() {
        let log = InMemoryDecisionLog::new();
        let first = log.append(new_decision(Some(1), 3, Outcome::Permitted)).unwrap();
        let second = log.append(new_decision(None, 3, Outcome::Denied)).unwrap();

        assert_eq!(first.id, DecisionId::new(1));
        assert_eq!(second.id, DecisionId::new(2));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_count_permitted_ignores_denials() {
        let log = InMemoryDecisionLog::new();
        log.append(new_decision(Some(1), 3, Outcome::Permitted)).unwrap();
        log.append(new_decision(Some(1), 3, Outcome::Permitted)).unwrap();
        log.append(new_decision(Some(1), 3, Outcome::Denied)).unwrap();
        log.append(new_decision(Some(1), 4, Outcome::Permitted)).unwrap();
        log.append(new_decision(Some(2), 3, Outcome::Permitted)).unwrap();

        assert_eq!(log.count_permitted(PolicyId::new(1), ActorId::new(3)).unwrap(), 2);
        assert_eq!(log.count_permitted(PolicyId::new(1), ActorId::new(4)).unwrap(), 1);
        assert_eq!(log.count_permitted(PolicyId::new(9), ActorId::new(3)).unwrap(), 0);
    }

    #[test]
    fn test_list_decisions_filters() {
        let log = InMemoryDecisionLog::new();
        log.append(new_decision(Some(1), 3, Outcome::Permitted)).unwrap();
        log.append(new_decision(None, 3, Outcome::Denied)).unwrap();
        log.append(new_decision(Some(1), 5, Outcome::Permitted)).unwrap();

        let all = log.list_decisions(&DecisionFilter::default()).unwrap();
        assert_eq!(all.len(), 3);

        let actor_three = log
            .list_decisions(&DecisionFilter::default().for_actor(ActorId::new(3)))
            .unwrap();
        let ids: Vec<i64> = actor_three.iter().map(|d| d.id.value()).collect();
        assert_eq!(ids, vec![1, 2]);

        let denied = log
            .list_decisions(&DecisionFilter::default().with_outcome(Outcome::Denied))
            .unwrap();
        assert_eq!(denied.len(), 1);
        assert!(denied[0].policy_id.is_none());
    }
}
