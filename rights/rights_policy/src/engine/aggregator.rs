//! Policy aggregation.
//!
//! This module summarizes the rights attached to a target, the shape used when
//! an item's rights are captured alongside a frozen copy of it.

use rights_core::error::Result;
use rights_core::id::PolicyId;
use rights_core::types::TargetRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{ActionType, PolicyType};
use crate::store::PolicyStore;

/// One policy as it appears in a rights summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RightsEntry {
    /// The policy id.
    pub policy_id: PolicyId,

    /// The kind of rule.
    pub policy_type: PolicyType,

    /// The governed action.
    pub action_type: ActionType,

    /// The constraint document as written.
    pub constraints: Option<Value>,
}

/// Every policy attached to one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RightsSummary {
    /// The summarized target.
    pub target: TargetRef,

    /// All entries, in listing order.
    pub entries: Vec<RightsEntry>,

    /// Entries grouped by policy type, then action.
    pub by_type: BTreeMap<PolicyType, BTreeMap<ActionType, Vec<PolicyId>>>,
}

impl RightsSummary {
    /// Whether the target carries no policies at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of the policies of one type governing one action.
    pub fn policies(&self, policy_type: PolicyType, action: ActionType) -> &[PolicyId] {
        self.by_type
            .get(&policy_type)
            .and_then(|actions| actions.get(&action))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A policy aggregator.
///
/// This aggregator provides read-only views across a target's policies.
pub struct PolicyAggregator<P> {
    /// The policy store.
    policy_store: P,
}

impl<P> PolicyAggregator<P>
where
    P: PolicyStore,
{
    /// Create a new policy aggregator.
    pub fn new(policy_store: P) -> Self {
        Self { policy_store }
    }

    /// Summarize the rights attached to a target.
    ///
    /// # Arguments
    ///
    /// * `target` - The target to summarize.
    ///
    /// # Returns
    ///
    /// * `Ok(RightsSummary)` - The summary, empty if the target has no policies.
    /// * `Err` - If the policies could not be listed.
    pub fn rights_summary(&self, target: &TargetRef) -> Result<RightsSummary> {
        let policies = self.policy_store.list_policies(target)?;

        let mut by_type: BTreeMap<PolicyType, BTreeMap<ActionType, Vec<PolicyId>>> =
            BTreeMap::new();
        let mut entries = Vec::with_capacity(policies.len());
        for policy in policies {
            by_type
                .entry(policy.policy_type)
                .or_default()
                .entry(policy.action_type)
                .or_default()
                .push(policy.id);
            entries.push(RightsEntry {
                policy_id: policy.id,
                policy_type: policy.policy_type,
                action_type: policy.action_type,
                constraints: policy.constraints.document().cloned(),
            });
        }

        Ok(RightsSummary {
            target: target.clone(),
            entries,
            by_type,
        })
    }
}
