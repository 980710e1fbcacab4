//! In-memory policy store.
//!
//! This module provides an in-memory implementation of the policy store.

use chrono::Utc;
use dashmap::DashMap;
use rights_core::error::Result;
use rights_core::id::PolicyId;
use rights_core::types::TargetRef;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{sort_for_listing, PolicyStore};
use crate::model::{ActionType, Policy, PolicyDraft, PolicyPatch};

/// An in-memory policy store.
#[derive(Clone)]
pub struct InMemoryPolicyStore {
    /// The policies, indexed by ID.
    policies: Arc<DashMap<PolicyId, Policy>>,

    /// The last assigned id.
    last_id: Arc<AtomicI64>,
}

impl InMemoryPolicyStore {
    /// Create a new in-memory policy store.
    pub fn new() -> Self {
        Self {
            policies: Arc::new(DashMap::new()),
            last_id: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Number of stored policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the store holds no policies.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    fn collect_matching<F>(&self, matcher: F) -> Vec<Policy>
    where
        F: Fn(&Policy) -> bool,
    {
        self.policies
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|policy| matcher(policy))
            .collect()
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn create_policy(&self, draft: &PolicyDraft) -> Result<PolicyId> {
        let spec = draft.validate()?;

        // Ids come from a counter, never from the map size, so they are not reused
        let id = PolicyId::new(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        let policy = Policy::from_spec(id, spec, Utc::now());
        debug!(policy_id = %id, policy_target = %policy.target, "Created policy");
        self.policies.insert(id, policy);

        Ok(id)
    }

    fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>> {
        Ok(self.policies.get(&id).map(|entry| entry.value().clone()))
    }

    fn list_policies(&self, target: &TargetRef) -> Result<Vec<Policy>> {
        let mut policies = self.collect_matching(|policy| &policy.target == target);
        sort_for_listing(&mut policies);

        Ok(policies)
    }

    fn policies_for_action(&self, target: &TargetRef, action: ActionType) -> Result<Vec<Policy>> {
        let mut policies = self
            .collect_matching(|policy| &policy.target == target && policy.action_type == action);
        policies.sort_by_key(|policy| policy.id);

        Ok(policies)
    }

    fn update_policy(&self, id: PolicyId, patch: &PolicyPatch) -> Result<bool> {
        let Some(mut entry) = self.policies.get_mut(&id) else {
            return Ok(false);
        };

        // Patch a copy so a rejected patch leaves the stored policy untouched
        let mut updated = entry.value().clone();
        patch.apply(&mut updated, Utc::now())?;
        *entry.value_mut() = updated;
        debug!(policy_id = %id, "Updated policy");

        Ok(true)
    }

    fn delete_policy(&self, id: PolicyId) -> Result<bool> {
        let removed = self.policies.remove(&id).is_some();
        if removed {
            debug!(policy_id = %id, "Deleted policy");
        }

        Ok(removed)
    }
}
