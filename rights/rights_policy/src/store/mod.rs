//! Policy storage.
//!
//! This module provides storage for policies.

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryPolicyStore;
pub use sqlite::SqliteRightsStore;

use rights_core::error::Result;
use rights_core::id::PolicyId;
use rights_core::types::TargetRef;
use std::sync::Arc;

use crate::model::{ActionType, Policy, PolicyDraft, PolicyPatch};

/// Trait for policy storage.
///
/// A policy store is responsible for storing and retrieving policies.
pub trait PolicyStore: Send + Sync {
    /// Validate a draft and store it as a new policy.
    ///
    /// # Arguments
    ///
    /// * `draft` - The policy to create.
    ///
    /// # Returns
    ///
    /// * `Ok(PolicyId)` - The newly assigned, never reused, policy id.
    /// * `Err(Error::Validation)` - If the draft names an unknown type or action,
    ///   or has no target type.
    fn create_policy(&self, draft: &PolicyDraft) -> Result<PolicyId>;

    /// Get a policy by id.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Policy))` - The policy.
    /// * `Ok(None)` - If no such policy exists.
    fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>>;

    /// List every policy attached to a target, ordered by policy type name,
    /// then action type name, then id.
    fn list_policies(&self, target: &TargetRef) -> Result<Vec<Policy>>;

    /// List the policies governing one action on a target, in id order.
    ///
    /// This is the candidate lookup used by the decision engine.
    fn policies_for_action(&self, target: &TargetRef, action: ActionType) -> Result<Vec<Policy>>;

    /// Apply a patch to a stored policy.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the policy was updated.
    /// * `Ok(false)` - If the policy does not exist.
    /// * `Err(Error::Validation)` - If the patch holds an unknown enum value.
    fn update_policy(&self, id: PolicyId, patch: &PolicyPatch) -> Result<bool>;

    /// Delete a policy. Decisions it made are kept.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the policy was deleted.
    /// * `Ok(false)` - If the policy does not exist.
    fn delete_policy(&self, id: PolicyId) -> Result<bool>;
}

impl<S: PolicyStore + ?Sized> PolicyStore for &S {
    fn create_policy(&self, draft: &PolicyDraft) -> Result<PolicyId> {
        (**self).create_policy(draft)
    }

    fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>> {
        (**self).get_policy(id)
    }

    fn list_policies(&self, target: &TargetRef) -> Result<Vec<Policy>> {
        (**self).list_policies(target)
    }

    fn policies_for_action(&self, target: &TargetRef, action: ActionType) -> Result<Vec<Policy>> {
        (**self).policies_for_action(target, action)
    }

    fn update_policy(&self, id: PolicyId, patch: &PolicyPatch) -> Result<bool> {
        (**self).update_policy(id, patch)
    }

    fn delete_policy(&self, id: PolicyId) -> Result<bool> {
        (**self).delete_policy(id)
    }
}

impl<S: PolicyStore + ?Sized> PolicyStore for Arc<S> {
    fn create_policy(&self, draft: &PolicyDraft) -> Result<PolicyId> {
        (**self).create_policy(draft)
    }

    fn get_policy(&self, id: PolicyId) -> Result<Option<Policy>> {
        (**self).get_policy(id)
    }

    fn list_policies(&self, target: &TargetRef) -> Result<Vec<Policy>> {
        (**self).list_policies(target)
    }

    fn policies_for_action(&self, target: &TargetRef, action: ActionType) -> Result<Vec<Policy>> {
        (**self).policies_for_action(target, action)
    }

    fn update_policy(&self, id: PolicyId, patch: &PolicyPatch) -> Result<bool> {
        (**self).update_policy(id, patch)
    }

    fn delete_policy(&self, id: PolicyId) -> Result<bool> {
        (**self).delete_policy(id)
    }
}

/// Sort policies the way `list_policies` reports them.
pub(crate) fn sort_for_listing(policies: &mut [Policy]) {
    policies.sort_by(|a, b| a.listing_key().cmp(&b.listing_key()));
}
