//! Constraint evaluation.

use chrono::{DateTime, Utc};
use rights_core::error::Result;
use rights_core::id::{ActorId, PolicyId};
use tracing::trace;

use crate::model::{Constraint, Policy};

/// Decides whether a policy's constraints hold for one request.
///
/// Every evaluated constraint must pass. Opaque entries are skipped. The
/// usage cap is checked last so the log is only consulted when everything
/// else already holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintEvaluator;

impl ConstraintEvaluator {
    /// Check `policy`'s constraints for `actor_id` at `now`.
    ///
    /// # Arguments
    ///
    /// * `policy` - The candidate policy.
    /// * `actor_id` - The requesting actor.
    /// * `now` - The evaluation instant.
    /// * `prior_grants` - Counts permitted decisions already logged for a
    ///   policy and actor.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If every constraint holds.
    /// * `Ok(false)` - If any constraint fails.
    /// * `Err` - If the usage count could not be read.
    pub fn satisfied<F>(
        policy: &Policy,
        actor_id: ActorId,
        now: DateTime<Utc>,
        prior_grants: F,
    ) -> Result<bool>
    where
        F: Fn(PolicyId, ActorId) -> Result<u64>,
    {
        let mut cap = None;

        for constraint in policy.constraints.iter() {
            let holds = match constraint {
                Constraint::ActorAllowList(actors) => {
                    actors.is_empty() || actors.contains(&actor_id)
                }
                Constraint::ValidFrom(from) => now >= *from,
                Constraint::ValidTo(to) => now <= *to,
                Constraint::MaxUses(max) => {
                    if *max > 0 {
                        cap = Some(*max);
                    }
                    true
                }
                Constraint::Opaque { .. } => true,
            };

            if !holds {
                trace!(
                    policy_id = %policy.id,
                    actor_id = %actor_id,
                    %constraint,
                    "Constraint not met"
                );
                return Ok(false);
            }
        }

        if let Some(max) = cap {
            let used = prior_grants(policy.id, actor_id)?;
            if used >= max {
                trace!(
                    policy_id = %policy.id,
                    actor_id = %actor_id,
                    used,
                    max,
                    "Usage cap reached"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }
}
