//! Decision log and rights summary commands

use anyhow::{anyhow, Result};
use clap::Args;
use rights_core::id::{ActorId, PolicyId};
use rights_policy::{DecisionFilter, DynRightsAdmin, Outcome};

use super::policy::TargetArgs;
use super::print_json;

/// Arguments for the decisions command
#[derive(Args)]
pub struct DecisionsArgs {
    /// Only decisions made by this policy
    #[clap(long)]
    pub policy_id: Option<i64>,

    /// Only decisions for this actor
    #[clap(long)]
    pub actor_id: Option<i64>,

    /// Only `permitted` or `denied` decisions
    #[clap(long)]
    pub outcome: Option<String>,
}

/// Arguments for the summary command
#[derive(Args)]
pub struct SummaryArgs {
    #[clap(flatten)]
    pub target: TargetArgs,
}

/// Implementation of the decisions command
pub fn execute_decisions(admin: &DynRightsAdmin, args: &DecisionsArgs) -> Result<()> {
    let outcome = args
        .outcome
        .as_deref()
        .map(|text| text.parse::<Outcome>().map_err(|err| anyhow!(err)))
        .transpose()?;
    let filter = DecisionFilter {
        policy_id: args.policy_id.map(PolicyId::new),
        actor_id: args.actor_id.map(ActorId::new),
        outcome,
    };

    print_json(&admin.decisions(&filter)?)
}

/// Implementation of the summary command
pub fn execute_summary(admin: &DynRightsAdmin, args: &SummaryArgs) -> Result<()> {
    let summary = admin.rights_summary(&args.target.target_type, args.target.target_id)?;
    print_json(&summary)
}
