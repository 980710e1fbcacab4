//! Access evaluation command

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use rights_core::id::{ActorId, ProjectId};
use rights_policy::{DynRightsAdmin, EvaluateRequest};

use super::policy::TargetArgs;
use super::print_json;

/// Arguments for the evaluate command
#[derive(Args)]
pub struct EvaluateArgs {
    #[clap(flatten)]
    pub target: TargetArgs,

    /// Requesting actor
    #[clap(long)]
    pub actor_id: i64,

    /// Requested action
    #[clap(long)]
    pub action: String,

    /// Project context for the activity record
    #[clap(long)]
    pub project_id: Option<i64>,

    /// Evaluate as of this RFC 3339 instant instead of now
    #[clap(long)]
    pub at: Option<DateTime<Utc>>,
}

/// Implementation of the evaluate command
pub fn execute(admin: &DynRightsAdmin, args: &EvaluateArgs) -> Result<()> {
    let request = EvaluateRequest {
        target_type: args.target.target_type.clone(),
        target_id: args.target.target_id,
        actor_id: ActorId::new(args.actor_id),
        action: args.action.clone(),
        project_id: args.project_id.map(ProjectId::new),
    };

    let response = admin
        .evaluate_at(&request, args.at.unwrap_or_else(Utc::now))
        .context("Evaluation failed")?;
    print_json(&response)
}
