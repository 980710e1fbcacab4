//! Policy management commands

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use rights_core::id::{ActorId, PolicyId, ProjectId};
use rights_policy::{DynRightsAdmin, PolicyDraft, PolicyPatch};
use serde_json::json;

use super::{parse_json_arg, print_json};

/// Policy subcommands
#[derive(Subcommand)]
pub enum PolicyCommand {
    /// Create a policy
    Create(CreateArgs),

    /// Show one policy
    Get {
        /// Policy id
        id: i64,
    },

    /// List the policies attached to a target
    List(TargetArgs),

    /// Change fields of a policy
    Update(UpdateArgs),

    /// Delete a policy (its decisions are kept)
    Delete {
        /// Policy id
        id: i64,
    },
}

/// A target reference
#[derive(Args)]
pub struct TargetArgs {
    /// Kind of target, e.g. `collection`
    #[clap(long)]
    pub target_type: String,

    /// Target id
    #[clap(long)]
    pub target_id: i64,
}

/// Arguments for policy create
#[derive(Args)]
pub struct CreateArgs {
    #[clap(flatten)]
    pub target: TargetArgs,

    /// permission, prohibition or obligation
    #[clap(long)]
    pub policy_type: String,

    /// use, reproduce, distribute, modify, archive or display
    #[clap(long)]
    pub action: String,

    /// Constraint document (JSON object)
    #[clap(long)]
    pub constraints: Option<String>,

    /// External policy document (JSON), stored verbatim
    #[clap(long)]
    pub raw_policy: Option<String>,

    /// Creating actor
    #[clap(long)]
    pub created_by: Option<i64>,

    /// Project context for the activity record
    #[clap(long)]
    pub project_id: Option<i64>,
}

/// Arguments for policy update
#[derive(Args)]
pub struct UpdateArgs {
    /// Policy id
    pub id: i64,

    /// New target type
    #[clap(long)]
    pub target_type: Option<String>,

    /// New target id
    #[clap(long)]
    pub target_id: Option<i64>,

    /// New policy type
    #[clap(long)]
    pub policy_type: Option<String>,

    /// New action
    #[clap(long)]
    pub action: Option<String>,

    /// Replacement constraint document (JSON, `null` clears it)
    #[clap(long)]
    pub constraints: Option<String>,

    /// Replacement external policy document (JSON, `null` clears it)
    #[clap(long)]
    pub raw_policy: Option<String>,
}

/// Run a policy subcommand
pub fn execute(admin: &DynRightsAdmin, command: PolicyCommand) -> Result<()> {
    match command {
        PolicyCommand::Create(args) => {
            let draft = PolicyDraft {
                target_type: args.target.target_type,
                target_id: args.target.target_id,
                policy_type: args.policy_type,
                action_type: args.action,
                constraints: args
                    .constraints
                    .as_deref()
                    .map(|text| parse_json_arg("constraints", text))
                    .transpose()?,
                raw_policy: args
                    .raw_policy
                    .as_deref()
                    .map(|text| parse_json_arg("raw-policy", text))
                    .transpose()?,
                created_by: args.created_by.map(ActorId::new),
                project_id: args.project_id.map(ProjectId::new),
            };
            let created = admin.create_policy(draft).context("Failed to create policy")?;
            print_json(&created)
        }
        PolicyCommand::Get { id } => {
            let policy = admin.get_policy(PolicyId::new(id))?;
            print_json(&policy)
        }
        PolicyCommand::List(target) => {
            let policies = admin.list_policies(&target.target_type, target.target_id)?;
            print_json(&policies)
        }
        PolicyCommand::Update(args) => {
            let patch = PolicyPatch {
                target_type: args.target_type,
                target_id: args.target_id,
                policy_type: args.policy_type,
                action_type: args.action,
                constraints: args
                    .constraints
                    .as_deref()
                    .map(|text| parse_json_arg("constraints", text))
                    .transpose()?
                    .map(Some),
                raw_policy: args
                    .raw_policy
                    .as_deref()
                    .map(|text| parse_json_arg("raw-policy", text))
                    .transpose()?
                    .map(Some),
            };
            let updated = admin
                .update_policy(PolicyId::new(args.id), &patch)
                .context("Failed to update policy")?;
            print_json(&json!({ "id": args.id, "updated": updated }))
        }
        PolicyCommand::Delete { id } => {
            let deleted = admin.delete_policy(PolicyId::new(id))?;
            print_json(&json!({ "id": id, "deleted": deleted }))
        }
    }
}
