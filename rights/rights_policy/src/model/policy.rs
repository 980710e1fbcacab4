//! Policy model.
//!
//! This module defines stored policies, the fixed policy and action
//! vocabularies, and the input shapes used to create and patch policies.

use chrono::{DateTime, Utc};
use rights_core::error::ValidationError;
use rights_core::id::{ActorId, PolicyId, ProjectId};
use rights_core::types::TargetRef;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::model::ConstraintSet;

/// The kind of rule a policy expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    /// Grants the action when its constraints hold.
    Permission,

    /// Blocks the action when its constraints hold.
    Prohibition,

    /// A duty attached to the target. Recorded, never used to gate access.
    Obligation,
}

impl PolicyType {
    /// Every policy type, in declaration order.
    pub const ALL: [PolicyType; 3] = [Self::Permission, Self::Prohibition, Self::Obligation];

    /// The stored name of this policy type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Prohibition => "prohibition",
            Self::Obligation => "obligation",
        }
    }
}

impl FromStr for PolicyType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permission" => Ok(Self::Permission),
            "prohibition" => Ok(Self::Prohibition),
            "obligation" => Ok(Self::Obligation),
            _ => Err(ValidationError::UnknownPolicyType(s.to_string())),
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The action a policy governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Use the target.
    Use,

    /// Make copies of the target.
    Reproduce,

    /// Distribute the target to others.
    Distribute,

    /// Modify the target.
    Modify,

    /// Archive the target.
    Archive,

    /// Display the target.
    Display,
}

impl ActionType {
    /// Every action type, in declaration order.
    pub const ALL: [ActionType; 6] = [
        Self::Use,
        Self::Reproduce,
        Self::Distribute,
        Self::Modify,
        Self::Archive,
        Self::Display,
    ];

    /// The stored name of this action type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Use => "use",
            Self::Reproduce => "reproduce",
            Self::Distribute => "distribute",
            Self::Modify => "modify",
            Self::Archive => "archive",
            Self::Display => "display",
        }
    }
}

impl FromStr for ActionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownActionType(s.to_string()))
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// The unique ID of this policy. Never reused.
    pub id: PolicyId,

    /// The protected resource.
    #[serde(flatten)]
    pub target: TargetRef,

    /// The kind of rule.
    pub policy_type: PolicyType,

    /// The governed action.
    pub action_type: ActionType,

    /// Conditions narrowing when the rule applies.
    #[serde(default)]
    pub constraints: ConstraintSet,

    /// The full external policy document, kept verbatim.
    #[serde(default)]
    pub raw_policy: Option<Value>,

    /// Who created the policy.
    #[serde(default)]
    pub created_by: Option<ActorId>,

    /// When the policy was created.
    pub created_at: DateTime<Utc>,

    /// When the policy was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Build a policy from a validated spec.
    pub fn from_spec(id: PolicyId, spec: PolicySpec, now: DateTime<Utc>) -> Self {
        Self {
            id,
            target: spec.target,
            policy_type: spec.policy_type,
            action_type: spec.action_type,
            constraints: spec.constraints,
            raw_policy: spec.raw_policy,
            created_by: spec.created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sort key used when listing a target's policies.
    pub fn listing_key(&self) -> (&'static str, &'static str, PolicyId) {
        (self.policy_type.as_str(), self.action_type.as_str(), self.id)
    }
}

/// Input for creating a policy, as received from an external caller.
///
/// Enumerated fields arrive as strings and are checked by [`PolicyDraft::validate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDraft {
    /// The kind of resource.
    #[serde(default)]
    pub target_type: String,

    /// The resource identifier.
    pub target_id: i64,

    /// `permission`, `prohibition` or `obligation`.
    #[serde(default)]
    pub policy_type: String,

    /// One of the fixed action names.
    #[serde(default)]
    pub action_type: String,

    /// Optional constraint document.
    #[serde(default)]
    pub constraints: Option<Value>,

    /// Optional external policy document.
    #[serde(default)]
    pub raw_policy: Option<Value>,

    /// Who is creating the policy.
    #[serde(default)]
    pub created_by: Option<ActorId>,

    /// Project context for the activity record, when the caller has one.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
}

impl PolicyDraft {
    /// Start a draft for the given target, type and action.
    pub fn new(
        target_type: impl Into<String>,
        target_id: i64,
        policy_type: impl Into<String>,
        action_type: impl Into<String>,
    ) -> Self {
        Self {
            target_type: target_type.into(),
            target_id,
            policy_type: policy_type.into(),
            action_type: action_type.into(),
            ..Self::default()
        }
    }

    /// Attach a constraint document.
    pub fn with_constraints(mut self, constraints: Value) -> Self {
        self.constraints = Some(constraints);
        self
    }

    /// Attach the external policy document.
    pub fn with_raw_policy(mut self, raw_policy: Value) -> Self {
        self.raw_policy = Some(raw_policy);
        self
    }

    /// Record the creator.
    pub fn created_by(mut self, actor_id: ActorId) -> Self {
        self.created_by = Some(actor_id);
        self
    }

    /// Check enumerated fields and required values.
    ///
    /// # Returns
    ///
    /// * `Ok(PolicySpec)` - The typed policy definition.
    /// * `Err(ValidationError)` - If a field is missing or not recognized.
    pub fn validate(&self) -> Result<PolicySpec, ValidationError> {
        let target = TargetRef::parse(&self.target_type, self.target_id)?;
        if self.policy_type.trim().is_empty() {
            return Err(ValidationError::MissingField("policy_type"));
        }
        if self.action_type.trim().is_empty() {
            return Err(ValidationError::MissingField("action_type"));
        }

        Ok(PolicySpec {
            target,
            policy_type: self.policy_type.parse()?,
            action_type: self.action_type.parse()?,
            constraints: ConstraintSet::from_document(self.constraints.clone()),
            raw_policy: self.raw_policy.clone(),
            created_by: self.created_by,
        })
    }
}

/// A validated, typed policy definition ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySpec {
    /// The protected resource.
    pub target: TargetRef,

    /// The kind of rule.
    pub policy_type: PolicyType,

    /// The governed action.
    pub action_type: ActionType,

    /// Parsed constraints.
    pub constraints: ConstraintSet,

    /// External policy document.
    pub raw_policy: Option<Value>,

    /// Who created the policy.
    pub created_by: Option<ActorId>,
}

/// A partial update to a stored policy.
///
/// Absent fields are left unchanged. An explicit `null` clears the constraint
/// or raw policy document and is ignored for the other fields. Fields outside
/// this set are ignored when deserializing, so callers may send whole
/// documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyPatch {
    /// New resource kind.
    #[serde(default)]
    pub target_type: Option<String>,

    /// New resource identifier.
    #[serde(default)]
    pub target_id: Option<i64>,

    /// New policy type.
    #[serde(default)]
    pub policy_type: Option<String>,

    /// New action type.
    #[serde(default)]
    pub action_type: Option<String>,

    /// Replacement constraint document, `Some(None)` to clear it.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub constraints: Option<Option<Value>>,

    /// Replacement external policy document, `Some(None)` to clear it.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub raw_policy: Option<Option<Value>>,
}

/// Deserialize a field that was present, keeping `null` apart from absent.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Value>::deserialize(deserializer).map(Some)
}

impl PolicyPatch {
    /// Apply this patch to `policy`, refreshing `updated_at`.
    ///
    /// Every field is validated before anything is written, so a rejected
    /// patch leaves the policy untouched.
    pub fn apply(&self, policy: &mut Policy, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let target_type = match &self.target_type {
            Some(target_type) => Some(TargetRef::parse(target_type, 0)?.target_type),
            None => None,
        };
        let policy_type = self
            .policy_type
            .as_deref()
            .map(PolicyType::from_str)
            .transpose()?;
        let action_type = self
            .action_type
            .as_deref()
            .map(ActionType::from_str)
            .transpose()?;

        if let Some(target_type) = target_type {
            policy.target.target_type = target_type;
        }
        if let Some(target_id) = self.target_id {
            policy.target.target_id = target_id;
        }
        if let Some(policy_type) = policy_type {
            policy.policy_type = policy_type;
        }
        if let Some(action_type) = action_type {
            policy.action_type = action_type;
        }
        if let Some(constraints) = &self.constraints {
            policy.constraints = ConstraintSet::from_document(constraints.clone());
        }
        if let Some(raw_policy) = &self.raw_policy {
            policy.raw_policy = raw_policy.clone().filter(|value| !value.is_null());
        }
        policy.updated_at = now;

        Ok(())
    }
}
