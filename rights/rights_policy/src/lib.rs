//! # Rights Policy
//!
//! `rights_policy` stores access-control policies attached to arbitrary
//! targets and decides whether an actor may perform an action on a target.
//! Every decision is logged, and the log doubles as the usage history that
//! `max_uses` constraints are checked against.
//!
//! Key concepts:
//!
//! 1. **Policy**: A permission, prohibition or obligation governing one
//!    action on one target, optionally narrowed by constraints.
//!
//! 2. **Constraint**: A condition on the actor, the time of the request or
//!    the number of earlier grants.
//!
//! 3. **Decision**: The logged outcome of one evaluation. A satisfied
//!    prohibition always wins, then the first satisfied permission, and
//!    anything else is denied.
//!
//! 4. **Activity**: A best-effort feed entry recorded after each policy
//!    creation and each evaluation.

pub mod activity;
pub mod admin;
pub mod config;
pub mod engine;
pub mod model;
pub mod store;

// Re-export key types and traits for convenience
pub use activity::{ActivityEvent, ActivitySink, InMemoryActivitySink, TracingActivitySink};
pub use admin::{CreatedPolicy, DynRightsAdmin, EvaluateRequest, EvaluateResponse, RightsAdmin};
pub use config::{EngineConfig, SqliteConfig, StorageConfig};
pub use engine::{
    ConstraintEvaluator, DecisionEngine, DecisionLog, EvaluationTier, InMemoryDecisionLog,
    PolicyAggregator, RightsSummary,
};
pub use model::{
    ActionType, Constraint, ConstraintSet, Decision, DecisionFilter, Evaluation,
    EvaluationRequest, Outcome, Policy, PolicyDraft, PolicyPatch, PolicyType,
};
pub use store::{InMemoryPolicyStore, PolicyStore, SqliteRightsStore};
