//! Policy data model.
//!
//! This module defines the data structures for policies, their constraints
//! and the decisions recorded when they are evaluated.

pub mod constraint;
mod decision;
mod policy;

pub use constraint::{Constraint, ConstraintSet};
pub use decision::{
    Decision, DecisionFilter, Evaluation, EvaluationRequest, NewDecision, Outcome,
};
pub use policy::{ActionType, Policy, PolicyDraft, PolicyPatch, PolicySpec, PolicyType};
