//! Policy evaluation engine.
//!
//! This module provides functionality for evaluating policies, logging the
//! resulting decisions and summarizing a target's rights.

mod aggregator;
mod audit;
mod constraints;
mod evaluator;
mod locks;

pub use aggregator::{PolicyAggregator, RightsEntry, RightsSummary};
pub use audit::{DecisionLog, InMemoryDecisionLog};
pub use constraints::ConstraintEvaluator;
pub use evaluator::{DecisionEngine, EvaluationTier};
pub use locks::{UsageKey, UsageLocks};
