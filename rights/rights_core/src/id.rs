//! Strongly-typed identifiers for the rights engine.
//!
//! Every identifier is a thin wrapper around an `i64` with a phantom marker,
//! so a policy id can never be handed to something expecting a decision id.
//! Policy and decision ids are assigned by the stores; actor and project ids
//! come from the services that own those entities.
//!
//! # Examples
//!
//! ```
//! use rights_core::id::{DecisionId, PolicyId};
//! use std::str::FromStr;
//!
//! let policy_id = PolicyId::new(12);
//! assert_eq!(policy_id.value(), 12);
//! assert_eq!(policy_id.to_string(), "12");
//!
//! let decision_id = DecisionId::from_str("7").unwrap();
//! assert_eq!(decision_id.value(), 7);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::{Ord, PartialOrd};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// A type-safe numeric identifier.
///
/// The marker parameter `T` keeps identifiers for different entity types
/// apart at compile time. On the wire the identifier is a bare integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Id<T> {
    value: i64,
    #[serde(skip)]
    _marker: std::marker::PhantomData<T>,
}

impl<T> Id<T> {
    /// Wrap a raw identifier value.
    ///
    /// # Examples
    ///
    /// ```
    /// use rights_core::id::ActorId;
    ///
    /// let actor = ActorId::new(3);
    /// assert_eq!(actor.value(), 3);
    /// ```
    pub const fn new(value: i64) -> Self {
        Self {
            value,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the raw value.
    pub const fn value(&self) -> i64 {
        self.value
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> FromStr for Id<T> {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.trim().parse()?))
    }
}

impl<T> From<i64> for Id<T> {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

/// Marker type for policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyMarker;
/// Identifier for a stored policy.
pub type PolicyId = Id<PolicyMarker>;

/// Marker type for decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecisionMarker;
/// Identifier for a logged decision.
pub type DecisionId = Id<DecisionMarker>;

/// Marker type for actors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorMarker;
/// Identifier for the principal requesting access.
pub type ActorId = Id<ActorMarker>;

/// Marker type for projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectMarker;
/// Identifier for the project context an activity belongs to.
pub type ProjectId = Id<ProjectMarker>;
