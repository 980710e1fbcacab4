//! Protected target references.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// An opaque reference to a protected resource.
///
/// The engine compares targets for equality and nothing else; what a
/// `collection` or an `information_object` is belongs to the owning service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRef {
    /// The kind of resource, e.g. `collection`.
    pub target_type: String,

    /// The resource identifier within its kind.
    pub target_id: i64,
}

impl TargetRef {
    /// Create a new target reference.
    pub fn new(target_type: impl Into<String>, target_id: i64) -> Self {
        Self {
            target_type: target_type.into(),
            target_id,
        }
    }

    /// Create a target reference, rejecting an empty or blank type.
    pub fn parse(target_type: &str, target_id: i64) -> Result<Self, ValidationError> {
        let target_type = target_type.trim();
        if target_type.is_empty() {
            return Err(ValidationError::MissingField("target_type"));
        }
        Ok(Self::new(target_type, target_id))
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.target_id)
    }
}
