//! # Rights Core
//!
//! `rights_core` provides the shared building blocks for the rights policy
//! engine: the error taxonomy, strongly-typed identifiers, and the references
//! used to name actors and protected targets.
//!
//! The engine itself never interprets what a target *is*. A target is an
//! opaque `(target_type, target_id)` pair owned by some other service, and an
//! actor is just a principal identifier handed in by the caller.
//!
//! ## Crate Structure
//!
//! - **error**: Error types shared by every rights component
//! - **id**: Strongly-typed identifier types
//! - **types**: Target and actor references
//! - **utils**: Logging helpers

pub mod error;
pub mod id;
pub mod types;
pub mod utils;

pub use error::{Error, Result, StorageError, ValidationError};
pub use id::{ActorId, DecisionId, PolicyId, ProjectId};
pub use types::TargetRef;
pub use utils::LogLevel;
