//! Reference types shared across the rights engine.

pub mod target;

pub use target::TargetRef;
