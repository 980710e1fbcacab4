//! Utility helpers.

pub mod logging;

pub use logging::LogLevel;
