//! Command implementations
//!
//! Each command validates its arguments, calls the administrative API and
//! prints the result as JSON.

pub mod audit;
pub mod evaluate;
pub mod policy;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}

/// Parse a JSON document given on the command line.
pub fn parse_json_arg(name: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("--{} is not valid JSON", name))
}
