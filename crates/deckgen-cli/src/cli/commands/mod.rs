//! CLI command handlers.

pub mod segment;
pub mod serve;
