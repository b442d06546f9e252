//! Subcommand implementations.

pub mod collections;
pub mod maintenance;
pub mod records;
