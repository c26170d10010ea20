//! Subcommand implementations

pub mod clear;
pub mod clone;
