//! Terminal subcommand implementations.

pub mod demo;
pub mod dump;
