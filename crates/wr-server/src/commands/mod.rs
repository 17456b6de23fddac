//! CLI subcommand implementations.

pub mod plan;
pub mod serve;
pub mod show_config;
