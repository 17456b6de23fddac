//! Worklog relay server library.
//!
//! This crate provides the webhook listener and the CLI around it.

mod cli;
pub mod commands;
mod config;
mod error;
pub mod server;
pub mod targets;

pub use cli::{Cli, Commands};
pub use config::{AuthConfig, Config, JiraSettings, TargetsConfig};
pub use error::WebhookError;
