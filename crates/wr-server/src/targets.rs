//! Builds the target registry from configuration.

use std::sync::Arc;

use wr_core::dispatch::Unconfigured;
use wr_core::{Dispatcher, TargetRegistry};
use wr_jira::JiraError;

use crate::config::{Config, JiraSettings};

pub const JIRA: &str = "jira";

/// Registers every known target.
///
/// A target without credentials is still registered so that directives
/// naming it fail loudly instead of being dropped.
pub fn build_registry(config: &Config) -> Result<TargetRegistry, JiraError> {
    let mut registry = TargetRegistry::new();
    register_jira(&mut registry, &config.targets.jira)?;
    Ok(registry)
}

pub fn build_dispatcher(config: &Config) -> Result<Dispatcher, JiraError> {
    let registry = build_registry(config)?;
    Ok(Dispatcher::new(registry, config.default_targets.clone()))
}

fn register_jira(registry: &mut TargetRegistry, settings: &JiraSettings) -> Result<(), JiraError> {
    let policy = settings.retry.clone();
    if let Some((url, username, token)) = settings.credentials() {
        let client = wr_jira::Client::new(url, username, token)?;
        tracing::debug!(?client, "jira target configured");
        registry.register(JIRA, Arc::new(client), policy);
    } else {
        tracing::warn!(target_name = JIRA, "no credentials, worklogs for this target will be dropped");
        registry.register(JIRA, Arc::new(Unconfigured::new(JIRA)), policy);
    }
    Ok(())
}
