//! Configuration loading and management.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use wr_core::{AllocationConfig, DefaultTargets, RetryPolicy, ValidationError};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the webhook listener binds to.
    pub listen_addr: SocketAddr,
    /// Shared-secret header check.
    pub auth: AuthConfig,
    pub allocation: AllocationConfig,
    /// Targets used when a description carries no directive.
    pub default_targets: DefaultTargets,
    pub targets: TargetsConfig,
}

/// Header that must carry the shared secret on every webhook call.
///
/// The check is on only when both header and secret are set.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub header: Option<String>,
    pub secret: Option<String>,
}

impl AuthConfig {
    /// Returns `(header, secret)` when the check is enabled.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let header = self.header.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        let secret = self.secret.as_deref().filter(|s| !s.is_empty())?;
        Some((header, secret))
    }

    /// True when only one of header and secret is set.
    pub fn is_partial(&self) -> bool {
        self.credentials().is_none()
            && (self.header.as_deref().is_some_and(|h| !h.trim().is_empty())
                || self.secret.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub jira: JiraSettings,
}

/// Jira credentials and delivery policy.
///
/// The target counts as configured only when URL, username and token are all
/// set.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraSettings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub token: Option<String>,
    pub retry: RetryPolicy,
}

impl JiraSettings {
    /// Returns `(url, username, token)` when every credential is present.
    pub fn credentials(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.url.as_deref()?,
            self.username.as_deref()?,
            self.token.as_deref()?,
        ))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("auth", &self.auth)
            .field("allocation", &self.allocation)
            .field("default_targets", &self.default_targets)
            .field("targets", &self.targets)
            .finish()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("header", &self.header)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl fmt::Debug for JiraSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            auth: AuthConfig::default(),
            allocation: AllocationConfig::default(),
            default_targets: DefaultTargets::default(),
            targets: TargetsConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // WR_ALLOCATION__OVERTIME_MULTIPLIER -> allocation.overtime_multiplier
        figment = figment.merge(Env::prefixed("WR_").split("__"));

        figment.extract()
    }

    /// Rejects values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.allocation.validate()?;

        if let DefaultTargets::Only(names) = &self.default_targets {
            if names.iter().any(|name| name.trim().is_empty()) {
                return Err(ValidationError::Empty {
                    field: "default_targets.only",
                });
            }
        }

        Ok(())
    }
}

/// Returns the platform-specific config directory for the relay.
///
/// On Linux: `~/.config/worklog-relay`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("worklog-relay"))
}
