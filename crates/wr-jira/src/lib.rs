//! Jira worklog target for the worklog relay.
//!
//! Resolves the issue key embedded in an allocation's description and posts
//! the allocation as a worklog on that issue.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wr_core::{PublishError, Publisher, TimeAllocation};

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SEARCH_PATH: &str = "/rest/api/2/search";

static ISSUE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([A-Z0-9]+-\d+)").unwrap());

/// Jira client errors.
#[derive(Debug, Error)]
pub enum JiraError {
    /// A required setting was missing or blank.
    #[error("invalid Jira configuration: {reason}")]
    InvalidConfig { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

/// Jira REST client publishing worklogs.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    username: String,
    token: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client for the Jira instance at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, JiraError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let username = username.into();
        let token = token.into();

        if base_url.is_empty() {
            return Err(JiraError::InvalidConfig {
                reason: "URL cannot be empty",
            });
        }
        if username.trim().is_empty() {
            return Err(JiraError::InvalidConfig {
                reason: "username cannot be empty",
            });
        }
        if token.trim().is_empty() {
            return Err(JiraError::InvalidConfig {
                reason: "token cannot be empty",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(JiraError::ClientBuild)?;

        Ok(Self {
            http,
            base_url,
            username,
            token,
        })
    }

    /// Looks up the issue `key` and returns its canonical key.
    async fn find_issue(&self, key: &str) -> Result<Issue, PublishError> {
        let response = self
            .http
            .get(format!("{}{SEARCH_PATH}", self.base_url))
            .query(&[("jql", format!("id={key}"))])
            .header("Accept", "application/json")
            .basic_auth(&self.username, Some(&self.token))
            .send()
            .await
            .map_err(transient)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Transient(format!(
                "issue search returned status {status}"
            )));
        }

        let results: SearchResults = response.json().await.map_err(transient)?;
        results
            .issues
            .into_iter()
            .next()
            .ok_or_else(|| PublishError::Abort(format!("could not find issue with ID {key}")))
    }

    async fn add_worklog(&self, issue: &Issue, body: &WorklogBody) -> Result<(), PublishError> {
        let response = self
            .http
            .post(format!(
                "{}/rest/api/2/issue/{}/worklog",
                self.base_url, issue.key
            ))
            .query(&[("adjustEstimate", "auto")])
            .header("Accept", "application/json")
            .basic_auth(&self.username, Some(&self.token))
            .json(body)
            .send()
            .await
            .map_err(transient)?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %text, "could not update worklog");
            return Err(PublishError::Transient(format!(
                "worklog update returned status {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for Client {
    async fn publish(&self, allocation: &TimeAllocation) -> Result<(), PublishError> {
        let key = find_issue_key(&allocation.description)
            .ok_or_else(|| PublishError::Abort("no issue ID found in description".to_string()))?;

        let issue = self.find_issue(&key).await?;
        tracing::info!(id = %issue.id, key = %issue.key, "found issue");

        let body = WorklogBody::from(allocation);
        self.add_worklog(&issue, &body).await?;

        tracing::info!(
            key = %issue.key,
            duration = %body.time_spent,
            date = %body.started,
            "updated worklog"
        );
        Ok(())
    }
}

/// Returns the first issue key in `description`, upper-cased.
pub fn find_issue_key(description: &str) -> Option<String> {
    ISSUE_KEY_RE
        .find(description)
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// Formats a timestamp the way the worklog API expects it.
pub fn format_started(started: &DateTime<FixedOffset>) -> String {
    started
        .with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%S%.3f+0000")
        .to_string()
}

/// Request body of the add-worklog call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklogBody {
    pub description: String,
    pub started: String,
    pub time_spent: String,
    pub visibility: Option<serde_json::Value>,
}

impl From<&TimeAllocation> for WorklogBody {
    fn from(allocation: &TimeAllocation) -> Self {
        Self {
            description: allocation.description.clone(),
            started: format_started(&allocation.started),
            time_spent: format!("{}m", allocation.time_spent_minutes),
            visibility: allocation.visibility.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    issues: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    #[serde(default)]
    id: serde_json::Value,
    key: String,
}

#[allow(clippy::needless_pass_by_value)]
fn transient(err: reqwest::Error) -> PublishError {
    PublishError::Transient(err.to_string())
}
