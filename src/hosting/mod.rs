//! Pull-request hosting collaborator
//!
//! The engine only needs two operations from its hosting service: open a
//! reviewable change request, and (best-effort) enable auto-merge on it.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::core::config::HostingConfig;
use crate::core::{ForemanError, Result};

/// A change request to open
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    /// Repository reference, e.g. "owner/name"
    pub repo: String,
    /// Source branch
    pub branch: String,
    /// Target branch
    pub base: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
}

/// Contract for the hosting service
#[async_trait]
pub trait ChangeRequestHost: Send + Sync {
    /// Open a change request and return its URL
    async fn open(&self, change: &ChangeRequest) -> Result<String>;

    /// Enable auto-merge; best-effort, failures are logged by the caller
    async fn enable_auto_merge(&self, repo: &str, url: &str) -> Result<()>;
}

/// GitHub REST implementation
pub struct GitHubHost {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

impl GitHubHost {
    pub fn from_config(config: &HostingConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| ForemanError::config("hosting requires a token (or GITHUB_TOKEN)"))?;
        Ok(Self {
            client: reqwest::Client::new(),
            token,
            api_base: config.api_base.clone(),
        })
    }
}

#[async_trait]
impl ChangeRequestHost for GitHubHost {
    async fn open(&self, change: &ChangeRequest) -> Result<String> {
        let url = format!("{}/repos/{}/pulls", self.api_base, change.repo);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "foreman")
            .json(&json!({
                "title": change.title,
                "body": change.body,
                "head": change.branch,
                "base": change.base,
                "draft": change.draft,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(ForemanError::hosting(format!(
                "create pull request failed ({}): {}",
                status, body
            )));
        }

        body.get("html_url")
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .ok_or_else(|| ForemanError::hosting("pull request response carried no URL"))
    }

    async fn enable_auto_merge(&self, repo: &str, url: &str) -> Result<()> {
        // number is the last path segment of the PR URL
        let number = url
            .rsplit('/')
            .next()
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| ForemanError::hosting(format!("unparseable pull request URL: {url}")))?;

        let endpoint = format!("{}/repos/{}/pulls/{}/merge", self.api_base, repo, number);
        let response = self
            .client
            .put(&endpoint)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "foreman")
            .json(&json!({ "merge_method": "squash", "auto_merge": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, repo, number, "auto-merge request rejected");
            return Err(ForemanError::hosting(format!(
                "auto-merge failed ({})",
                status
            )));
        }
        Ok(())
    }
}
