//! GitHub REST client bound to an installation token

use std::sync::Arc;

use reqwest::Method;
use revgate_core::GitHubConfig;
use tracing::info;

use crate::auth::InstallationToken;
use crate::http::{ApiRequest, HttpClient};
use crate::validate::RepoName;
use crate::{Error, Result};

/// Default media type for REST responses
pub const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Media type for raw unified diffs
pub const DIFF_MEDIA_TYPE: &str = "application/vnd.github.diff";

/// API version header
pub const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";

/// Pinned REST API version
pub const API_VERSION: &str = "2022-11-28";

/// GitHub API client acting for one installation
#[derive(Clone)]
pub struct GitHubClient {
    http: Arc<HttpClient>,
    api_url: String,
    user_agent: String,
    token: String,
    per_page: u32,
    max_pages: u32,
}

impl GitHubClient {
    /// Create a client that authenticates with `token`
    pub fn new(http: Arc<HttpClient>, config: &GitHubConfig, token: impl Into<String>) -> Self {
        Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            token: token.into(),
            per_page: config.per_page,
            max_pages: config.max_pages,
        }
    }

    /// Create a client for an installation token
    pub fn for_installation(
        http: Arc<HttpClient>,
        config: &GitHubConfig,
        token: &InstallationToken,
    ) -> Self {
        info!(
            installation_id = token.installation_id,
            api_url = %config.api_url,
            "Created GitHub client"
        );
        Self::new(http, config, token.token.clone())
    }

    /// Base API URL, without a trailing slash
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }

    pub(crate) fn per_page(&self) -> u32 {
        self.per_page
    }

    pub(crate) fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Build a URL under `/repos/{owner}/{name}/...`
    ///
    /// Segments are percent-encoded individually.
    pub(crate) fn repo_url<'a, I>(&self, repo: &RepoName<'_>, segments: I) -> Result<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = url::Url::parse(&self.api_url)
            .map_err(|e| Error::Config(format!("Invalid GitHub API URL '{}': {}", self.api_url, e)))?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::Config(format!("GitHub API URL cannot be a base: {}", self.api_url))
            })?;
            path.pop_if_empty()
                .extend(["repos", repo.owner, repo.name])
                .extend(segments);
        }
        Ok(url.into())
    }

    /// An authenticated request with the standard headers
    pub(crate) fn build(&self, method: Method, url: String) -> ApiRequest {
        ApiRequest::new(method, url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", JSON_MEDIA_TYPE)
            .header(API_VERSION_HEADER, API_VERSION)
            .header("User-Agent", self.user_agent.as_str())
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .field("user_agent", &self.user_agent)
            .field("per_page", &self.per_page)
            .finish_non_exhaustive()
    }
}
