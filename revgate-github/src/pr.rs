//! Pull request reads: changed files, metadata and diff

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::DIFF_MEDIA_TYPE;
use crate::validate::{validate_pr_number, RepoName};
use crate::{GitHubClient, Result};

/// Change status of a file in a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Copied,
    Changed,
    Unchanged,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Added => "added",
            FileStatus::Modified => "modified",
            FileStatus::Removed => "removed",
            FileStatus::Renamed => "renamed",
            FileStatus::Copied => "copied",
            FileStatus::Changed => "changed",
            FileStatus::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a pull request's file listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestFileRef {
    /// Path in the head commit
    pub filename: String,
    pub status: FileStatus,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changes: u64,
    /// Unified diff hunk; absent for binary or very large files
    #[serde(default)]
    pub patch: Option<String>,
    /// Old path of a renamed file
    #[serde(default)]
    pub previous_filename: Option<String>,
}

/// Branch reference of a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub sha: String,
}

/// Pull request metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub head: GitRef,
    pub base: GitRef,
    pub author: String,
}

#[derive(Deserialize)]
struct PullRequestResponse {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    head: GitRef,
    base: GitRef,
    user: Option<UserResponse>,
}

#[derive(Deserialize)]
struct UserResponse {
    login: String,
}

impl From<PullRequestResponse> for PullRequestInfo {
    fn from(pr: PullRequestResponse) -> Self {
        Self {
            number: pr.number,
            title: pr.title,
            body: pr.body,
            state: pr.state,
            head: pr.head,
            base: pr.base,
            author: pr.user.map(|u| u.login).unwrap_or_default(),
        }
    }
}

impl GitHubClient {
    /// List every file changed by a pull request, in platform order
    pub async fn list_pr_files(&self, repo: &str, pr_number: u64) -> Result<Vec<PullRequestFileRef>> {
        let repo = RepoName::parse(repo)?;
        validate_pr_number(pr_number)?;

        let pr = pr_number.to_string();
        let url = self.repo_url(&repo, ["pulls", pr.as_str(), "files"])?;
        let request = self.build(Method::GET, url);

        let files: Vec<PullRequestFileRef> = self
            .http()
            .paginate(&request, self.per_page(), self.max_pages())
            .await?;

        info!(repo = %repo, pr_number, count = files.len(), "Listed pull request files");
        Ok(files)
    }

    /// Fetch pull request metadata
    pub async fn fetch_pr_info(&self, repo: &str, pr_number: u64) -> Result<PullRequestInfo> {
        let repo = RepoName::parse(repo)?;
        validate_pr_number(pr_number)?;

        let pr = pr_number.to_string();
        let url = self.repo_url(&repo, ["pulls", pr.as_str()])?;
        let response = self.http().request(&self.build(Method::GET, url)).await?;
        let info: PullRequestResponse = response.parse()?;

        debug!(repo = %repo, pr_number, "Fetched pull request info");
        Ok(info.into())
    }

    /// Fetch the pull request as a unified diff
    pub async fn fetch_pr_diff(&self, repo: &str, pr_number: u64) -> Result<String> {
        let repo = RepoName::parse(repo)?;
        validate_pr_number(pr_number)?;

        let pr = pr_number.to_string();
        let url = self.repo_url(&repo, ["pulls", pr.as_str()])?;
        let request = self
            .build(Method::GET, url)
            .set_header("Accept", DIFF_MEDIA_TYPE);

        let response = self.http().request(&request).await?;
        let diff = response.text();

        debug!(repo = %repo, pr_number, bytes = diff.len(), "Fetched pull request diff");
        Ok(diff)
    }
}
