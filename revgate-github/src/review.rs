//! Publishing reviews and comments
//!
//! Every call in this module is sent exactly once. A failed or ambiguous
//! publish is reported to the caller instead of being retried, since a retry
//! after partial success would post the same text twice.

use reqwest::Method;
use revgate_core::Disposition;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::validate::{require_non_empty, validate_line, validate_path, validate_pr_number, RepoName};
use crate::{GitHubClient, Result};

/// Line comment attached to a review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineComment {
    pub path: String,
    pub line: u64,
    pub body: String,
}

impl InlineComment {
    pub fn new(path: impl Into<String>, line: u64, body: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            body: body.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        validate_path(&self.path)?;
        validate_line(self.line)?;
        require_non_empty("comment body", &self.body)
    }
}

/// A review ready to publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub repo: String,
    pub pr_number: u64,
    pub body: String,
    pub disposition: Disposition,
    #[serde(default)]
    pub comments: Vec<InlineComment>,
}

impl ReviewSubmission {
    pub fn new(repo: impl Into<String>, pr_number: u64, body: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            pr_number,
            body: body.into(),
            disposition: Disposition::default(),
            comments: Vec::new(),
        }
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn with_comments(mut self, comments: Vec<InlineComment>) -> Self {
        self.comments = comments;
        self
    }

    /// Check every field; nothing is sent if this fails
    pub fn validate(&self) -> Result<()> {
        RepoName::parse(&self.repo)?;
        validate_pr_number(self.pr_number)?;
        require_non_empty("body", &self.body)?;
        for comment in &self.comments {
            comment.validate()?;
        }
        Ok(())
    }
}

/// A published review or comment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Published {
    pub id: u64,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl GitHubClient {
    /// Publish a review with the given verdict
    pub async fn post_review(
        &self,
        repo: &str,
        pr_number: u64,
        body: &str,
        disposition: Disposition,
    ) -> Result<Published> {
        let submission =
            ReviewSubmission::new(repo, pr_number, body).with_disposition(disposition);
        self.submit_review(&submission).await
    }

    /// Publish a review, including any inline comments
    pub async fn submit_review(&self, submission: &ReviewSubmission) -> Result<Published> {
        submission.validate()?;
        let repo = RepoName::parse(&submission.repo)?;

        let pr = submission.pr_number.to_string();
        let url = self.repo_url(&repo, ["pulls", pr.as_str(), "reviews"])?;

        let mut payload = json!({
            "body": submission.body,
            "event": submission.disposition.as_str(),
        });
        if !submission.comments.is_empty() {
            payload["comments"] = json!(submission
                .comments
                .iter()
                .map(|c| json!({"path": c.path, "line": c.line, "body": c.body}))
                .collect::<Vec<_>>());
        }

        let response = self
            .http()
            .send_once(&self.build(Method::POST, url).json(payload))
            .await?;
        let published: Published = response.parse()?;

        info!(
            repo = %repo,
            pr_number = submission.pr_number,
            disposition = %submission.disposition,
            inline_comments = submission.comments.len(),
            review_id = published.id,
            "Posted review"
        );
        Ok(published)
    }

    /// Post a plain conversation comment on a pull request
    pub async fn post_comment(&self, repo: &str, pr_number: u64, body: &str) -> Result<Published> {
        let repo = RepoName::parse(repo)?;
        validate_pr_number(pr_number)?;
        require_non_empty("body", body)?;

        let pr = pr_number.to_string();
        let url = self.repo_url(&repo, ["issues", pr.as_str(), "comments"])?;
        let response = self
            .http()
            .send_once(&self.build(Method::POST, url).json(json!({ "body": body })))
            .await?;
        let published: Published = response.parse()?;

        info!(repo = %repo, pr_number, comment_id = published.id, "Posted comment");
        Ok(published)
    }

    /// Comment on a single line of the diff at `commit_id`
    pub async fn create_review_comment(
        &self,
        repo: &str,
        pr_number: u64,
        commit_id: &str,
        path: &str,
        line: u64,
        body: &str,
    ) -> Result<Published> {
        let repo = RepoName::parse(repo)?;
        validate_pr_number(pr_number)?;
        require_non_empty("commit_id", commit_id)?;
        validate_path(path)?;
        validate_line(line)?;
        require_non_empty("body", body)?;

        let pr = pr_number.to_string();
        let url = self.repo_url(&repo, ["pulls", pr.as_str(), "comments"])?;
        let payload = json!({
            "body": body,
            "commit_id": commit_id,
            "path": path,
            "line": line,
            "side": "RIGHT",
        });

        let response = self
            .http()
            .send_once(&self.build(Method::POST, url).json(payload))
            .await?;
        let published: Published = response.parse()?;

        info!(repo = %repo, pr_number, path, line, comment_id = published.id, "Posted review comment");
        Ok(published)
    }
}
