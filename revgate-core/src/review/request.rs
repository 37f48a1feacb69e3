//! Review request generation for the review engine
//!
//! A review request carries the pull request identity and the changed files
//! that were fetched for it. Files whose content could not be fetched stay in
//! the request with a note, so the engine can say what it did not see.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Verdict attached to a published review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    /// Neutral review comment
    #[default]
    Comment,
    /// Approve the pull request
    Approve,
    /// Block the pull request until changes are made
    RequestChanges,
}

impl Disposition {
    /// Wire value used by the reviews endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Comment => "COMMENT",
            Disposition::Approve => "APPROVE",
            Disposition::RequestChanges => "REQUEST_CHANGES",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Disposition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "COMMENT" => Ok(Disposition::Comment),
            "APPROVE" => Ok(Disposition::Approve),
            "REQUEST_CHANGES" => Ok(Disposition::RequestChanges),
            other => Err(Error::Other(format!(
                "disposition must be one of COMMENT, APPROVE, REQUEST_CHANGES, got '{}'",
                other
            ))),
        }
    }
}

/// One changed file as seen by the review engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileForReview {
    /// Path within the repository
    pub path: String,
    /// Change status reported by the platform (added, modified, ...)
    pub status: String,
    /// Lines added
    pub additions: u64,
    /// Lines deleted
    pub deletions: u64,
    /// File content at the reviewed ref, if it was fetched
    pub content: Option<String>,
    /// Why the content is missing, if fetching failed
    pub fetch_error: Option<String>,
}

impl FileForReview {
    /// A file whose content was fetched
    pub fn fetched(path: impl Into<String>, status: impl Into<String>, content: String) -> Self {
        Self {
            path: path.into(),
            status: status.into(),
            additions: 0,
            deletions: 0,
            content: Some(content),
            fetch_error: None,
        }
    }

    /// A file whose content could not be fetched
    pub fn failed(path: impl Into<String>, status: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: status.into(),
            additions: 0,
            deletions: 0,
            content: None,
            fetch_error: Some(reason.into()),
        }
    }

    /// A file with no content at the reviewed revision, such as a deletion
    pub fn absent(path: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: status.into(),
            additions: 0,
            deletions: 0,
            content: None,
            fetch_error: None,
        }
    }

    /// Set line counts
    pub fn with_stats(mut self, additions: u64, deletions: u64) -> Self {
        self.additions = additions;
        self.deletions = deletions;
        self
    }

    /// Whether fetching this file failed
    pub fn is_missing(&self) -> bool {
        self.fetch_error.is_some()
    }
}

/// A structured review request for the review engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// Repository in `owner/name` form
    pub repo: String,
    /// Pull request number
    pub pr_number: u64,
    /// Pull request title
    pub title: String,
    /// Commit the content was fetched at
    pub head_sha: Option<String>,
    /// Changed files, in the order the platform listed them
    pub files: Vec<FileForReview>,
}

impl ReviewRequest {
    /// Create a new review request
    pub fn new(repo: impl Into<String>, pr_number: u64) -> Self {
        Self {
            repo: repo.into(),
            pr_number,
            title: String::new(),
            head_sha: None,
            files: Vec::new(),
        }
    }

    /// Set the pull request title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the head commit
    pub fn with_head_sha(mut self, sha: Option<String>) -> Self {
        self.head_sha = sha;
        self
    }

    /// Set the files
    pub fn with_files(mut self, files: Vec<FileForReview>) -> Self {
        self.files = files;
        self
    }

    /// Files whose content could not be fetched
    pub fn missing_files(&self) -> impl Iterator<Item = &FileForReview> {
        self.files.iter().filter(|f| f.is_missing())
    }

    /// Generate the prompt for the review engine
    pub fn to_prompt(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "# Code Review Request: {} #{}\n\n",
            self.repo, self.pr_number
        ));

        if !self.title.is_empty() {
            prompt.push_str(&format!("**Title**: {}\n", self.title));
        }
        if let Some(ref sha) = self.head_sha {
            prompt.push_str(&format!("**Commit**: {}\n", sha));
        }
        prompt.push('\n');

        prompt.push_str("## Focus Areas\n\n");
        for area in [
            "Security vulnerabilities",
            "Architecture and design issues",
            "Code quality and idioms",
            "Performance problems",
        ] {
            prompt.push_str(&format!("- {}\n", area));
        }
        prompt.push('\n');

        prompt.push_str("## Changed Files\n\n");
        for file in &self.files {
            prompt.push_str(&format!(
                "### `{}` ({}, +{} -{})\n\n",
                file.path, file.status, file.additions, file.deletions
            ));
            match (&file.content, &file.fetch_error) {
                (Some(content), _) => {
                    prompt.push_str("```\n");
                    prompt.push_str(content);
                    if !content.ends_with('\n') {
                        prompt.push('\n');
                    }
                    prompt.push_str("```\n\n");
                }
                (None, Some(reason)) => {
                    prompt.push_str(&format!(
                        "_Content unavailable: {}. Mention that this file was not reviewed._\n\n",
                        reason
                    ));
                }
                (None, None) => {
                    prompt.push_str("_No content at this revision._\n\n");
                }
            }
        }

        prompt.push_str("## Expected Output Format\n\n");
        prompt.push_str(
            "Respond with a markdown report: an executive summary with severity counts \
             (Critical/High/Medium/Low), then a file-by-file breakdown with line references \
             and suggested fixes.\n",
        );

        prompt
    }
}
