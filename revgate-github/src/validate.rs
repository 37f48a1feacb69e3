//! Input validation for gateway operations
//!
//! Everything here runs before a request is built, so invalid input never
//! costs a network call.

use crate::{Error, Result};

/// Repository identifier in `owner/name` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoName<'a> {
    pub owner: &'a str,
    pub name: &'a str,
}

impl<'a> RepoName<'a> {
    /// Parse and validate an `owner/name` identifier
    pub fn parse(repo: &'a str) -> Result<Self> {
        let (owner, name) = repo.split_once('/').ok_or_else(|| {
            Error::Validation(format!(
                "repo must be in 'owner/name' format, got '{}'",
                repo
            ))
        })?;

        for (label, segment) in [("owner", owner), ("name", name)] {
            if segment.is_empty() {
                return Err(Error::Validation(format!(
                    "repo {} must not be empty in '{}'",
                    label, repo
                )));
            }
            if segment == "." || segment == ".." {
                return Err(Error::Validation(format!(
                    "repo {} '{}' is not allowed",
                    label, segment
                )));
            }
            if let Some(bad) = segment
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            {
                return Err(Error::Validation(format!(
                    "repo {} contains invalid character {:?} in '{}'",
                    label, bad, repo
                )));
            }
        }

        Ok(Self { owner, name })
    }
}

impl std::fmt::Display for RepoName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Pull request numbers start at 1
pub fn validate_pr_number(pr_number: u64) -> Result<()> {
    if pr_number == 0 {
        return Err(Error::Validation(
            "pr_number must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// Reject empty or whitespace-only text fields
pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must be a non-empty string", field)));
    }
    Ok(())
}

/// Validate a repository file path
pub fn validate_path(path: &str) -> Result<()> {
    require_non_empty("path", path)?;
    if path.starts_with('/') {
        return Err(Error::Validation(format!(
            "path must be relative to the repository root, got '{}'",
            path
        )));
    }
    if path.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(Error::Validation(format!("path '{}' is not a valid file path", path)));
    }
    Ok(())
}

/// Line numbers start at 1
pub fn validate_line(line: u64) -> Result<()> {
    if line == 0 {
        return Err(Error::Validation("line must be a positive integer".to_string()));
    }
    Ok(())
}
