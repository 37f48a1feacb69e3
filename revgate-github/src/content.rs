//! Repository file content

use base64::Engine as _;
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::validate::{require_non_empty, validate_path, RepoName};
use crate::{Error, GitHubClient, Result};

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Decode a contents API payload into UTF-8 text
fn decode_content(path: &str, body: ContentResponse) -> Result<String> {
    if body.kind != "file" {
        return Err(Error::Parse(format!("'{}' is a {}, not a file", path, body.kind)));
    }

    match body.encoding.as_deref() {
        Some("base64") => {}
        Some(other) => {
            return Err(Error::Parse(format!(
                "'{}' has unsupported content encoding '{}'",
                path, other
            )))
        }
        None => {
            return Err(Error::Parse(format!("'{}' has no content encoding", path)));
        }
    }

    // the API wraps base64 at 60 columns
    let encoded: String = body
        .content
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::Parse(format!("'{}' has invalid base64 content: {}", path, e)))?;

    String::from_utf8(bytes).map_err(|_| Error::Parse(format!("'{}' is not valid UTF-8 text", path)))
}

impl GitHubClient {
    /// Fetch a file's text at `git_ref`, or on the default branch when `None`
    pub async fn fetch_file_content(
        &self,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<String> {
        let repo = RepoName::parse(repo)?;
        validate_path(path)?;
        if let Some(git_ref) = git_ref {
            require_non_empty("ref", git_ref)?;
        }

        let mut url = self.repo_url(&repo, std::iter::once("contents").chain(path.split('/')))?;
        if let Some(git_ref) = git_ref {
            let mut parsed = url::Url::parse(&url)
                .map_err(|e| Error::Config(format!("Invalid content URL: {}", e)))?;
            parsed.query_pairs_mut().append_pair("ref", git_ref);
            url = parsed.into();
        }

        let response = self.http().request(&self.build(Method::GET, url)).await?;
        let content = decode_content(path, response.parse()?)?;

        debug!(repo = %repo, path, git_ref, bytes = content.len(), "Fetched file content");
        Ok(content)
    }
}
