//! Review engine abstraction

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::ReviewRequest;
use crate::{Error, Result};

/// Produces review text for a pull request
#[async_trait]
pub trait ReviewEngine: Send + Sync {
    /// Get the name of this engine
    fn name(&self) -> &'static str;

    /// Review the request and return markdown text
    async fn review(&self, request: &ReviewRequest) -> Result<String>;
}

/// Engine backed by an external command
///
/// The rendered prompt is written to the command's stdin and its stdout is
/// the review text. The default command is `claude --print`. A run that
/// outlives the timeout is killed and reported as an engine failure.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessEngine {
    /// Create an engine that runs `command` with `args`
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            timeout: Duration::from_secs(300),
        }
    }

    /// Upper bound on a single engine run
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The executable this engine runs
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new("claude", vec!["--print".to_string()])
    }
}

#[async_trait]
impl ReviewEngine for ProcessEngine {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn review(&self, request: &ReviewRequest) -> Result<String> {
        let prompt = request.to_prompt();

        debug!(
            command = %self.command,
            repo = %request.repo,
            pr_number = request.pr_number,
            prompt_len = prompt.len(),
            "Invoking review engine"
        );

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::Engine(format!(
                        "Review engine executable not found at '{}'",
                        self.command
                    ))
                } else {
                    Error::Io(e)
                }
            })?;

        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            // an engine that exits early closes the pipe; its exit status says why
            match stdin.write_all(prompt.as_bytes()).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                // dropping stdin signals end of prompt
                _ => Ok(()),
            }
        };

        // stdout is drained while the prompt is still being written
        let run = async { tokio::try_join!(feed, child.wait_with_output()) };

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result?.1,
            Err(_) => {
                // dropping the child kills it
                warn!(command = %self.command, timeout = ?self.timeout, "Review engine timed out");
                return Err(Error::Engine(format!(
                    "'{}' timed out after {:?}",
                    self.command, self.timeout
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "Review engine exited with failure");
            return Err(Error::Engine(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(Error::Engine("review engine returned no output".to_string()));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::FileForReview;

    fn request() -> ReviewRequest {
        ReviewRequest::new("octo/widgets", 3).with_title("Tidy")
    }

    #[test]
    fn test_default_engine() {
        let engine = ProcessEngine::default();
        assert_eq!(engine.command(), "claude");
        assert_eq!(engine.name(), "process");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_echoes_prompt_through_cat() {
        let engine = ProcessEngine::new("cat", vec![]);
        let text = engine.review(&request()).await.unwrap();
        assert!(text.starts_with("# Code Review Request: octo/widgets #3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_failure_is_reported() {
        let engine = ProcessEngine::new("false", vec![]);
        let err = engine.review(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_prompt_does_not_block_on_pipes() {
        // well past the pipe buffer in both directions
        let content = "x = 1\n".repeat(100_000);
        let request = request().with_files(vec![FileForReview::fetched(
            "big.py",
            "modified",
            content.clone(),
        )]);
        let engine = ProcessEngine::new("cat", vec![]).with_timeout(Duration::from_secs(30));

        let text = engine.review(&request).await.unwrap();
        assert!(text.contains(&content));
        assert!(text.starts_with("# Code Review Request: octo/widgets #3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let engine = ProcessEngine::new("sleep", vec!["30".to_string()])
            .with_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = engine.review(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let engine = ProcessEngine::new("/nonexistent/revgate-engine", vec![]);
        let err = engine.review(&request()).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
