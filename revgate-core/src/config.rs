//! Configuration management for revgate
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file (~/.config/revgate/config.toml)
//! 4. Default values
//!
//! Credentials are not part of this file; see [`crate::secrets`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::review::Disposition;
use crate::{Error, Result};

/// Deployment environment flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local or test deployment; unsigned deliveries may be accepted
    #[default]
    Development,
    /// Production deployment; a webhook secret is mandatory
    Production,
}

impl Environment {
    /// Parse an environment name. Anything other than `production` is
    /// treated as a non-production deployment.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    /// Whether this is the production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the webhook receiver binds to
    pub bind: String,

    /// Deployment environment
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            environment: Environment::Development,
        }
    }
}

/// GitHub API client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// REST API base URL
    pub api_url: String,

    /// User-Agent sent with every request
    pub user_agent: String,

    /// Timeout applied to each individual request attempt
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Overall budget for one operation, retries and backoff included
    #[serde(with = "humantime_serde")]
    pub deadline: Duration,

    /// Maximum attempts for retryable requests
    pub max_attempts: u32,

    /// Delay before the first retry; doubled for each following retry
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Page size for paginated listings
    pub per_page: u32,

    /// Upper bound on pages fetched by a single listing
    pub max_pages: u32,

    /// Cached installation tokens are refreshed this long before expiry
    #[serde(with = "humantime_serde")]
    pub token_safety_margin: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            user_agent: "revgate".to_string(),
            request_timeout: Duration::from_secs(30),
            deadline: Duration::from_secs(90),
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            per_page: 100,
            max_pages: 1000,
            token_safety_margin: Duration::from_secs(60),
        }
    }
}

/// How the review result is published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    /// Submit a pull request review
    #[default]
    Review,
    /// Post a plain issue comment
    Comment,
}

/// Review dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// File extensions (without the dot) that are sent for review.
    /// An empty list reviews every changed file.
    pub extensions: Vec<String>,

    /// Maximum concurrent content fetches per delivery
    pub fetch_concurrency: usize,

    /// Publish as a review or as a comment
    pub publish: PublishMode,

    /// Disposition used when publishing as a review
    pub disposition: Disposition,

    /// Review engine executable
    pub engine_command: String,

    /// Arguments passed to the review engine
    pub engine_args: Vec<String>,

    /// Longest a single engine run may take before it is killed
    #[serde(with = "humantime_serde")]
    pub engine_timeout: Duration,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["py".to_string()],
            fetch_concurrency: 4,
            publish: PublishMode::Review,
            disposition: Disposition::Comment,
            engine_command: "claude".to_string(),
            engine_args: vec!["--print".to_string()],
            engine_timeout: Duration::from_secs(300),
        }
    }
}

impl ReviewConfig {
    /// Whether a changed file should be sent for review
    pub fn wants(&self, filename: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !stem.ends_with('/') => self
                .extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// GitHub API configuration
    pub github: GitHubConfig,

    /// Review configuration
    pub review: ReviewConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/revgate/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("revgate").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - ENVIRONMENT: `production` or anything else
    /// - PORT: listen on 0.0.0.0:PORT
    /// - REVGATE_BIND: full bind address (wins over PORT)
    /// - GITHUB_API_URL: REST API base URL
    /// - REVGATE_REQUEST_TIMEOUT: per-request timeout in seconds
    /// - REVGATE_MAX_ATTEMPTS: maximum attempts for retryable requests
    /// - REVGATE_ENGINE_COMMAND: review engine executable
    /// - REVGATE_ENGINE_TIMEOUT: review engine timeout in seconds
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("ENVIRONMENT") {
            self.server.environment = Environment::parse(&env);
        }

        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("PORT must be a port number, got '{}'", port)))?;
            self.server.bind = format!("0.0.0.0:{}", port);
        }

        if let Some(bind) = lookup("REVGATE_BIND") {
            self.server.bind = bind;
        }

        if let Some(url) = lookup("GITHUB_API_URL") {
            self.github.api_url = url;
        }

        if let Some(timeout) = lookup("REVGATE_REQUEST_TIMEOUT") {
            let secs: u64 = timeout.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "REVGATE_REQUEST_TIMEOUT must be a number of seconds, got '{}'",
                    timeout
                ))
            })?;
            self.github.request_timeout = Duration::from_secs(secs);
        }

        if let Some(attempts) = lookup("REVGATE_MAX_ATTEMPTS") {
            self.github.max_attempts = attempts.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "REVGATE_MAX_ATTEMPTS must be a positive integer, got '{}'",
                    attempts
                ))
            })?;
        }

        if let Some(command) = lookup("REVGATE_ENGINE_COMMAND") {
            self.review.engine_command = command;
        }

        if let Some(timeout) = lookup("REVGATE_ENGINE_TIMEOUT") {
            let secs: u64 = timeout.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "REVGATE_ENGINE_TIMEOUT must be a number of seconds, got '{}'",
                    timeout
                ))
            })?;
            self.review.engine_timeout = Duration::from_secs(secs);
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, bind: Option<String>, production: bool) -> Self {
        if let Some(bind) = bind {
            self.server.bind = bind;
        }

        if production {
            self.server.environment = Environment::Production;
        }

        self
    }

    /// Load configuration with all overrides applied and validate it
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(bind: Option<String>, production: bool) -> Result<Self> {
        let config = Self::load()?
            .with_env_overrides()?
            .with_cli_overrides(bind, production);
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail later at request time
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.github.api_url).map_err(|e| {
            Error::Config(format!("Invalid GitHub API URL '{}': {}", self.github.api_url, e))
        })?;

        if self.github.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }

        if self.github.per_page == 0 || self.github.per_page > 100 {
            return Err(Error::Config(format!(
                "per_page must be between 1 and 100, got {}",
                self.github.per_page
            )));
        }

        if self.github.max_pages == 0 {
            return Err(Error::Config("max_pages must be at least 1".to_string()));
        }

        if self.review.engine_timeout.is_zero() {
            return Err(Error::Config("engine_timeout must be greater than zero".to_string()));
        }

        if self.review.fetch_concurrency == 0 {
            return Err(Error::Config(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
