//! Credential store for revgate
//!
//! Secrets are stored separately from configuration to avoid accidental sharing.
//! The secrets file is located at `~/.config/revgate/secrets.toml` and must have
//! restrictive permissions (0600 on Unix).
//!
//! Loading priority:
//! 1. Environment variables (GITHUB_APP_ID, GITHUB_PRIVATE_KEY,
//!    GITHUB_PRIVATE_KEY_PATH, GITHUB_WEBHOOK_SECRET)
//! 2. Secrets file (~/.config/revgate/secrets.toml)
//!
//! The webhook secret is never captured once: it is handed out through a
//! [`SecretSource`], and the environment-backed source reads the variable
//! again on every call so the secret can be rotated without a restart.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Environment variable holding the webhook shared secret
pub const WEBHOOK_SECRET_VAR: &str = "GITHUB_WEBHOOK_SECRET";

/// Secrets structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    /// GitHub App configuration
    pub github: GitHubSecrets,
}

/// GitHub App secrets
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubSecrets {
    /// GitHub App id
    pub app_id: Option<String>,
    /// Inline PEM private key
    pub private_key: Option<String>,
    /// Path to a PEM private key
    pub private_key_path: Option<PathBuf>,
    /// Webhook shared secret
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for GitHubSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubSecrets")
            .field("app_id", &self.app_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("private_key_path", &self.private_key_path)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// PEM-encoded application signing key
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    /// Raw PEM bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// GitHub App identity used to mint signed assertions
#[derive(Debug, Clone)]
pub struct AppCredentials {
    /// Application id, used as the assertion issuer
    pub app_id: String,
    /// Signing key
    pub private_key: PrivateKey,
}

impl AppCredentials {
    pub fn new(app_id: impl Into<String>, private_key: PrivateKey) -> Self {
        Self {
            app_id: app_id.into(),
            private_key,
        }
    }
}

/// Supplies the current webhook secret
///
/// `None` is an explicit "no secret configured" state, not an error.
pub trait SecretSource: Send + Sync {
    /// Read the secret as it is right now
    fn webhook_secret(&self) -> Option<String>;
}

/// Reads the webhook secret from an environment variable on every call
#[derive(Debug, Clone)]
pub struct EnvSecretSource {
    var: String,
    fallback: Option<String>,
}

impl EnvSecretSource {
    /// Read from the given variable
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            fallback: None,
        }
    }

    /// Value used when the variable is unset or blank (typically the secrets file)
    pub fn with_fallback(mut self, fallback: Option<String>) -> Self {
        self.fallback = fallback.and_then(non_empty);
        self
    }
}

impl Default for EnvSecretSource {
    fn default() -> Self {
        Self::new(WEBHOOK_SECRET_VAR)
    }
}

impl SecretSource for EnvSecretSource {
    fn webhook_secret(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .and_then(non_empty)
            .or_else(|| self.fallback.clone())
    }
}

/// A fixed webhook secret, for tests and embedded use
#[derive(Debug, Clone, Default)]
pub struct StaticSecretSource(Option<String>);

impl StaticSecretSource {
    pub fn new(secret: Option<String>) -> Self {
        Self(secret.and_then(non_empty))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl SecretSource for StaticSecretSource {
    fn webhook_secret(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Blank values count as unset; anything else is kept byte for byte
fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn trimmed(value: String) -> Option<String> {
    non_empty(value.trim().to_string())
}

impl Secrets {
    /// Load secrets from the default location
    ///
    /// Returns default (empty) secrets if file doesn't exist
    pub fn load() -> Result<Self> {
        let secrets_path = Self::default_secrets_path();

        if let Some(path) = secrets_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load secrets from a specific file with permission checking
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        // Check file permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata = std::fs::metadata(path).map_err(Error::Io)?;
            let mode = metadata.permissions().mode();

            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }

            debug!(path = %path.display(), mode = format!("{:o}", mode & 0o777), "Secrets file permissions OK");
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        let github = &mut secrets.github;
        github.app_id = github.app_id.take().and_then(trimmed);
        github.webhook_secret = github.webhook_secret.take().and_then(non_empty);
        github.private_key = github
            .private_key
            .take()
            .filter(|key| !key.trim().is_empty());

        Ok(secrets)
    }

    /// Get the default secrets file path
    ///
    /// Returns `~/.config/revgate/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("revgate").join("secrets.toml"))
    }

    /// GitHub App id, GITHUB_APP_ID wins over the secrets file
    pub fn app_id(&self) -> Option<String> {
        if let Some(id) = std::env::var("GITHUB_APP_ID").ok().and_then(trimmed) {
            debug!("Using GitHub App id from GITHUB_APP_ID environment variable");
            return Some(id);
        }
        self.github.app_id.clone()
    }

    /// GitHub App private key
    ///
    /// Priority: GITHUB_PRIVATE_KEY > GITHUB_PRIVATE_KEY_PATH > secrets file
    /// inline key > secrets file key path
    pub fn private_key(&self) -> Result<Option<PrivateKey>> {
        if let Ok(pem) = std::env::var("GITHUB_PRIVATE_KEY") {
            if !pem.trim().is_empty() {
                debug!("Using GitHub App private key from GITHUB_PRIVATE_KEY");
                return Ok(Some(PrivateKey::new(unescape_newlines(&pem))));
            }
        }

        if let Ok(path) = std::env::var("GITHUB_PRIVATE_KEY_PATH") {
            if !path.trim().is_empty() {
                return read_key_file(Path::new(path.trim())).map(Some);
            }
        }

        if let Some(ref pem) = self.github.private_key {
            return Ok(Some(PrivateKey::new(unescape_newlines(pem))));
        }

        if let Some(ref path) = self.github.private_key_path {
            return read_key_file(path).map(Some);
        }

        Ok(None)
    }

    /// App credentials when both the id and the key are configured
    ///
    /// A partially configured app is reported, but is not an error here:
    /// the missing piece only matters once an authenticated call is made.
    pub fn app_credentials(&self) -> Result<Option<AppCredentials>> {
        let app_id = self.app_id();
        let key = self.private_key()?;

        match (app_id, key) {
            (Some(app_id), Some(key)) => Ok(Some(AppCredentials::new(app_id, key))),
            (None, None) => Ok(None),
            (app_id, key) => {
                warn!(
                    app_id_set = app_id.is_some(),
                    private_key_set = key.is_some(),
                    "GitHub App credentials are incomplete"
                );
                Ok(None)
            }
        }
    }

    /// Webhook secret source: the environment, re-read on every call,
    /// falling back to the secrets file
    pub fn webhook_secret_source(&self) -> EnvSecretSource {
        EnvSecretSource::default().with_fallback(self.github.webhook_secret.clone())
    }
}

/// Keys passed through single-line env vars often carry literal `\n`
fn unescape_newlines(pem: &str) -> String {
    if pem.contains("\\n") && !pem.contains('\n') {
        pem.replace("\\n", "\n")
    } else {
        pem.to_string()
    }
}

fn read_key_file(path: &Path) -> Result<PrivateKey> {
    let pem = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read GitHub App private key from {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(PrivateKey::new(pem))
}
