//! GitHub App authentication
//!
//! The app signs a short-lived RS256 assertion with its private key and
//! exchanges it for an installation access token. Tokens are cached per
//! installation until they come within the safety margin of expiry.
//!
//! Each installation has its own slot guarded by an async mutex, so two
//! deliveries for the same installation that miss the cache together result
//! in a single exchange: the second one waits and then finds the fresh token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Method;
use revgate_core::AppCredentials;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::{API_VERSION, API_VERSION_HEADER, JSON_MEDIA_TYPE};
use crate::http::{ApiRequest, HttpClient};
use crate::{Error, Result};

/// Lifetime of a signed assertion; GitHub rejects anything longer
pub const ASSERTION_LIFETIME_SECS: i64 = 600;

/// Claims of the app assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expiry, seconds since the epoch
    pub exp: i64,
    /// Application id
    pub iss: String,
}

/// Sign an assertion for the app, valid from `now` for ten minutes
pub fn sign_assertion(credentials: &AppCredentials, now: DateTime<Utc>) -> Result<String> {
    let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
        .map_err(|e| Error::Auth(format!("Invalid GitHub App private key: {}", e)))?;

    let iat = now.timestamp();
    let claims = AssertionClaims {
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
        iss: credentials.app_id.clone(),
    };

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| Error::Auth(format!("Failed to sign app assertion: {}", e)))
}

/// Installation access token
#[derive(Clone, PartialEq, Eq)]
pub struct InstallationToken {
    pub installation_id: u64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    /// Usable for at least `margin` more
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let Ok(margin) = chrono::Duration::from_std(margin) else {
            return false;
        };
        match now.checked_add_signed(margin) {
            Some(threshold) => threshold < self.expires_at,
            None => false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("installation_id", &self.installation_id)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Swaps a signed assertion for an installation token
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, installation_id: u64, assertion: &str) -> Result<InstallationToken>;
}

/// Token exchange against the GitHub REST API
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    http: Arc<HttpClient>,
    api_url: String,
    user_agent: String,
}

impl HttpTokenExchange {
    pub fn new(http: Arc<HttpClient>, api_url: &str, user_agent: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
        }
    }
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, installation_id: u64, assertion: &str) -> Result<InstallationToken> {
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, installation_id
        );
        let request = ApiRequest::new(Method::POST, url)
            .header("Authorization", format!("Bearer {}", assertion))
            .header("Accept", JSON_MEDIA_TYPE)
            .header(API_VERSION_HEADER, API_VERSION)
            .header("User-Agent", self.user_agent.as_str());

        let response = self.http.request(&request).await.map_err(|e| match e {
            Error::Api { status, message } if matches!(status, 401 | 403 | 404 | 422) => {
                Error::Auth(format!(
                    "Token exchange for installation {} refused ({}): {}",
                    installation_id, status, message
                ))
            }
            other => other,
        })?;

        let body: AccessTokenResponse = response.parse()?;
        Ok(InstallationToken {
            installation_id,
            token: body.token,
            expires_at: body.expires_at,
        })
    }
}

type TokenSlot = Arc<tokio::sync::Mutex<Option<InstallationToken>>>;

/// Mints and caches installation tokens
pub struct AppAuthenticator {
    credentials: Option<AppCredentials>,
    exchanger: Arc<dyn TokenExchange>,
    safety_margin: Duration,
    slots: DashMap<u64, TokenSlot>,
}

impl AppAuthenticator {
    pub fn new(credentials: Option<AppCredentials>, exchanger: Arc<dyn TokenExchange>) -> Self {
        Self {
            credentials,
            exchanger,
            safety_margin: Duration::from_secs(60),
            slots: DashMap::new(),
        }
    }

    /// Refresh tokens this long before they expire
    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Get a token for the installation, exchanging a new one if needed
    pub async fn get_installation_token(&self, installation_id: u64) -> Result<InstallationToken> {
        // clone the slot out so the map shard is not held across an await
        let slot = self
            .slots
            .entry(installation_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone();

        let mut cached = slot.lock().await;

        if let Some(ref token) = *cached {
            if token.is_fresh(Utc::now(), self.safety_margin) {
                debug!(installation_id, "Installation token cache hit");
                return Ok(token.clone());
            }
            debug!(installation_id, expires_at = %token.expires_at, "Evicting stale installation token");
            *cached = None;
        }

        self.prune();

        let credentials = self.credentials.as_ref().ok_or_else(|| {
            Error::Config(
                "GitHub App credentials are not configured (GITHUB_APP_ID and GITHUB_PRIVATE_KEY)"
                    .to_string(),
            )
        })?;

        let assertion = sign_assertion(credentials, Utc::now())?;
        let token = self.exchanger.exchange(installation_id, &assertion).await?;

        if token.is_expired(Utc::now()) {
            warn!(installation_id, expires_at = %token.expires_at, "Exchanged token is already expired");
            return Err(Error::Auth(format!(
                "Installation token for {} expired at {}",
                installation_id, token.expires_at
            )));
        }

        info!(installation_id, expires_at = %token.expires_at, "Obtained installation token");
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Remove slots that hold no fresh token and that no caller is using
    ///
    /// A slot is only dropped while its `Arc` is unshared; the map shard lock
    /// held by `retain` keeps new callers from cloning it in the meantime.
    pub fn prune(&self) {
        let now = Utc::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(cached) => cached
                    .as_ref()
                    .is_some_and(|token| token.is_fresh(now, self.safety_margin)),
                Err(_) => true,
            }
        });
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            debug!(removed, "Pruned idle installation token slots");
        }
    }

    /// Drop a cached token, e.g. after the platform rejected it
    pub async fn invalidate(&self, installation_id: u64) {
        let slot = self.slots.get(&installation_id).map(|s| s.value().clone());
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }
}

impl std::fmt::Debug for AppAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppAuthenticator")
            .field("has_credentials", &self.credentials.is_some())
            .field("safety_margin", &self.safety_margin)
            .field("cached_installations", &self.slots.len())
            .finish_non_exhaustive()
    }
}
