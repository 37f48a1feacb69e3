//! Resilient HTTP client for the GitHub REST API
//!
//! Requests go through a [`Transport`] so the network can be swapped out.
//! [`HttpClient`] layers the retry policy, per-attempt timeouts, the overall
//! deadline and page-by-page listing on top of it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use revgate_core::GitHubConfig;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{Error, Result};

/// An outbound API request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace a header, adding it if absent
    pub fn set_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Set a JSON body
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up a header value
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Same request with `page` and `per_page` query parameters
    pub fn with_page(&self, page: u32, per_page: u32) -> Result<Self> {
        let mut url = url::Url::parse(&self.url)
            .map_err(|e| Error::Validation(format!("invalid request URL '{}': {}", self.url, e)))?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());

        let mut request = self.clone();
        request.url = url.into();
        Ok(request)
    }
}

/// A raw API response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// JSON response, for fakes
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::Parse(format!("Failed to parse GitHub response: {}", e)))
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Best-effort error message: GitHub's `message` field, else the body
    pub fn error_message(&self) -> String {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            message: String,
        }

        if let Ok(body) = serde_json::from_slice::<ErrorBody>(&self.body) {
            return body.message;
        }
        let text = self.text();
        let text = text.trim();
        if text.is_empty() {
            return format!("HTTP {}", self.status);
        }
        text.chars().take(200).collect()
    }
}

/// Network-level failure reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Sends a single request, with no retry of its own
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> std::result::Result<ApiResponse, TransportError>;
}

/// [`Transport`] backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> std::result::Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(ApiResponse::new(status, body.to_vec()))
    }
}

/// When and how often to retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for every retry after it
    pub initial_backoff: Duration,
    /// Statuses treated as transient
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            ..Self::default()
        }
    }

    /// Retries without sleeping, for tests
    pub fn no_delay(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Exactly one attempt; used for calls that must not be repeated
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_retryable_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.retryable_statuses = statuses;
        self
    }

    /// Delay after the given failed attempt (1-based): 1x, 2x, 4x, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }
}

/// HTTP client with retry, timeouts and pagination
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    request_timeout: Duration,
    deadline: Duration,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            request_timeout: Duration::from_secs(30),
            deadline: Duration::from_secs(90),
        }
    }

    /// Build from configuration
    pub fn from_config(transport: Arc<dyn Transport>, config: &GitHubConfig) -> Self {
        Self::new(
            transport,
            RetryPolicy::new(config.max_attempts, config.initial_backoff),
        )
        .with_request_timeout(config.request_timeout)
        .with_deadline(config.deadline)
    }

    /// Timeout for each individual attempt
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Budget for a whole operation, backoff included
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send with the client's retry policy; only 2xx responses are returned
    pub async fn request(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.execute(request, &self.policy).await
    }

    /// Send exactly once, for calls whose repetition would be visible
    pub async fn send_once(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.execute(request, &RetryPolicy::single_attempt()).await
    }

    /// Send with an explicit policy
    pub async fn execute(&self, request: &ApiRequest, policy: &RetryPolicy) -> Result<ApiResponse> {
        self.execute_until(request, policy, Instant::now() + self.deadline)
            .await
    }

    /// Send with an explicit policy, giving up once `deadline` has passed
    async fn execute_until(
        &self,
        request: &ApiRequest,
        policy: &RetryPolicy,
        deadline: Instant,
    ) -> Result<ApiResponse> {
        let mut attempt: u32 = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout { attempts: attempt });
            }
            attempt += 1;

            let timeout = self.request_timeout.min(remaining);
            debug!(method = %request.method, url = %request.url, attempt, "GitHub API request");

            let outcome =
                tokio::time::timeout(timeout, self.transport.send(request, timeout)).await;

            let (status, message) = match outcome {
                Ok(Ok(response)) if response.is_success() => {
                    debug!(status = response.status, url = %request.url, "GitHub API response");
                    return Ok(response);
                }
                Ok(Ok(response)) if policy.is_retryable_status(response.status) => (
                    Some(response.status),
                    format!("HTTP {}: {}", response.status, response.error_message()),
                ),
                Ok(Ok(response)) => {
                    let message = response.error_message();
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        status = response.status,
                        %message,
                        "GitHub API request failed"
                    );
                    return Err(Error::Api {
                        status: response.status,
                        message,
                    });
                }
                Ok(Err(err)) => (None, err.to_string()),
                Err(_) => (None, format!("request timed out after {:?}", timeout)),
            };

            if attempt >= policy.max_attempts {
                warn!(
                    method = %request.method,
                    url = %request.url,
                    attempts = attempt,
                    %message,
                    "GitHub API request failed after retries"
                );
                return Err(Error::Transient {
                    attempts: attempt,
                    status,
                    message,
                });
            }

            let delay = policy.backoff(attempt);
            if Instant::now() + delay >= deadline {
                warn!(url = %request.url, attempts = attempt, "Deadline reached before next retry");
                return Err(Error::Timeout { attempts: attempt });
            }

            warn!(
                url = %request.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %message,
                "Transient GitHub API failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Fetch every page of a JSON array listing
    ///
    /// Stops at the first page shorter than `per_page`, at an empty page, or
    /// after `max_pages` pages. All pages share one deadline.
    pub async fn paginate<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        per_page: u32,
        max_pages: u32,
    ) -> Result<Vec<T>> {
        let per_page = per_page.max(1);
        let deadline = Instant::now() + self.deadline;
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let paged = request.with_page(page, per_page)?;
            let response = self.execute_until(&paged, &self.policy, deadline).await?;
            let batch: Vec<T> = response.parse()?;
            let fetched = batch.len();
            items.extend(batch);

            debug!(url = %request.url, page, fetched, total = items.len(), "Fetched page");

            if fetched < per_page as usize {
                break;
            }
            if page >= max_pages {
                warn!(url = %request.url, max_pages, "Stopped paginating at page limit");
                break;
            }
            page += 1;
        }

        Ok(items)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("policy", &self.policy)
            .field("request_timeout", &self.request_timeout)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use serde_json::json;

    fn get(url: &str) -> ApiRequest {
        ApiRequest::new(Method::GET, url)
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(RetryPolicy::no_delay(3).backoff(2), Duration::ZERO);
    }

    #[test]
    fn test_retryable_statuses() {
        let policy = RetryPolicy::default();
        for status in [429, 500, 502, 503, 504] {
            assert!(policy.is_retryable_status(status));
        }
        for status in [400, 401, 403, 404, 422, 501] {
            assert!(!policy.is_retryable_status(status));
        }
    }

    #[test]
    fn test_with_page_keeps_existing_query() {
        let request = get("https://api.github.com/repos/o/r/pulls/1/files?state=all");
        let paged = request.with_page(3, 100).unwrap();
        assert_eq!(
            paged.url,
            "https://api.github.com/repos/o/r/pulls/1/files?state=all&page=3&per_page=100"
        );
    }

    #[test]
    fn test_error_message() {
        let body = ApiResponse::json(404, &json!({"message": "Not Found"}));
        assert_eq!(body.error_message(), "Not Found");
        assert_eq!(ApiResponse::new(502, "").error_message(), "HTTP 502");
        assert_eq!(ApiResponse::new(500, "oops").error_message(), "oops");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_status_with_growing_delays() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            Ok(ApiResponse::new(503, "")),
            Ok(ApiResponse::new(503, "")),
            Ok(ApiResponse::json(200, &json!({"ok": true}))),
        ]));
        let client = HttpClient::new(transport.clone(), RetryPolicy::default());

        let response = client.request(&get("https://api.test/x")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.call_count(), 3);

        let times = transport.call_times();
        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert_eq!(first_gap, Duration::from_secs(1));
        assert_eq!(second_gap, Duration::from_secs(2));
        assert!(second_gap >= first_gap);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let transport = Arc::new(FakeTransport::scripted(vec![Ok(ApiResponse::json(
            404,
            &json!({"message": "Not Found"}),
        ))]));
        let client = HttpClient::new(transport.clone(), RetryPolicy::no_delay(3));

        let err = client.request(&get("https://api.test/x")).await.unwrap_err();
        assert_eq!(transport.call_count(), 1);
        assert!(matches!(err, Error::Api { status: 404, .. }));
        assert_eq!(err.kind(), crate::ErrorKind::PermanentApi);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_transient() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            Err(TransportError::Network("connection reset".into())),
            Ok(ApiResponse::new(502, "")),
            Ok(ApiResponse::new(429, "")),
            Ok(ApiResponse::new(200, "")),
        ]));
        let client = HttpClient::new(transport.clone(), RetryPolicy::no_delay(3));

        let err = client.request(&get("https://api.test/x")).await.unwrap_err();
        assert_eq!(transport.call_count(), 3);
        match err {
            Error::Transient {
                attempts, status, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(status, Some(429));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_once_never_retries() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            Ok(ApiResponse::new(503, "")),
            Ok(ApiResponse::new(201, "{}")),
        ]));
        let client = HttpClient::new(transport.clone(), RetryPolicy::no_delay(3));

        let err = client.send_once(&get("https://api.test/x")).await.unwrap_err();
        assert_eq!(transport.call_count(), 1);
        assert_eq!(err.kind(), crate::ErrorKind::TransientNetwork);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_transport_hits_attempt_timeout() {
        let transport = Arc::new(
            FakeTransport::scripted(vec![Ok(ApiResponse::new(200, "")); 3])
                .with_latency(Duration::from_secs(60)),
        );
        let client = HttpClient::new(transport.clone(), RetryPolicy::no_delay(2))
            .with_request_timeout(Duration::from_secs(5));

        let err = client.request(&get("https://api.test/x")).await.unwrap_err();
        assert_eq!(transport.call_count(), 2);
        assert!(matches!(err, Error::Transient { attempts: 2, status: None, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_retrying() {
        let transport = Arc::new(FakeTransport::scripted(vec![Ok(ApiResponse::new(503, "")); 5]));
        let client = HttpClient::new(transport.clone(), RetryPolicy::new(5, Duration::from_secs(4)))
            .with_deadline(Duration::from_secs(10));

        // attempts at t=0 and t=4; the next backoff (8s) would end past t=10
        let err = client.request(&get("https://api.test/x")).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_paginate_stops_on_short_page() {
        let transport = Arc::new(FakeTransport::new(|request| {
            let page = crate::testing::query_param(&request.url, "page")
                .and_then(|p| p.parse::<u32>().ok())
                .unwrap_or(1);
            let start = (page - 1) * 2;
            let end = (start + 2).min(5);
            let items: Vec<u32> = (start..end).collect();
            Ok(ApiResponse::json(200, &json!(items)))
        }));
        let client = HttpClient::new(transport.clone(), RetryPolicy::no_delay(1));

        let items: Vec<u32> = client
            .paginate(&get("https://api.test/items"), 2, 1000)
            .await
            .unwrap();
        assert_eq!(items, vec![0, 1, 2, 3, 4]);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_paginate_stops_on_empty_page_and_page_limit() {
        let exact = Arc::new(FakeTransport::new(|request| {
            let page = crate::testing::query_param(&request.url, "page").unwrap_or_default();
            let items: Vec<u32> = if page == "1" { vec![1, 2] } else { vec![] };
            Ok(ApiResponse::json(200, &json!(items)))
        }));
        let client = HttpClient::new(exact.clone(), RetryPolicy::no_delay(1));
        let items: Vec<u32> = client.paginate(&get("https://api.test/items"), 2, 1000).await.unwrap();
        assert_eq!(items, vec![1, 2]);
        assert_eq!(exact.call_count(), 2);

        let endless = Arc::new(FakeTransport::new(|_| Ok(ApiResponse::json(200, &json!([1, 2])))));
        let client = HttpClient::new(endless.clone(), RetryPolicy::no_delay(1));
        let items: Vec<u32> = client.paginate(&get("https://api.test/items"), 2, 4).await.unwrap();
        assert_eq!(items.len(), 8);
        assert_eq!(endless.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paginate_shares_one_deadline() {
        let transport = Arc::new(
            FakeTransport::new(|_| Ok(ApiResponse::json(200, &json!([1, 2]))))
                .with_latency(Duration::from_secs(4)),
        );
        let client = HttpClient::new(transport.clone(), RetryPolicy::no_delay(3))
            .with_deadline(Duration::from_secs(10));

        // pages 1 and 2 finish at t=8; page 3 is cut off at t=10
        let err = client
            .paginate::<u32>(&get("https://api.test/items"), 2, 1000)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(transport.call_count(), 3);
    }
}
