//! Fakes for driving the router end to end

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use base64::Engine as _;
use revgate_core::{
    AppCredentials, Environment, GitHubConfig, PrivateKey, ReviewConfig, ReviewEngine,
    ReviewRequest, StaticSecretSource,
};
use revgate_github::{
    AppAuthenticator, ApiRequest, ApiResponse, HttpClient, HttpTokenExchange, RetryPolicy,
    SignatureVerifier, Transport, TransportError,
};
use serde_json::json;

use crate::dispatch::Dispatcher;
use crate::routes::{router, AppState};

pub const SECRET: &str = "test-webhook-secret";
pub const INSTALLATION_ID: u64 = 555;
pub const REPO: &str = "octo/widgets";
pub const PR_NUMBER: u64 = 12;
pub const HEAD_SHA: &str = "abc123";

const TEST_KEY: &str = include_str!("../../testdata/app_key.pem");

struct FakeFile {
    filename: String,
    status: String,
    content: Option<String>,
}

/// In-memory GitHub API
pub struct FakeGitHub {
    files: Vec<FakeFile>,
    exchange_status: u16,
    publish_status: u16,
    calls: Mutex<Vec<ApiRequest>>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            exchange_status: 201,
            publish_status: 200,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Add a changed file; `None` content makes the contents call 404
    pub fn with_file(mut self, filename: &str, status: &str, content: Option<&str>) -> Self {
        self.files.push(FakeFile {
            filename: filename.to_string(),
            status: status.to_string(),
            content: content.map(str::to_string),
        });
        self
    }

    pub fn with_exchange_status(mut self, status: u16) -> Self {
        self.exchange_status = status;
        self
    }

    pub fn with_publish_status(mut self, status: u16) -> Self {
        self.publish_status = status;
        self
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls with the given method whose path contains `fragment`
    pub fn count(&self, method: Method, fragment: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && path_of(&c.url).contains(fragment))
            .count()
    }

    fn respond(&self, request: &ApiRequest) -> ApiResponse {
        let path = path_of(&request.url);

        if request.method == Method::POST && path.ends_with("/access_tokens") {
            if self.exchange_status >= 300 {
                return ApiResponse::json(self.exchange_status, &json!({"message": "Bad credentials"}));
            }
            let expires_at = chrono::Utc::now() + chrono::Duration::hours(1);
            return ApiResponse::json(
                self.exchange_status,
                &json!({"token": "ghs_fake", "expires_at": expires_at.to_rfc3339()}),
            );
        }

        if request.method == Method::GET && path.ends_with("/files") {
            let files: Vec<_> = self
                .files
                .iter()
                .map(|f| {
                    json!({
                        "filename": f.filename,
                        "status": f.status,
                        "additions": 3,
                        "deletions": 1,
                        "changes": 4
                    })
                })
                .collect();
            return ApiResponse::json(200, &json!(files));
        }

        if request.method == Method::GET {
            if let Some((_, file_path)) = path.split_once("/contents/") {
                let found = self
                    .files
                    .iter()
                    .find(|f| f.filename == file_path)
                    .and_then(|f| f.content.as_ref());
                return match found {
                    Some(text) => ApiResponse::json(
                        200,
                        &json!({
                            "type": "file",
                            "encoding": "base64",
                            "content": base64::engine::general_purpose::STANDARD.encode(text),
                        }),
                    ),
                    None => ApiResponse::json(404, &json!({"message": "Not Found"})),
                };
            }
        }

        if request.method == Method::POST && (path.ends_with("/reviews") || path.ends_with("/comments")) {
            return ApiResponse::json(self.publish_status, &json!({"id": 1, "message": "publish result"}));
        }

        ApiResponse::json(404, &json!({"message": "Not Found"}))
    }
}

fn path_of(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or(url);
    without_query
        .strip_prefix("https://api.github.com")
        .unwrap_or(without_query)
}

#[async_trait]
impl Transport for FakeGitHub {
    async fn send(
        &self,
        request: &ApiRequest,
        _timeout: Duration,
    ) -> Result<ApiResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        Ok(self.respond(request))
    }
}

/// Review engine that returns a canned reply and records its input
pub struct FakeEngine {
    reply: Result<String, String>,
    requests: Mutex<Vec<ReviewRequest>>,
}

impl FakeEngine {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ReviewRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn review(&self, request: &ReviewRequest) -> revgate_core::Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.reply.clone().map_err(revgate_core::Error::Engine)
    }
}

/// Router wired to fakes
pub struct Harness {
    pub github: Arc<FakeGitHub>,
    pub engine: Arc<FakeEngine>,
    pub app: axum::Router,
}

impl Harness {
    pub fn new(github: FakeGitHub, engine: FakeEngine) -> Self {
        Self::with_options(
            github,
            engine,
            ReviewConfig::default(),
            Environment::Production,
            Some(SECRET),
        )
    }

    pub fn with_options(
        github: FakeGitHub,
        engine: FakeEngine,
        review: ReviewConfig,
        environment: Environment,
        secret: Option<&str>,
    ) -> Self {
        let github = Arc::new(github);
        let engine = Arc::new(engine);

        let http = Arc::new(HttpClient::new(github.clone(), RetryPolicy::no_delay(3)));
        let exchange = Arc::new(HttpTokenExchange::new(
            http.clone(),
            "https://api.github.com",
            "revgate",
        ));
        let credentials = AppCredentials::new("12345", PrivateKey::new(TEST_KEY));
        let authenticator = Arc::new(AppAuthenticator::new(Some(credentials), exchange));
        let verifier = SignatureVerifier::new(
            Arc::new(StaticSecretSource::new(secret.map(str::to_string))),
            environment,
        );

        let dispatcher = Dispatcher::new(
            verifier,
            authenticator,
            http,
            engine.clone(),
            GitHubConfig::default(),
            review,
        );

        Self {
            github,
            engine,
            app: router(AppState::new(dispatcher)),
        }
    }
}

/// A `pull_request` payload for the test repository
pub fn pr_payload(action: &str) -> String {
    json!({
        "action": action,
        "number": PR_NUMBER,
        "installation": {"id": INSTALLATION_ID},
        "repository": {"full_name": REPO},
        "pull_request": {
            "number": PR_NUMBER,
            "title": "Add request handler",
            "head": {"sha": HEAD_SHA, "ref": "feature"}
        }
    })
    .to_string()
}

/// A signed webhook request
pub fn signed(event: &str, body: &str) -> Request<Body> {
    let signature = revgate_github::sign(SECRET, body.as_bytes());
    delivery(event, body, Some(&signature))
}

pub fn delivery(event: &str, body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("x-github-event", event)
        .header("x-github-delivery", "delivery-1");
    if let Some(signature) = signature {
        builder = builder.header("x-hub-signature-256", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
