//! HTTP routes
//!
//! - `GET /` service index
//! - `GET /health` liveness, no external calls
//! - `POST /webhook` GitHub deliveries

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use revgate_github::SIGNATURE_HEADER;
use serde_json::{json, Value};
use tracing::{info_span, Instrument};

use crate::dispatch::{DispatchOutcome, Dispatcher, WebhookDelivery};
use crate::payload::{DELIVERY_HEADER, EVENT_HEADER};

/// GitHub caps deliveries at 25 MB
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

const SERVICE_NAME: &str = "revgate";

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn index() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "webhook": "/webhook",
            "health": "/health",
        },
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// POST /webhook
async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let delivery = WebhookDelivery {
        delivery_id: header(&headers, DELIVERY_HEADER)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        event_type: header(&headers, EVENT_HEADER),
        signature: header(&headers, SIGNATURE_HEADER),
        raw_body: body.to_vec(),
    };

    let span = info_span!(
        "delivery",
        delivery_id = %delivery.delivery_id,
        event = delivery.event_type.as_deref().unwrap_or("-"),
    );

    match state.dispatcher.dispatch(&delivery).instrument(span).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome_body(&delivery.delivery_id, outcome))).into_response(),
        Err(failure) => failure.into_response(),
    }
}

fn outcome_body(delivery_id: &str, outcome: DispatchOutcome) -> Value {
    match outcome {
        DispatchOutcome::Pong => json!({"status": "pong", "delivery_id": delivery_id}),
        DispatchOutcome::Ignored { action } => json!({
            "status": "ignored",
            "action": action,
            "delivery_id": delivery_id,
        }),
        DispatchOutcome::Unsupported { event } => json!({
            "status": "unsupported_event",
            "event": event,
            "delivery_id": delivery_id,
        }),
        DispatchOutcome::Reviewed(summary) => json!({
            "status": "success",
            "delivery_id": delivery_id,
            "repository": summary.repository,
            "pr_number": summary.pr_number,
            "files_reviewed": summary.files_reviewed,
            "files_failed": summary.files_failed,
            "stage": summary.stage,
        }),
    }
}
