//! Webhook payload shapes
//!
//! Only the fields the dispatcher reads are modelled; everything else in a
//! delivery is ignored.

use serde::Deserialize;

/// Header naming the event type
pub const EVENT_HEADER: &str = "x-github-event";

/// Header carrying the unique delivery id
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// Pull request actions that trigger a review
pub const REVIEW_ACTIONS: &[&str] = &["opened", "synchronize", "reopened"];

/// `pull_request` event payload
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub installation: Option<Installation>,
    pub repository: Repository,
    pub pull_request: PullRequestPayload,
}

impl PullRequestEvent {
    /// Whether the action should trigger a review
    pub fn wants_review(&self) -> bool {
        REVIEW_ACTIONS.contains(&self.action.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub head: Option<HeadRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadRef {
    pub sha: String,
}
