//! Webhook dispatcher
//!
//! Each delivery runs through a small state machine:
//!
//! ```text
//! Received -> Verified -> Authenticated -> Fetched -> Reviewed -> Published
//!     |           |             |             |           |
//!  Rejected    Failed        Failed        Failed      Failed
//! ```
//!
//! Verification and authentication failures abort the delivery. A file
//! whose content cannot be fetched does not: it reaches the review engine
//! flagged as missing. The publish call is made once and never retried.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use revgate_core::{
    FileForReview, GitHubConfig, PublishMode, ReviewConfig, ReviewEngine, ReviewRequest,
    StateMachine, Workflow,
};
use revgate_github::validate::validate_pr_number;
use revgate_github::{
    AppAuthenticator, FileStatus, GitHubClient, HttpClient, PullRequestFileRef, RepoName,
    ReviewSubmission, SignatureVerifier,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{DispatchError, DispatchFailure};
use crate::payload::PullRequestEvent;

/// Appended to every published body
pub const REVIEW_FOOTER: &str =
    "\n\n---\n_Automated review by revgate. Findings may be incomplete; use your judgement._";

/// Stage a delivery has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStage {
    Received,
    Verified,
    Authenticated,
    Fetched,
    Reviewed,
    Published,
    Rejected,
    Failed,
}

impl DeliveryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStage::Received => "received",
            DeliveryStage::Verified => "verified",
            DeliveryStage::Authenticated => "authenticated",
            DeliveryStage::Fetched => "fetched",
            DeliveryStage::Reviewed => "reviewed",
            DeliveryStage::Published => "published",
            DeliveryStage::Rejected => "rejected",
            DeliveryStage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition table for one delivery
pub fn delivery_workflow() -> StateMachine<DeliveryStage> {
    use DeliveryStage::*;

    StateMachine::new(Received)
        .add_transitions(vec![
            (Received, Verified),
            (Verified, Authenticated),
            (Authenticated, Fetched),
            (Fetched, Reviewed),
            (Reviewed, Published),
            (Received, Rejected),
        ])
        .add_transition_from_any(&[Received, Verified, Authenticated, Fetched, Reviewed], Failed)
        .with_terminal(vec![Published, Rejected, Failed])
}

/// An inbound delivery, before anything has been trusted
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub delivery_id: String,
    pub event_type: Option<String>,
    pub signature: Option<String>,
    pub raw_body: Vec<u8>,
}

/// Result of a completed review
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub repository: String,
    pub pr_number: u64,
    pub files_reviewed: usize,
    pub files_failed: usize,
    pub stage: DeliveryStage,
}

/// How a verified delivery was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Pong,
    Ignored { action: String },
    Unsupported { event: String },
    Reviewed(ReviewSummary),
}

/// Runs deliveries from verification to publication
pub struct Dispatcher {
    verifier: SignatureVerifier,
    authenticator: Arc<AppAuthenticator>,
    http: Arc<HttpClient>,
    engine: Arc<dyn ReviewEngine>,
    github: GitHubConfig,
    review: ReviewConfig,
}

impl Dispatcher {
    pub fn new(
        verifier: SignatureVerifier,
        authenticator: Arc<AppAuthenticator>,
        http: Arc<HttpClient>,
        engine: Arc<dyn ReviewEngine>,
        github: GitHubConfig,
        review: ReviewConfig,
    ) -> Self {
        Self {
            verifier,
            authenticator,
            http,
            engine,
            github,
            review,
        }
    }

    /// Process one delivery
    pub async fn dispatch(
        &self,
        delivery: &WebhookDelivery,
    ) -> Result<DispatchOutcome, DispatchFailure> {
        let mut stages = delivery_workflow();

        match self.run(delivery, &mut stages).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                let reached = *stages.current_phase();
                let outcome = match error {
                    DispatchError::InvalidSignature => DeliveryStage::Rejected,
                    _ => DeliveryStage::Failed,
                };
                if let Err(e) = stages.transition_to(outcome) {
                    warn!(error = %e, "Could not record delivery failure stage");
                }

                if error.status_code().is_server_error() {
                    error!(
                        stage = %reached,
                        outcome = %outcome,
                        error_code = error.error_code(),
                        error = %error,
                        "Delivery failed"
                    );
                } else {
                    warn!(
                        stage = %reached,
                        outcome = %outcome,
                        error_code = error.error_code(),
                        error = %error,
                        "Delivery rejected"
                    );
                }

                Err(DispatchFailure {
                    delivery_id: delivery.delivery_id.clone(),
                    stage: reached,
                    outcome,
                    error,
                })
            }
        }
    }

    async fn run(
        &self,
        delivery: &WebhookDelivery,
        stages: &mut StateMachine<DeliveryStage>,
    ) -> Result<DispatchOutcome, DispatchError> {
        // the body is verified before it is parsed
        if !self
            .verifier
            .verify(&delivery.raw_body, delivery.signature.as_deref())?
        {
            return Err(DispatchError::InvalidSignature);
        }
        advance(stages, DeliveryStage::Verified)?;

        let event = delivery
            .event_type
            .as_deref()
            .ok_or_else(|| DispatchError::BadPayload("missing X-GitHub-Event header".to_string()))?;

        match event {
            "ping" => {
                info!("Received ping");
                Ok(DispatchOutcome::Pong)
            }
            "pull_request" => {
                let payload: PullRequestEvent = serde_json::from_slice(&delivery.raw_body)
                    .map_err(|e| DispatchError::BadPayload(e.to_string()))?;
                self.review_pull_request(payload, stages).await
            }
            other => {
                info!(event = other, "Ignoring unsupported event");
                Ok(DispatchOutcome::Unsupported {
                    event: other.to_string(),
                })
            }
        }
    }

    async fn review_pull_request(
        &self,
        event: PullRequestEvent,
        stages: &mut StateMachine<DeliveryStage>,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !event.wants_review() {
            info!(action = %event.action, "Ignoring pull request action");
            return Ok(DispatchOutcome::Ignored {
                action: event.action,
            });
        }

        let repo = event.repository.full_name.as_str();
        let pr_number = event.pull_request.number;
        RepoName::parse(repo)?;
        validate_pr_number(pr_number)?;

        let installation_id = event.installation.as_ref().map(|i| i.id).ok_or_else(|| {
            DispatchError::BadPayload("pull_request event has no installation id".to_string())
        })?;

        info!(
            repo,
            pr_number,
            installation_id,
            action = %event.action,
            "Reviewing pull request"
        );

        let token = self
            .authenticator
            .get_installation_token(installation_id)
            .await?;
        advance(stages, DeliveryStage::Authenticated)?;

        let client = GitHubClient::for_installation(self.http.clone(), &self.github, &token);
        let head_sha = event.pull_request.head.as_ref().map(|h| h.sha.as_str());

        let listed = client.list_pr_files(repo, pr_number).await?;
        let files = self.fetch_files(&client, repo, head_sha, listed).await;
        advance(stages, DeliveryStage::Fetched)?;

        let request = ReviewRequest::new(repo, pr_number)
            .with_title(event.pull_request.title.as_str())
            .with_head_sha(head_sha.map(str::to_string))
            .with_files(files);
        let files_failed = request.missing_files().count();
        let files_reviewed = request.files.iter().filter(|f| f.content.is_some()).count();

        let text = if request.files.is_empty() {
            info!(repo, pr_number, "No reviewable files changed, skipping review engine");
            self.nothing_to_review()
        } else {
            info!(
                engine = self.engine.name(),
                files = request.files.len(),
                files_failed,
                "Running review engine"
            );
            self.engine
                .review(&request)
                .await
                .map_err(DispatchError::Engine)?
        };
        advance(stages, DeliveryStage::Reviewed)?;

        let body = format!("{}{}", text.trim_end(), REVIEW_FOOTER);
        self.publish(&client, repo, pr_number, body)
            .await
            .map_err(DispatchError::Publish)?;
        advance(stages, DeliveryStage::Published)?;

        info!(repo, pr_number, files_reviewed, files_failed, "Review published");

        Ok(DispatchOutcome::Reviewed(ReviewSummary {
            repository: repo.to_string(),
            pr_number,
            files_reviewed,
            files_failed,
            stage: *stages.current_phase(),
        }))
    }

    /// Fetch reviewable files concurrently, keeping listing order
    async fn fetch_files(
        &self,
        client: &GitHubClient,
        repo: &str,
        head_sha: Option<&str>,
        listed: Vec<PullRequestFileRef>,
    ) -> Vec<FileForReview> {
        let wanted: Vec<PullRequestFileRef> = listed
            .into_iter()
            .filter(|f| self.review.wants(&f.filename))
            .collect();

        stream::iter(wanted)
            .map(|file| async move {
                let status = file.status.as_str();
                let entry = if file.status == FileStatus::Removed {
                    FileForReview::absent(file.filename.as_str(), status)
                } else {
                    match client
                        .fetch_file_content(repo, &file.filename, head_sha)
                        .await
                    {
                        Ok(content) => FileForReview::fetched(file.filename.as_str(), status, content),
                        Err(e) => {
                            warn!(
                                path = %file.filename,
                                error_kind = %e.kind(),
                                error = %e,
                                "Failed to fetch file content"
                            );
                            FileForReview::failed(file.filename.as_str(), status, e.to_string())
                        }
                    }
                };
                entry.with_stats(file.additions, file.deletions)
            })
            .buffered(self.review.fetch_concurrency.max(1))
            .collect()
            .await
    }

    fn nothing_to_review(&self) -> String {
        if self.review.extensions.is_empty() {
            return "No changed files to review in this pull request.".to_string();
        }
        let extensions: Vec<String> = self
            .review
            .extensions
            .iter()
            .map(|e| format!("`.{}`", e.trim_start_matches('.')))
            .collect();
        format!(
            "No {} files changed in this pull request, so there is nothing to review.",
            extensions.join(", ")
        )
    }

    async fn publish(
        &self,
        client: &GitHubClient,
        repo: &str,
        pr_number: u64,
        body: String,
    ) -> revgate_github::Result<()> {
        match self.review.publish {
            PublishMode::Review => {
                let submission = ReviewSubmission::new(repo, pr_number, body)
                    .with_disposition(self.review.disposition);
                client.submit_review(&submission).await?;
            }
            PublishMode::Comment => {
                client.post_comment(repo, pr_number, &body).await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("verifier", &self.verifier)
            .field("engine", &self.engine.name())
            .field("review", &self.review)
            .finish_non_exhaustive()
    }
}

fn advance(
    stages: &mut StateMachine<DeliveryStage>,
    to: DeliveryStage,
) -> Result<(), DispatchError> {
    stages
        .transition_to(to)
        .map_err(|e| DispatchError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut stages = delivery_workflow();
        for stage in [
            DeliveryStage::Verified,
            DeliveryStage::Authenticated,
            DeliveryStage::Fetched,
            DeliveryStage::Reviewed,
            DeliveryStage::Published,
        ] {
            advance(&mut stages, stage).unwrap();
        }
        assert!(stages.is_finished());
        assert_eq!(stages.history().len(), 6);
    }

    #[test]
    fn test_rejection_only_before_verification() {
        let mut stages = delivery_workflow();
        assert!(stages.can_transition_to(&DeliveryStage::Rejected));
        advance(&mut stages, DeliveryStage::Verified).unwrap();
        assert!(!stages.can_transition_to(&DeliveryStage::Rejected));
        assert!(stages.can_transition_to(&DeliveryStage::Failed));
    }

    #[test]
    fn test_terminal_stages_are_final() {
        let mut stages = delivery_workflow();
        advance(&mut stages, DeliveryStage::Rejected).unwrap();
        assert!(stages.is_finished());
        assert!(advance(&mut stages, DeliveryStage::Verified).is_err());
        assert!(advance(&mut stages, DeliveryStage::Failed).is_err());
    }

    #[test]
    fn test_stages_cannot_be_skipped() {
        let mut stages = delivery_workflow();
        assert!(advance(&mut stages, DeliveryStage::Fetched).is_err());
        advance(&mut stages, DeliveryStage::Verified).unwrap();
        assert!(advance(&mut stages, DeliveryStage::Published).is_err());
    }

    #[test]
    fn test_stage_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DeliveryStage::Authenticated).unwrap(),
            "\"authenticated\""
        );
        assert_eq!(DeliveryStage::Published.to_string(), "published");
    }
}
