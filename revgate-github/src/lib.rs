//! revgate GitHub - GitHub App integration for revgate
//!
//! This crate verifies webhook deliveries, authenticates as a GitHub App,
//! and performs the REST operations the review gateway needs: listing
//! changed files, fetching content and publishing reviews. All network
//! access goes through [`HttpClient`], which owns retry, timeouts and
//! pagination.

pub mod auth;
mod client;
mod content;
mod error;
pub mod http;
mod pr;
mod review;
pub mod signature;
pub mod validate;

#[cfg(test)]
mod testing;

pub use auth::{
    sign_assertion, AppAuthenticator, AssertionClaims, HttpTokenExchange, InstallationToken,
    TokenExchange,
};
pub use client::{GitHubClient, API_VERSION, API_VERSION_HEADER, DIFF_MEDIA_TYPE, JSON_MEDIA_TYPE};
pub use error::{Error, ErrorKind, Result};
pub use http::{
    ApiRequest, ApiResponse, HttpClient, ReqwestTransport, RetryPolicy, Transport, TransportError,
};
pub use pr::{FileStatus, GitRef, PullRequestFileRef, PullRequestInfo};
pub use review::{InlineComment, Published, ReviewSubmission};
pub use signature::{sign, verify_signature, SignatureVerifier, SIGNATURE_HEADER};
pub use validate::RepoName;
