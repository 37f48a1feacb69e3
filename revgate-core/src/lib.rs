//! revgate core - shared types for the revgate review gateway
//!
//! This crate holds the pieces every other revgate crate leans on:
//! layered configuration, the credential store, the review engine
//! interface and the small state machine the webhook dispatcher runs on.

pub mod config;
pub mod error;
pub mod review;
pub mod secrets;
pub mod workflow;

pub use config::{Config, Environment, GitHubConfig, PublishMode, ReviewConfig, ServerConfig};
pub use error::{Error, Result};
pub use review::{Disposition, FileForReview, ProcessEngine, ReviewEngine, ReviewRequest};
pub use secrets::{AppCredentials, EnvSecretSource, PrivateKey, SecretSource, Secrets, StaticSecretSource};
pub use workflow::{StateMachine, Workflow};
