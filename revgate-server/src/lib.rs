//! revgate server - webhook receiver for the revgate review gateway
//!
//! Receives GitHub deliveries, verifies and dispatches them, and publishes
//! the review engine's output back to the pull request.

pub mod dispatch;
pub mod error;
pub mod payload;
pub mod routes;

#[cfg(test)]
mod testing;

pub use dispatch::{
    delivery_workflow, DeliveryStage, DispatchOutcome, Dispatcher, ReviewSummary, WebhookDelivery,
};
pub use error::{DispatchError, DispatchFailure};
pub use routes::{router, AppState};
