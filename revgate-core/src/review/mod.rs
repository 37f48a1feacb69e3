//! Review module
//!
//! Request types handed to the review engine, and the engine interface
//! itself. The engine is an external collaborator: it receives the changed
//! files of a pull request and returns review text.

pub mod engine;
pub mod request;

pub use engine::{ProcessEngine, ReviewEngine};
pub use request::{Disposition, FileForReview, ReviewRequest};
