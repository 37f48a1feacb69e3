//! Workflow module
//!
//! A small phase-tracking state machine. The webhook dispatcher runs each
//! delivery through one of these so the stage reached is always known when
//! something fails.

pub mod state;

pub use state::{StateMachine, Workflow};
