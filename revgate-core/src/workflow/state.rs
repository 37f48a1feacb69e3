//! Core workflow state machine
//!
//! Phases move only along registered transitions. A phase marked terminal
//! accepts no further transitions, whatever the transition table says.

use crate::error::{Error, Result};
use std::fmt::Debug;

/// Interface for phase-tracking state machines
pub trait Workflow {
    /// The phase type for this workflow
    type Phase: Clone + PartialEq + Debug;

    /// Get the current phase of the workflow
    fn current_phase(&self) -> &Self::Phase;

    /// Check if a transition to the given phase is valid
    fn can_transition_to(&self, phase: &Self::Phase) -> bool;

    /// Attempt to transition to a new phase
    ///
    /// Returns an error if the transition is not valid.
    /// Implementations should log the transition.
    fn transition_to(&mut self, phase: Self::Phase) -> Result<()>;

    /// Whether the workflow has reached a phase it cannot leave
    fn is_finished(&self) -> bool;
}

/// A table-driven state machine
#[derive(Debug, Clone)]
pub struct StateMachine<P: Clone + PartialEq + Debug> {
    current_phase: P,
    valid_transitions: Vec<(P, P)>,
    terminal: Vec<P>,
    history: Vec<P>,
}

impl<P: Clone + PartialEq + Debug> StateMachine<P> {
    /// Create a new state machine with the given initial phase
    pub fn new(initial_phase: P) -> Self {
        Self {
            history: vec![initial_phase.clone()],
            current_phase: initial_phase,
            valid_transitions: Vec::new(),
            terminal: Vec::new(),
        }
    }

    /// Add a valid transition from one phase to another
    pub fn add_transition(mut self, from: P, to: P) -> Self {
        self.valid_transitions.push((from, to));
        self
    }

    /// Add multiple valid transitions
    pub fn add_transitions(mut self, transitions: Vec<(P, P)>) -> Self {
        self.valid_transitions.extend(transitions);
        self
    }

    /// Allow a transition from every non-terminal phase to `to`
    pub fn add_transition_from_any(mut self, from: &[P], to: P) -> Self {
        for phase in from {
            self.valid_transitions.push((phase.clone(), to.clone()));
        }
        self
    }

    /// Mark phases as terminal
    pub fn with_terminal(mut self, phases: Vec<P>) -> Self {
        self.terminal.extend(phases);
        self
    }

    /// Every phase visited so far, in order, the current one last
    pub fn history(&self) -> &[P] {
        &self.history
    }

    fn is_valid_transition(&self, from: &P, to: &P) -> bool {
        self.valid_transitions
            .iter()
            .any(|(f, t)| f == from && t == to)
    }
}

impl<P: Clone + PartialEq + Debug> Workflow for StateMachine<P> {
    type Phase = P;

    fn current_phase(&self) -> &Self::Phase {
        &self.current_phase
    }

    fn can_transition_to(&self, phase: &Self::Phase) -> bool {
        !self.is_finished() && self.is_valid_transition(&self.current_phase, phase)
    }

    fn transition_to(&mut self, phase: Self::Phase) -> Result<()> {
        if !self.can_transition_to(&phase) {
            return Err(Error::Other(format!(
                "Invalid transition from {:?} to {:?}",
                self.current_phase, phase
            )));
        }

        tracing::debug!(
            from = ?self.current_phase,
            to = ?phase,
            "Workflow phase transition"
        );

        self.history.push(phase.clone());
        self.current_phase = phase;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.terminal.contains(&self.current_phase)
    }
}
