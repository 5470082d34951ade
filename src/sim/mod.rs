//! Deterministic discrete-event simulation engine.
//!
//! The [`Simulator`] owns a compiled, immutable view of a scenario and
//! performs pure state transitions on [`SimulationState`] values:
//!
//! - [`Simulator::initialize`] builds the state at t=0 for a seed
//! - [`Simulator::apply`] commits one [`Action`] (validated first)
//! - [`Simulator::advance`] processes the next batch of events
//! - [`Simulator::legal_actions`] enumerates the branching choices
//!
//! Given the same scenario, seed and action sequence, the resulting
//! state, sampled durations and trace are identical.
//!
//! # Time model
//!
//! All times are `i64` milliseconds. Operations start at
//! `max(machine free, clock + transfer)` and complete after a duration
//! drawn from the (operation type, machine) distribution.
//!
//! # References
//! - Law (2015), "Simulation Modeling and Analysis", Ch. 1.3 (Discrete-Event Simulation)
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 7 (Job Shops)

mod action;
mod bound;
mod engine;
mod event;
mod state;

pub use action::{Action, Candidate};
pub use engine::Simulator;
pub use event::{EventKey, EventKind, EventQueue, ScheduledEvent};
pub use state::{
    Completion, JobState, MachineState, OperationStatus, SampleStream, SimulationState, Slot,
};

use serde::{Deserialize, Serialize};

/// Simulator configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// A machine is offered for assignment when it frees up no later than
    /// `clock + lookahead_ms`. 0 = only machines available now.
    pub lookahead_ms: i64,
}

impl SimulatorConfig {
    /// Sets the lookahead window (ms).
    pub fn with_lookahead(mut self, lookahead_ms: i64) -> Self {
        self.lookahead_ms = lookahead_ms.max(0);
        self
    }
}
