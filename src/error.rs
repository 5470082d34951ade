//! Error types.
//!
//! | Error | Severity | Caller response |
//! |-------|----------|-----------------|
//! | [`ScenarioError`] | fatal | fix the scenario |
//! | [`SchedulingError::InvalidAction`] | recoverable | discard the branch, pick another action |
//! | [`SchedulingError::CapabilityMismatch`] | fatal | contract violation in the caller |
//! | [`SchedulingError::Stalled`] | fatal | scenario cannot complete (machine down forever) |
//! | [`SchedulingError::Incomplete`] | fatal | action sequence does not cover every operation |
//! | [`SchedulingError::BudgetExceeded`] | non-fatal | use the best result so far |

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::sim::Action;
use crate::validation::ValidationError;

/// A scenario failed validation.
#[derive(Debug, Clone, Error)]
#[error("invalid scenario ({} issue(s)): {}", .0.len(), summarize(.0))]
pub struct ScenarioError(pub Vec<ValidationError>);

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ScenarioError {
    /// The individual validation failures.
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }
}

impl From<Vec<ValidationError>> for ScenarioError {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }
}

/// Why an action was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidActionReason {
    /// Operation index out of range.
    UnknownOperation,
    /// Machine index out of range.
    UnknownMachine,
    /// Operation already committed to a machine.
    AlreadyAssigned,
    /// Operation's job predecessor has not completed, or its job is not released.
    NotReady,
    /// Machine lacks the operation's type.
    MissingCapability,
    /// Machine is down.
    MachineDown,
    /// Machine is not available within the lookahead window.
    MachineUnavailable,
    /// Queue insertion index past the end, or before a started entry.
    InvalidPosition,
}

impl fmt::Display for InvalidActionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownOperation => "unknown operation",
            Self::UnknownMachine => "unknown machine",
            Self::AlreadyAssigned => "operation already assigned",
            Self::NotReady => "operation not ready",
            Self::MissingCapability => "machine lacks capability",
            Self::MachineDown => "machine is down",
            Self::MachineUnavailable => "machine not available",
            Self::InvalidPosition => "invalid queue position",
        };
        f.write_str(s)
    }
}

/// Errors raised by the simulator, optimizers and control tower.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// Scenario rejected at initialization.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// Action rejected; the state was not modified.
    #[error("invalid action {action}: {reason}")]
    InvalidAction {
        action: Action,
        reason: InvalidActionReason,
    },

    /// An action produced by enumeration could not be honoured.
    #[error("capability mismatch: machine '{machine_id}' cannot perform operation '{operation_id}'")]
    CapabilityMismatch {
        operation_id: String,
        machine_id: String,
    },

    /// An ID does not name an entity of the scenario.
    #[error("unknown {kind} '{id}'")]
    UnknownEntity { kind: &'static str, id: String },

    /// The action sequence ended with operations still unassigned.
    #[error("schedule incomplete: {unassigned} operation(s) never assigned")]
    Incomplete { unassigned: usize },

    /// No events remain but operations are unfinished.
    #[error("simulation stalled at {clock_ms} ms with {remaining} unfinished operation(s)")]
    Stalled { clock_ms: i64, remaining: usize },

    /// Search budget exhausted before any complete schedule was found.
    #[error("search budget exhausted after {nodes} node(s)")]
    BudgetExceeded { nodes: u64 },

    /// Worker thread pool could not be created.
    #[error("worker pool: {0}")]
    WorkerPool(String),
}

impl SchedulingError {
    /// Whether the caller may continue with another action or branch.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidAction { .. } | Self::BudgetExceeded { .. }
        )
    }

    /// The rejection reason, for invalid actions.
    pub fn invalid_action_reason(&self) -> Option<InvalidActionReason> {
        match self {
            Self::InvalidAction { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
