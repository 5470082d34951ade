//! Routing result export.

use serde::{Deserialize, Serialize};

use super::DispatchStrategy;
use crate::error::SchedulingError;
use crate::sim::{Action, Simulator};

/// One recorded assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub operation_id: String,
    pub job_id: String,
    pub assigned_machine: String,
    /// Projected start at decision time (ms).
    pub start_time_ms: i64,
    /// Projected end at decision time (ms).
    pub estimated_end_time_ms: i64,
    /// Job priority.
    pub priority_score: f64,
}

/// Assignments made by a control tower, in decision order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub strategy: DispatchStrategy,
    pub entries: Vec<RoutingEntry>,
}

impl RoutingResult {
    /// Converts the entries back into appending actions for replay.
    ///
    /// # Errors
    /// [`SchedulingError::UnknownEntity`] if an ID is not in the simulator's scenario.
    pub fn actions(&self, sim: &Simulator) -> Result<Vec<Action>, SchedulingError> {
        self.entries
            .iter()
            .map(|e| sim.action(&e.operation_id, &e.assigned_machine))
            .collect()
    }

    /// Entries routed to one machine.
    pub fn entries_for_machine<'a>(&'a self, machine_id: &'a str) -> impl Iterator<Item = &'a RoutingEntry> + 'a {
        self.entries.iter().filter(move |e| e.assigned_machine == machine_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
