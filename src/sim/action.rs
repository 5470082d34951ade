//! Actions and dispatching candidates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A proposed decision: put an operation on a machine.
///
/// Operation and machine are indices into the simulator's id-sorted
/// tables, so the derived ordering is (operation id, machine id,
/// position). `position: None` appends to the machine queue;
/// `Some(i)` inserts before the i-th not-yet-started entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Action {
    pub operation: usize,
    pub machine: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl Action {
    /// Appending action.
    pub fn new(operation: usize, machine: usize) -> Self {
        Self {
            operation,
            machine,
            position: None,
        }
    }

    /// Sets the queue insertion position.
    pub fn at_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{} -> machine#{}", self.operation, self.machine)?;
        if let Some(p) = self.position {
            write!(f, " @{p}")?;
        }
        Ok(())
    }
}

/// A legal action enriched with the features dispatching rules score.
///
/// All times are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// The underlying action.
    pub action: Action,
    /// Operation ID.
    pub operation_id: String,
    /// Machine ID.
    pub machine_id: String,
    /// Owning job ID.
    pub job_id: String,
    /// Job priority (higher = more important).
    pub priority: i32,
    /// Job tardiness weight.
    pub weight: f64,
    /// Job due date.
    pub due_date_ms: Option<i64>,
    /// Job release time.
    pub release_ms: i64,
    /// Mean processing time on this machine.
    pub expected_duration_ms: f64,
    /// Processing time the state's sample stream would draw.
    pub sampled_duration_ms: i64,
    /// Earliest start: machine availability vs. arrival after transfer.
    pub earliest_start_ms: i64,
    /// `earliest_start_ms + expected_duration_ms`.
    pub expected_completion_ms: f64,
    /// When the machine finishes its committed work.
    pub machine_available_ms: i64,
    /// Committed, unfinished operations on the machine.
    pub machine_queue_len: usize,
    /// Total processing time committed to the machine so far.
    pub machine_workload_ms: i64,
    /// Number of operation types the machine supports.
    pub machine_capability_count: usize,
    /// Expected work left in the job, this operation included.
    pub remaining_work_ms: f64,
    /// Dispatch order hint (lower = earlier); defaults to the operation index.
    pub rank: usize,
}

impl Candidate {
    /// `earliest_start_ms + sampled_duration_ms`.
    pub fn sampled_completion_ms(&self) -> i64 {
        self.earliest_start_ms.saturating_add(self.sampled_duration_ms)
    }

    /// Workload divided by capability count.
    pub fn load_ratio(&self) -> f64 {
        self.machine_workload_ms as f64 / self.machine_capability_count.max(1) as f64
    }
}
