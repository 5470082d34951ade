//! Job model.
//!
//! A job is an ordered chain of operations. Operation `i + 1` of a job
//! cannot start before operation `i` has completed (plus any transfer
//! time between the two machines involved).
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 2.3 (Job Shops)

use serde::{Deserialize, Serialize};

/// A job to be scheduled.
///
/// # Time Representation
/// All times are in milliseconds relative to the scenario epoch (t=0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Operation IDs in processing order.
    pub operations: Vec<String>,
    /// Scheduling priority (higher = more important).
    #[serde(default)]
    pub priority: i32,
    /// Tardiness weight used by cost-aware rules (default 1.0).
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Due date (ms). `None` = no due date.
    #[serde(default)]
    pub due_date: Option<i64>,
    /// Release time (ms). `None` = released at t=0.
    #[serde(default)]
    pub release_time: Option<i64>,
}

fn default_weight() -> f64 {
    1.0
}

impl Job {
    /// Creates a new job with the given ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            operations: Vec::new(),
            priority: 0,
            weight: default_weight(),
            due_date: None,
            release_time: None,
        }
    }

    /// Sets the job name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends an operation to the processing chain.
    pub fn with_operation(mut self, operation_id: impl Into<String>) -> Self {
        self.operations.push(operation_id.into());
        self
    }

    /// Sets the scheduling priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the tardiness weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Sets the due date (ms).
    pub fn with_due_date(mut self, due_ms: i64) -> Self {
        self.due_date = Some(due_ms);
        self
    }

    /// Sets the release time (ms).
    pub fn with_release_time(mut self, release_ms: i64) -> Self {
        self.release_time = Some(release_ms);
        self
    }

    /// Effective release time (ms), 0 when unset.
    #[inline]
    pub fn release_ms(&self) -> i64 {
        self.release_time.unwrap_or(0)
    }

    /// Number of operations.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }
}
