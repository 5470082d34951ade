//! Trace (simulation result) model.
//!
//! A trace is the realized schedule: every operation with the machine it
//! ran on and its start/end times. Traces may be checked for feasibility
//! with [`validate_trace`](crate::validation::validate_trace), which
//! reports [`Violation`]s.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 3

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete realized schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Records ordered by (start, operation ID).
    pub records: Vec<TraceRecord>,
    /// Latest completion time (ms).
    pub makespan_ms: i64,
}

/// One operation execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Executed operation ID.
    pub operation_id: String,
    /// Owning job ID (denormalized for query convenience).
    pub job_id: String,
    /// Machine the operation ran on.
    pub machine_id: String,
    /// Start time (ms).
    pub start_ms: i64,
    /// End time (ms).
    pub end_ms: i64,
    /// Transfer time required before the start (ms).
    pub transfer_ms: i64,
}

/// A feasibility violation found in a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Type of violation.
    pub violation_type: ViolationType,
    /// Related entity ID (operation or machine).
    pub entity_id: String,
    /// Human-readable description.
    pub message: String,
}

/// Classification of trace violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationType {
    /// Operation started before its predecessor finished (plus transfer).
    PrecedenceViolation,
    /// Two operations overlap on one machine.
    MachineOverlap,
    /// Machine lacks the capability for the operation.
    CapabilityMismatch,
    /// Operation missing from or duplicated in the trace.
    AssignmentCount,
    /// Operation started before its job's release time.
    EarlyStart,
}

impl TraceRecord {
    /// Creates a record without transfer time.
    pub fn new(
        operation_id: impl Into<String>,
        job_id: impl Into<String>,
        machine_id: impl Into<String>,
        start_ms: i64,
        end_ms: i64,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            job_id: job_id.into(),
            machine_id: machine_id.into(),
            start_ms,
            end_ms,
            transfer_ms: 0,
        }
    }

    /// Sets the transfer time.
    pub fn with_transfer(mut self, transfer_ms: i64) -> Self {
        self.transfer_ms = transfer_ms;
        self
    }

    /// Processing duration (ms).
    #[inline]
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

impl Violation {
    /// Creates a violation.
    pub fn new(
        violation_type: ViolationType,
        entity_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            violation_type,
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }
}

impl Trace {
    /// Builds a trace from records, sorting them and computing the makespan.
    pub fn from_records(mut records: Vec<TraceRecord>) -> Self {
        records.sort_by(|a, b| {
            (a.start_ms, &a.operation_id).cmp(&(b.start_ms, &b.operation_id))
        });
        let makespan_ms = records.iter().map(|r| r.end_ms).max().unwrap_or(0);
        Self {
            records,
            makespan_ms,
        }
    }

    /// Finds the record for an operation.
    pub fn record_for_operation(&self, operation_id: &str) -> Option<&TraceRecord> {
        self.records.iter().find(|r| r.operation_id == operation_id)
    }

    /// Records of one job, in start order.
    pub fn records_for_job(&self, job_id: &str) -> Vec<&TraceRecord> {
        self.records.iter().filter(|r| r.job_id == job_id).collect()
    }

    /// Records of one machine, in start order.
    pub fn records_for_machine(&self, machine_id: &str) -> Vec<&TraceRecord> {
        self.records
            .iter()
            .filter(|r| r.machine_id == machine_id)
            .collect()
    }

    /// Completion time of a job (latest end of its records).
    pub fn job_completion_time(&self, job_id: &str) -> Option<i64> {
        self.records
            .iter()
            .filter(|r| r.job_id == job_id)
            .map(|r| r.end_ms)
            .max()
    }

    /// Busy time / makespan for every machine that appears in the trace.
    pub fn machine_utilizations(&self) -> BTreeMap<String, f64> {
        if self.makespan_ms <= 0 {
            return BTreeMap::new();
        }
        let mut busy: BTreeMap<String, i64> = BTreeMap::new();
        for r in &self.records {
            *busy.entry(r.machine_id.clone()).or_insert(0) += r.duration_ms();
        }
        busy.into_iter()
            .map(|(id, b)| (id, b as f64 / self.makespan_ms as f64))
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the trace is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
