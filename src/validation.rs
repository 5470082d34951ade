//! Scenario and trace validation.
//!
//! [`validate_scenario`] checks structural integrity of a scenario before
//! simulation. Detects:
//! - Duplicate IDs
//! - Dangling job → operation and model → machine references
//! - Operation types no machine can perform, and missing durations
//! - Circular precedence between operations (DAG validation)
//! - Empty jobs
//!
//! [`validate_trace`] checks a realized trace for job precedence (with
//! transfer time), machine non-overlap and capability.
//!
//! # Reference
//! Cormen et al. (2009), "Introduction to Algorithms", Ch. 22.4 (Topological Sort)

use crate::models::{Scenario, Trace, TraceRecord, Violation, ViolationType};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two entities share the same ID.
    DuplicateId,
    /// A job has no operations.
    EmptyJob,
    /// A job references an operation that doesn't exist.
    InvalidOperationReference,
    /// An operation's owner or position disagrees with its job.
    OwnershipMismatch,
    /// An operation is not part of any job.
    OrphanOperation,
    /// A duration or transfer entry references an unknown machine.
    InvalidMachineReference,
    /// No machine can perform an operation's type.
    NoEligibleMachine,
    /// A capable machine has no duration for an operation type.
    MissingDuration,
    /// A duration distribution or transfer time has invalid parameters.
    InvalidParameter,
    /// Precedence graph contains a cycle.
    CyclicDependency,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Validates a scenario.
///
/// Checks:
/// 1. No duplicate job, operation or machine IDs
/// 2. Every job has at least one operation, and every listed operation exists
/// 3. Operations name their owning job and position correctly; none is orphaned
/// 4. Every operation type has a capable machine with a duration
/// 5. Duration and transfer entries reference existing machines with valid parameters
/// 6. No circular precedence
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_scenario(scenario: &Scenario) -> ValidationResult {
    let mut errors = Vec::new();

    let mut machine_ids = HashSet::new();
    for m in &scenario.machines {
        if !machine_ids.insert(m.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate machine ID: {}", m.id),
            ));
        }
    }

    let mut operations = HashMap::new();
    for op in &scenario.operations {
        if operations.insert(op.id.as_str(), op).is_some() {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate operation ID: {}", op.id),
            ));
        }
    }

    // Job → operation references
    let mut job_ids = HashSet::new();
    let mut owner: HashMap<&str, &str> = HashMap::new();
    for job in &scenario.jobs {
        if !job_ids.insert(job.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate job ID: {}", job.id),
            ));
        }

        if job.operations.is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::EmptyJob,
                format!("Job '{}' has no operations", job.id),
            ));
        }

        for (pos, op_id) in job.operations.iter().enumerate() {
            let Some(op) = operations.get(op_id.as_str()) else {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidOperationReference,
                    format!("Job '{}' references unknown operation '{}'", job.id, op_id),
                ));
                continue;
            };
            if let Some(prev) = owner.insert(op_id.as_str(), job.id.as_str()) {
                if prev != job.id {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::OwnershipMismatch,
                        format!("Operation '{op_id}' is listed by jobs '{prev}' and '{}'", job.id),
                    ));
                }
            }
            if op.job_id != job.id {
                errors.push(ValidationError::new(
                    ValidationErrorKind::OwnershipMismatch,
                    format!(
                        "Operation '{op_id}' belongs to '{}' but is listed by job '{}'",
                        op.job_id, job.id
                    ),
                ));
            } else if op.sequence as usize != pos {
                errors.push(ValidationError::new(
                    ValidationErrorKind::OwnershipMismatch,
                    format!(
                        "Operation '{op_id}' has sequence {} but is at position {pos} of job '{}'",
                        op.sequence, job.id
                    ),
                ));
            }
        }
    }

    for op in &scenario.operations {
        if !owner.contains_key(op.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::OrphanOperation,
                format!("Operation '{}' is not part of any job", op.id),
            ));
        }
    }

    // Capability and duration coverage, per operation type
    let mut op_types: Vec<&str> = scenario
        .operations
        .iter()
        .map(|o| o.operation_type.as_str())
        .collect();
    op_types.sort_unstable();
    op_types.dedup();
    for op_type in op_types {
        let capable = scenario.eligible_machines(op_type);
        if capable.is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::NoEligibleMachine,
                format!("No machine can perform operation type '{op_type}'"),
            ));
        }
        for m in capable {
            if scenario.durations.get(op_type, &m.id).is_none() {
                errors.push(ValidationError::new(
                    ValidationErrorKind::MissingDuration,
                    format!("Machine '{}' has no duration for operation type '{op_type}'", m.id),
                ));
            }
        }
    }

    for (op_type, machine_id, dist) in scenario.durations.entries() {
        if !machine_ids.contains(machine_id) {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidMachineReference,
                format!("Duration for '{op_type}' references unknown machine '{machine_id}'"),
            ));
        }
        if !dist.is_well_formed() {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidParameter,
                format!("Duration for '{op_type}' on '{machine_id}' is malformed: {dist:?}"),
            ));
        }
    }

    if scenario.transfers.default_ms() < 0 {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidParameter,
            "Default transfer time is negative",
        ));
    }
    for (from, to, ms) in scenario.transfers.entries() {
        for id in [from, to] {
            if !machine_ids.contains(id) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidMachineReference,
                    format!("Transfer '{from}' -> '{to}' references unknown machine '{id}'"),
                ));
            }
        }
        if ms < 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidParameter,
                format!("Transfer '{from}' -> '{to}' is negative ({ms} ms)"),
            ));
        }
    }

    if let Some(cycle_err) = detect_cycles(scenario) {
        errors.push(cycle_err);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Detects cycles in the precedence graph using DFS.
///
/// Edges run from each job operation to its successor in the job.
///
/// # Algorithm
/// Topological sort via DFS. If a back-edge is found (visiting a node
/// currently in the recursion stack), a cycle exists.
///
/// # Reference
/// Cormen et al. (2009), "Introduction to Algorithms", Ch. 22.4
fn detect_cycles(scenario: &Scenario) -> Option<ValidationError> {
    let mut adj: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for job in &scenario.jobs {
        for pair in job.operations.windows(2) {
            adj.entry(pair[0].as_str()).or_default().push(pair[1].as_str());
        }
        if let Some(last) = job.operations.last() {
            adj.entry(last.as_str()).or_default();
        }
    }

    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();

    for &node in adj.keys() {
        if !visited.contains(node) && has_cycle_dfs(node, &adj, &mut visited, &mut in_stack) {
            return Some(ValidationError::new(
                ValidationErrorKind::CyclicDependency,
                format!("Circular precedence detected involving operation '{node}'"),
            ));
        }
    }

    None
}

fn has_cycle_dfs<'a>(
    node: &'a str,
    adj: &BTreeMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    in_stack: &mut HashSet<&'a str>,
) -> bool {
    visited.insert(node);
    in_stack.insert(node);

    if let Some(neighbors) = adj.get(node) {
        for &next in neighbors {
            if in_stack.contains(next) {
                return true; // Back edge → cycle
            }
            if !visited.contains(next) && has_cycle_dfs(next, adj, visited, in_stack) {
                return true;
            }
        }
    }

    in_stack.remove(node);
    false
}

/// Checks a realized trace against its scenario.
///
/// Reports every operation that is missing or duplicated, runs on an
/// incapable machine, starts before its release or before its job
/// predecessor's end plus transfer time, or overlaps another operation
/// on the same machine. An empty result means the trace is feasible.
pub fn validate_trace(scenario: &Scenario, trace: &Trace) -> Vec<Violation> {
    let mut violations = Vec::new();

    let mut by_op: HashMap<&str, &TraceRecord> = HashMap::new();
    for r in &trace.records {
        if by_op.insert(r.operation_id.as_str(), r).is_some() {
            violations.push(Violation::new(
                ViolationType::AssignmentCount,
                &r.operation_id,
                format!("Operation '{}' executed more than once", r.operation_id),
            ));
        }
    }

    for op in &scenario.operations {
        let Some(rec) = by_op.get(op.id.as_str()) else {
            violations.push(Violation::new(
                ViolationType::AssignmentCount,
                &op.id,
                format!("Operation '{}' missing from trace", op.id),
            ));
            continue;
        };
        let capable = scenario
            .machine(&rec.machine_id)
            .is_some_and(|m| m.can_perform(&op.operation_type));
        if !capable {
            violations.push(Violation::new(
                ViolationType::CapabilityMismatch,
                &op.id,
                format!(
                    "Machine '{}' cannot perform '{}' required by '{}'",
                    rec.machine_id, op.operation_type, op.id
                ),
            ));
        }
    }

    for job in &scenario.jobs {
        if let Some(first) = job.operations.first().and_then(|id| by_op.get(id.as_str())) {
            if first.start_ms < job.release_ms() {
                violations.push(Violation::new(
                    ViolationType::EarlyStart,
                    &first.operation_id,
                    format!(
                        "Operation '{}' starts at {} before job release {}",
                        first.operation_id,
                        first.start_ms,
                        job.release_ms()
                    ),
                ));
            }
        }
        for pair in job.operations.windows(2) {
            let (Some(prev), Some(next)) =
                (by_op.get(pair[0].as_str()), by_op.get(pair[1].as_str()))
            else {
                continue;
            };
            let transfer = scenario
                .transfers
                .transfer_ms(&prev.machine_id, &next.machine_id);
            if next.start_ms < prev.end_ms + transfer {
                violations.push(Violation::new(
                    ViolationType::PrecedenceViolation,
                    &next.operation_id,
                    format!(
                        "Operation '{}' starts at {} before '{}' ends at {} plus transfer {}",
                        next.operation_id, next.start_ms, prev.operation_id, prev.end_ms, transfer
                    ),
                ));
            }
        }
    }

    let mut per_machine: BTreeMap<&str, Vec<&TraceRecord>> = BTreeMap::new();
    for r in &trace.records {
        per_machine.entry(r.machine_id.as_str()).or_default().push(r);
    }
    for (machine_id, mut recs) in per_machine {
        recs.sort_by_key(|r| (r.start_ms, r.end_ms));
        for pair in recs.windows(2) {
            if pair[1].start_ms < pair[0].end_ms {
                violations.push(Violation::new(
                    ViolationType::MachineOverlap,
                    machine_id,
                    format!(
                        "'{}' and '{}' overlap on machine '{machine_id}'",
                        pair[0].operation_id, pair[1].operation_id
                    ),
                ));
            }
        }
    }

    violations
}
