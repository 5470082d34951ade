//! Built-in dispatching rules.
//!
//! # Categories
//!
//! - **Time-based**: ECT, SPT
//! - **Due-date**: EDD, ATC
//! - **Machine/Load**: EAM (earliest available machine), WINQ, LOAD
//! - **Order**: PRIORITY, FIFO, PENDING
//!
//! # Score Convention
//! All rules return lower scores for higher priority candidates.
//!
//! # References
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 4
//! - Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

use super::{DecisionContext, DispatchingRule, RuleScore};
use crate::sim::Candidate;

// ======================== Time-based rules ========================

/// Earliest Completion Time.
///
/// Prioritizes the (operation, machine) pair that would finish first,
/// using the duration the simulation would actually draw.
#[derive(Debug, Clone, Copy)]
pub struct Ect;

impl DispatchingRule for Ect {
    fn name(&self) -> &'static str {
        "ECT"
    }

    fn evaluate(&self, candidate: &Candidate, _context: &DecisionContext) -> RuleScore {
        candidate.sampled_completion_ms() as f64
    }

    fn description(&self) -> &'static str {
        "Earliest Completion Time"
    }
}

/// Shortest Processing Time.
///
/// Prioritizes candidates with shorter expected processing time.
///
/// # Reference
/// Smith (1956), optimal for minimizing mean flow time on single machine.
#[derive(Debug, Clone, Copy)]
pub struct Spt;

impl DispatchingRule for Spt {
    fn name(&self) -> &'static str {
        "SPT"
    }

    fn evaluate(&self, candidate: &Candidate, _context: &DecisionContext) -> RuleScore {
        candidate.expected_duration_ms
    }

    fn description(&self) -> &'static str {
        "Shortest Processing Time"
    }
}

// ======================== Due-date rules ========================

/// Earliest Due Date.
///
/// Jobs without due dates are assigned lowest priority.
///
/// # Reference
/// Jackson (1955), optimal for minimizing maximum lateness on single machine.
#[derive(Debug, Clone, Copy)]
pub struct Edd;

impl DispatchingRule for Edd {
    fn name(&self) -> &'static str {
        "EDD"
    }

    fn evaluate(&self, candidate: &Candidate, _context: &DecisionContext) -> RuleScore {
        candidate.due_date_ms.map(|d| d as f64).unwrap_or(f64::MAX)
    }

    fn description(&self) -> &'static str {
        "Earliest Due Date"
    }
}

/// Apparent Tardiness Cost.
///
/// Combines WSPT with due-date urgency using an exponential function.
/// The parameter `k` controls the balance:
/// - k > 2: more SPT-like (processing time dominates)
/// - k < 2: more EDD-like (due date dominates)
///
/// Slack is measured against the job's remaining work, so early
/// operations of long jobs become urgent sooner.
///
/// # Reference
/// Vepsalainen & Morton (1987), "Priority Rules for Job Shops with
/// Weighted Tardiness Costs"
#[derive(Debug, Clone, Copy)]
pub struct Atc {
    /// Lookahead parameter (default: 2.0).
    pub k: f64,
}

impl Default for Atc {
    fn default() -> Self {
        Self { k: 2.0 }
    }
}

impl Atc {
    /// Creates an ATC rule with custom k parameter.
    pub fn with_k(k: f64) -> Self {
        Self { k }
    }
}

impl DispatchingRule for Atc {
    fn name(&self) -> &'static str {
        "ATC"
    }

    fn evaluate(&self, candidate: &Candidate, context: &DecisionContext) -> RuleScore {
        let processing_time = candidate.expected_duration_ms;
        if processing_time <= 0.0 {
            return f64::MAX;
        }

        let weight = candidate.weight.max(0.0);

        let due = match candidate.due_date_ms {
            Some(d) => d as f64,
            None => return -(weight / processing_time), // Fallback to WSPT
        };

        let start = context.current_time_ms.max(candidate.earliest_start_ms) as f64;
        let remaining = candidate.remaining_work_ms.max(processing_time);
        let slack = due - remaining - start;
        let p_avg = context
            .average_processing_time
            .unwrap_or(processing_time)
            .max(1.0);

        let urgency = if slack <= 0.0 {
            1.0
        } else {
            (-slack / (self.k * p_avg)).exp()
        };

        -(weight / processing_time * urgency) // Higher ATC = higher priority → negate
    }

    fn description(&self) -> &'static str {
        "Apparent Tardiness Cost"
    }
}

// ======================== Machine/Load rules ========================

/// Earliest Available Machine.
///
/// Prefers machines that free up first.
#[derive(Debug, Clone, Copy)]
pub struct EarliestAvailable;

impl DispatchingRule for EarliestAvailable {
    fn name(&self) -> &'static str {
        "EAM"
    }

    fn evaluate(&self, candidate: &Candidate, _context: &DecisionContext) -> RuleScore {
        candidate.machine_available_ms as f64
    }

    fn description(&self) -> &'static str {
        "Earliest Available Machine"
    }
}

/// Work In Next Queue.
///
/// Prefers the machine with the fewest committed, unfinished operations.
#[derive(Debug, Clone, Copy)]
pub struct QueueLength;

impl DispatchingRule for QueueLength {
    fn name(&self) -> &'static str {
        "WINQ"
    }

    fn evaluate(&self, candidate: &Candidate, _context: &DecisionContext) -> RuleScore {
        candidate.machine_queue_len as f64
    }

    fn description(&self) -> &'static str {
        "Work In Next Queue"
    }
}

/// Load ratio: committed workload divided by capability count.
///
/// Versatile machines absorb proportionally more work.
#[derive(Debug, Clone, Copy)]
pub struct LoadRatio;

impl DispatchingRule for LoadRatio {
    fn name(&self) -> &'static str {
        "LOAD"
    }

    fn evaluate(&self, candidate: &Candidate, _context: &DecisionContext) -> RuleScore {
        candidate.load_ratio()
    }

    fn description(&self) -> &'static str {
        "Workload per Capability"
    }
}

// ======================== Order rules ========================

/// Job priority (higher `priority` first).
#[derive(Debug, Clone, Copy)]
pub struct Priority;

impl DispatchingRule for Priority {
    fn name(&self) -> &'static str {
        "PRIORITY"
    }

    fn evaluate(&self, candidate: &Candidate, _context: &DecisionContext) -> RuleScore {
        -(candidate.priority as f64)
    }

    fn description(&self) -> &'static str {
        "Job Priority"
    }
}

/// First In First Out by job release time.
#[derive(Debug, Clone, Copy)]
pub struct Fifo;

impl DispatchingRule for Fifo {
    fn name(&self) -> &'static str {
        "FIFO"
    }

    fn evaluate(&self, candidate: &Candidate, _context: &DecisionContext) -> RuleScore {
        candidate.release_ms as f64
    }

    fn description(&self) -> &'static str {
        "First In First Out"
    }
}

/// Caller-supplied order (`Candidate::rank`, lower first).
#[derive(Debug, Clone, Copy)]
pub struct PendingOrder;

impl DispatchingRule for PendingOrder {
    fn name(&self) -> &'static str {
        "PENDING"
    }

    fn evaluate(&self, candidate: &Candidate, _context: &DecisionContext) -> RuleScore {
        candidate.rank as f64
    }

    fn description(&self) -> &'static str {
        "Pending List Order"
    }
}
