//! Decision-point context for dispatching rule evaluation.

use crate::sim::Candidate;

/// Information shared by every candidate at one decision point.
///
/// All times are in milliseconds relative to the scenario epoch (t=0).
#[derive(Debug, Clone, Default)]
pub struct DecisionContext {
    /// Current simulation time (ms).
    pub current_time_ms: i64,
    /// Average expected processing time over the candidates (ATC normalization).
    pub average_processing_time: Option<f64>,
}

impl DecisionContext {
    /// Creates a context at the given time.
    pub fn at_time(current_time_ms: i64) -> Self {
        Self {
            current_time_ms,
            ..Default::default()
        }
    }

    /// Sets the average processing time.
    pub fn with_average_processing_time(mut self, avg_ms: f64) -> Self {
        self.average_processing_time = Some(avg_ms);
        self
    }

    /// Context for a candidate set, with the average computed from it.
    pub fn for_candidates(current_time_ms: i64, candidates: &[Candidate]) -> Self {
        let ctx = Self::at_time(current_time_ms);
        if candidates.is_empty() {
            return ctx;
        }
        let total: f64 = candidates.iter().map(|c| c.expected_duration_ms).sum();
        ctx.with_average_processing_time(total / candidates.len() as f64)
    }
}
