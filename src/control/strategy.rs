//! Dispatch strategies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dispatching::{rules, RuleEngine, TieBreaker};

/// How the control tower picks among legal actions.
///
/// Machine-selection strategies serve pending operations in list order
/// (priority descending) and only choose the machine; the others rank
/// operations too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// Lowest workload per capability.
    #[default]
    LoadBalancing,
    /// Machine that frees up first.
    EarliestAvailable,
    /// Shortest machine queue (queued + running).
    LeastLoaded,
    /// Shortest expected processing time across all pending operations.
    ShortestProcessingTime,
    /// Highest job priority, then earliest release, then earliest machine.
    PriorityBased,
}

impl DispatchStrategy {
    /// All strategies.
    pub const ALL: [DispatchStrategy; 5] = [
        Self::LoadBalancing,
        Self::EarliestAvailable,
        Self::LeastLoaded,
        Self::ShortestProcessingTime,
        Self::PriorityBased,
    ];

    /// Rule chain implementing the strategy.
    ///
    /// Remaining ties resolve by pending order, then (operation id, machine id).
    pub fn engine(self) -> RuleEngine {
        let engine = match self {
            Self::LoadBalancing => RuleEngine::new()
                .with_rule(rules::PendingOrder)
                .with_tie_breaker(rules::LoadRatio),
            Self::EarliestAvailable => RuleEngine::new()
                .with_rule(rules::PendingOrder)
                .with_tie_breaker(rules::EarliestAvailable),
            Self::LeastLoaded => RuleEngine::new()
                .with_rule(rules::PendingOrder)
                .with_tie_breaker(rules::QueueLength),
            Self::ShortestProcessingTime => RuleEngine::new()
                .with_rule(rules::Spt)
                .with_tie_breaker(rules::PendingOrder),
            Self::PriorityBased => RuleEngine::new()
                .with_rule(rules::Priority)
                .with_tie_breaker(rules::Fifo)
                .with_tie_breaker(rules::EarliestAvailable)
                .with_tie_breaker(rules::PendingOrder),
        };
        engine.with_final_tie_breaker(TieBreaker::ById)
    }
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LoadBalancing => "load_balancing",
            Self::EarliestAvailable => "earliest_available",
            Self::LeastLoaded => "least_loaded",
            Self::ShortestProcessingTime => "shortest_processing_time",
            Self::PriorityBased => "priority_based",
        };
        f.write_str(s)
    }
}

impl FromStr for DispatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.to_string() == normalized)
            .ok_or_else(|| format!("unknown dispatch strategy '{s}'"))
    }
}
