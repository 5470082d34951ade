//! Search optimizers over simulator actions.
//!
//! Three algorithms explore the same action space exposed by
//! [`Simulator`](crate::sim::Simulator):
//!
//! | Algorithm | Type | Result |
//! |-----------|------|--------|
//! | [`DfsOptimizer`] | exhaustive depth-first | optimal when exhausted |
//! | [`BranchAndBound`] | best-first with lower-bound pruning | optimal when exhausted |
//! | [`MctsOptimizer`] | Monte-Carlo tree search with greedy rollouts | anytime, near-optimal |
//!
//! The winning action sequence is replayed with the base seed so the
//! returned [`Trace`] is the canonical one.
//!
//! # Usage
//!
//! ```
//! use u_jobshop::models::{DurationDistribution, Job, Machine, Scenario};
//! use u_jobshop::search::{optimize, SearchAlgorithm, SearchConfig};
//!
//! let scenario = Scenario::new()
//!     .with_job_steps(Job::new("J1"), [("J1_A", "A"), ("J1_B", "B")])
//!     .with_job_steps(Job::new("J2"), [("J2_A", "A"), ("J2_B", "B")])
//!     .with_machine(Machine::new("M1").with_capability("A"))
//!     .with_machine(Machine::new("M2").with_capability("B"))
//!     .with_duration("A", "M1", DurationDistribution::fixed(3000))
//!     .with_duration("B", "M2", DurationDistribution::fixed(4000));
//!
//! let config = SearchConfig::default().with_algorithm(SearchAlgorithm::BranchAndBound);
//! let result = optimize(&scenario, &config).unwrap();
//! assert_eq!(result.summary.makespan_ms, 11000);
//! assert!(result.summary.optimal);
//! ```
//!
//! # References
//! - Brucker (2007), "Scheduling Algorithms", Ch. 6 (Job Shops)
//! - Browne et al. (2012), "A Survey of Monte Carlo Tree Search Methods"

mod bnb;
mod budget;
mod config;
mod dfs;
mod incumbent;
mod mcts;
mod node;
mod rollout;

pub use bnb::BranchAndBound;
pub use budget::Budget;
pub use config::{MctsConfig, RolloutPolicy, SearchAlgorithm, SearchConfig};
pub use dfs::DfsOptimizer;
pub use incumbent::Incumbent;
pub use mcts::MctsOptimizer;
pub use node::SearchNode;
pub use rollout::{greedy_complete, policy_engine};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::SchedulingError;
use crate::models::{Scenario, Trace};
use crate::sim::{Action, Simulator, SimulatorConfig};

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The search space (or tree) was fully explored.
    Exhausted,
    /// `max_nodes` expansions reached.
    NodeLimit,
    /// `time_limit` elapsed.
    TimeLimit,
    /// MCTS iteration cap reached.
    IterationLimit,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exhausted => "exhausted",
            Self::NodeLimit => "node_limit",
            Self::TimeLimit => "time_limit",
            Self::IterationLimit => "iteration_limit",
        };
        f.write_str(s)
    }
}

/// Raw result of one optimizer run.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Complete action sequence of the best schedule.
    pub actions: Vec<Action>,
    /// Makespan of that sequence under the base seed.
    pub makespan_ms: i64,
    /// Node expansions performed.
    pub nodes_explored: u64,
    /// Why the search stopped.
    pub termination: Termination,
    /// Optimality was proven.
    pub optimal: bool,
    /// A budget cut the search short of its own stopping criterion.
    pub partial: bool,
}

/// A search algorithm over simulator actions.
pub trait Optimizer: Send + Sync {
    /// Algorithm implemented.
    fn algorithm(&self) -> SearchAlgorithm;

    /// Searches for a low-makespan action sequence.
    ///
    /// # Errors
    /// Fatal simulator errors ([`SchedulingError::Stalled`] when no
    /// complete schedule exists, [`SchedulingError::WorkerPool`]).
    fn search(&self, sim: &Simulator, config: &SearchConfig) -> Result<SearchOutcome, SchedulingError>;
}

/// Objective summary of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveSummary {
    pub makespan_ms: i64,
    pub algorithm: SearchAlgorithm,
    /// Only meaningful for MCTS.
    pub rollout_policy: RolloutPolicy,
    pub nodes_explored: u64,
    pub search_duration_ms: u64,
    pub optimal: bool,
    pub partial: bool,
    pub termination: Termination,
    pub seed: u64,
}

/// Best schedule found by an optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Action sequence; replay it with `summary.seed` to reproduce `trace`.
    pub actions: Vec<Action>,
    /// Canonical trace of `actions`.
    pub trace: Trace,
    pub summary: ObjectiveSummary,
}

/// Builds the optimizer for an algorithm.
pub fn optimizer_for(algorithm: SearchAlgorithm) -> Box<dyn Optimizer> {
    match algorithm {
        SearchAlgorithm::Dfs => Box::new(DfsOptimizer),
        SearchAlgorithm::BranchAndBound => Box::new(BranchAndBound),
        SearchAlgorithm::Mcts => Box::new(MctsOptimizer),
    }
}

/// Validates the scenario and runs the configured optimizer.
///
/// # Errors
/// - [`SchedulingError::Scenario`] if the scenario is malformed
/// - errors from [`Optimizer::search`]
pub fn optimize(scenario: &Scenario, config: &SearchConfig) -> Result<SearchResult, SchedulingError> {
    let sim = Simulator::new(
        scenario,
        SimulatorConfig::default().with_lookahead(config.lookahead_ms),
    )?;
    optimize_with(&sim, config)
}

/// Runs the configured optimizer on an existing simulator.
///
/// The simulator's own lookahead applies; `config.lookahead_ms` is ignored.
pub fn optimize_with(sim: &Simulator, config: &SearchConfig) -> Result<SearchResult, SchedulingError> {
    let started = Instant::now();
    info!(
        algorithm = %config.algorithm,
        policy = %config.rollout_policy,
        seed = config.seed,
        max_nodes = config.max_nodes,
        time_limit_ms = config.time_limit_ms,
        workers = config.workers,
        operations = sim.operation_count(),
        "search started"
    );

    let outcome = optimizer_for(config.algorithm).search(sim, config)?;
    let trace = sim.replay(config.seed, &outcome.actions)?;

    let summary = ObjectiveSummary {
        makespan_ms: trace.makespan_ms,
        algorithm: config.algorithm,
        rollout_policy: config.rollout_policy,
        nodes_explored: outcome.nodes_explored,
        search_duration_ms: started.elapsed().as_millis() as u64,
        optimal: outcome.optimal,
        partial: outcome.partial,
        termination: outcome.termination,
        seed: config.seed,
    };

    if summary.partial {
        warn!(termination = %summary.termination, "search stopped early, result may be suboptimal");
    }
    info!(
        makespan_ms = summary.makespan_ms,
        nodes = summary.nodes_explored,
        duration_ms = summary.search_duration_ms,
        optimal = summary.optimal,
        "search finished"
    );

    Ok(SearchResult {
        actions: outcome.actions,
        trace,
        summary,
    })
}

/// Derives an independent stream seed (SplitMix64 finalizer).
pub(crate) fn mix_seed(seed: u64, a: u64, b: u64) -> u64 {
    let mut z = seed
        .wrapping_add(a.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(b.wrapping_mul(0xD1B5_4A32_D192_ED03));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Thread pool for `workers > 1`.
pub(crate) fn worker_pool(workers: usize) -> Result<rayon::ThreadPool, SchedulingError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("u-jobshop-worker-{i}"))
        .build()
        .map_err(|e| SchedulingError::WorkerPool(e.to_string()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::{DurationDistribution, Job, Machine, Scenario};

    /// J1/J2 each run A (3000 ms, M1 only) then B (4000 ms, M2 only).
    pub(crate) fn two_by_two() -> Scenario {
        Scenario::new()
            .with_job_steps(Job::new("J1"), [("J1_A", "A"), ("J1_B", "B")])
            .with_job_steps(Job::new("J2"), [("J2_A", "A"), ("J2_B", "B")])
            .with_machine(Machine::new("M1").with_capability("A"))
            .with_machine(Machine::new("M2").with_capability("B"))
            .with_duration("A", "M1", DurationDistribution::normal(3000.0, 0.0))
            .with_duration("B", "M2", DurationDistribution::normal(4000.0, 0.0))
    }

    /// Three jobs over three flexible machines.
    pub(crate) fn flexible() -> Scenario {
        Scenario::new()
            .with_job_steps(Job::new("J1"), [("J1_1", "cut"), ("J1_2", "weld")])
            .with_job_steps(Job::new("J2"), [("J2_1", "weld"), ("J2_2", "paint")])
            .with_job_steps(Job::new("J3"), [("J3_1", "cut"), ("J3_2", "paint")])
            .with_machine(Machine::new("M1").with_capability("cut").with_capability("weld"))
            .with_machine(Machine::new("M2").with_capability("weld").with_capability("paint"))
            .with_machine(Machine::new("M3").with_capability("cut").with_capability("paint"))
            .with_duration("cut", "M1", DurationDistribution::fixed(2000))
            .with_duration("cut", "M3", DurationDistribution::fixed(3000))
            .with_duration("weld", "M1", DurationDistribution::fixed(4000))
            .with_duration("weld", "M2", DurationDistribution::fixed(2500))
            .with_duration("paint", "M2", DurationDistribution::fixed(1500))
            .with_duration("paint", "M3", DurationDistribution::fixed(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_trace;

    #[test]
    fn test_optimize_two_by_two_all_algorithms() {
        let scenario = fixtures::two_by_two();
        for algorithm in [
            SearchAlgorithm::Dfs,
            SearchAlgorithm::BranchAndBound,
            SearchAlgorithm::Mcts,
        ] {
            let config = SearchConfig::default()
                .with_algorithm(algorithm)
                .with_max_nodes(5000);
            let result = optimize(&scenario, &config).unwrap();
            assert_eq!(result.summary.makespan_ms, 11000, "{algorithm}");
            assert_eq!(result.actions.len(), 4);
            assert!(validate_trace(&scenario, &result.trace).is_empty());
        }
    }

    #[test]
    fn test_result_replays() {
        let scenario = fixtures::flexible();
        let config = SearchConfig::default().with_algorithm(SearchAlgorithm::BranchAndBound);
        let result = optimize(&scenario, &config).unwrap();
        let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
        assert_eq!(sim.replay(result.summary.seed, &result.actions).unwrap(), result.trace);
    }

    #[test]
    fn test_summary_serializes() {
        let result = optimize(&fixtures::two_by_two(), &SearchConfig::default()).unwrap();
        let json = serde_json::to_string(&result.summary).unwrap();
        assert!(json.contains("\"termination\":\"exhausted\""));
        let back: ObjectiveSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result.summary);
    }

    #[test]
    fn test_mix_seed_spreads() {
        assert_ne!(mix_seed(42, 0, 0), mix_seed(42, 0, 1));
        assert_ne!(mix_seed(42, 1, 0), mix_seed(42, 0, 1));
        assert_eq!(mix_seed(7, 3, 2), mix_seed(7, 3, 2));
    }

    #[test]
    fn test_invalid_scenario_rejected() {
        let scenario = Scenario::new().with_job(crate::models::Job::new("J1"));
        let err = optimize(&scenario, &SearchConfig::default()).unwrap_err();
        assert!(matches!(err, SchedulingError::Scenario(_)));
    }
}
