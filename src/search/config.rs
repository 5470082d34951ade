//! Search configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Search algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchAlgorithm {
    /// Exhaustive depth-first search.
    Dfs,
    /// Best-first branch-and-bound.
    #[default]
    BranchAndBound,
    /// Monte-Carlo tree search.
    Mcts,
}

impl fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dfs => "dfs",
            Self::BranchAndBound => "branch_and_bound",
            Self::Mcts => "mcts",
        };
        f.write_str(s)
    }
}

impl FromStr for SearchAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "dfs" => Ok(Self::Dfs),
            "branch_and_bound" | "bnb" => Ok(Self::BranchAndBound),
            "mcts" => Ok(Self::Mcts),
            other => Err(format!(
                "unknown algorithm '{other}' (expected dfs, branch_and_bound or mcts)"
            )),
        }
    }
}

/// Greedy policy used for MCTS rollouts and greedy completions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPolicy {
    /// Earliest completion time.
    #[default]
    Ect,
    /// Shortest processing time.
    Spt,
    /// Apparent tardiness cost.
    Atc,
    /// Earliest due date.
    Edd,
}

impl fmt::Display for RolloutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ect => "ect",
            Self::Spt => "spt",
            Self::Atc => "atc",
            Self::Edd => "edd",
        };
        f.write_str(s)
    }
}

impl FromStr for RolloutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ect" => Ok(Self::Ect),
            "spt" => Ok(Self::Spt),
            "atc" => Ok(Self::Atc),
            "edd" => Ok(Self::Edd),
            other => Err(format!(
                "unknown rollout policy '{other}' (expected ect, spt, atc or edd)"
            )),
        }
    }
}

/// MCTS parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MctsConfig {
    /// UCB1 exploration constant.
    pub exploration: f64,
    /// Rollouts run from each new leaf.
    pub rollouts_per_leaf: u32,
    /// Iteration cap; `None` leaves only the node and time budgets.
    pub max_iterations: Option<u64>,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            exploration: std::f64::consts::SQRT_2,
            rollouts_per_leaf: 1,
            max_iterations: None,
        }
    }
}

impl MctsConfig {
    pub fn with_exploration(mut self, c: f64) -> Self {
        self.exploration = c.max(0.0);
        self
    }

    pub fn with_rollouts_per_leaf(mut self, n: u32) -> Self {
        self.rollouts_per_leaf = n.max(1);
        self
    }

    pub fn with_max_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }
}

/// Optimizer configuration.
///
/// # Example
/// ```
/// use u_jobshop::search::{RolloutPolicy, SearchAlgorithm, SearchConfig};
/// use std::time::Duration;
///
/// let config = SearchConfig::default()
///     .with_algorithm(SearchAlgorithm::Mcts)
///     .with_rollout_policy(RolloutPolicy::Atc)
///     .with_time_limit(Duration::from_secs(5))
///     .with_seed(7);
/// assert_eq!(config.time_limit(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub algorithm: SearchAlgorithm,
    pub rollout_policy: RolloutPolicy,
    /// Wall-clock budget (ms).
    pub time_limit_ms: u64,
    /// Node-expansion budget.
    pub max_nodes: u64,
    /// Base seed for duration sampling.
    pub seed: u64,
    /// Simulator lookahead (ms).
    pub lookahead_ms: i64,
    /// Parallel workers; 1 is fully deterministic.
    pub workers: usize,
    pub mcts: MctsConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            algorithm: SearchAlgorithm::default(),
            rollout_policy: RolloutPolicy::default(),
            time_limit_ms: 300_000,
            max_nodes: 10_000,
            seed: 42,
            lookahead_ms: 0,
            workers: 1,
            mcts: MctsConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn with_algorithm(mut self, algorithm: SearchAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_rollout_policy(mut self, policy: RolloutPolicy) -> Self {
        self.rollout_policy = policy;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_ms = limit.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: u64) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_lookahead(mut self, lookahead_ms: i64) -> Self {
        self.lookahead_ms = lookahead_ms.max(0);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_mcts(mut self, mcts: MctsConfig) -> Self {
        self.mcts = mcts;
        self
    }

    /// Wall-clock budget.
    pub fn time_limit(&self) -> Duration {
        Duration::from_millis(self.time_limit_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = SearchConfig::default();
        assert_eq!(c.algorithm, SearchAlgorithm::BranchAndBound);
        assert_eq!(c.rollout_policy, RolloutPolicy::Ect);
        assert_eq!(c.time_limit(), Duration::from_secs(300));
        assert_eq!(c.max_nodes, 10_000);
        assert_eq!(c.seed, 42);
        assert_eq!(c.workers, 1);
        assert!((c.mcts.exploration - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("dfs".parse::<SearchAlgorithm>().unwrap(), SearchAlgorithm::Dfs);
        assert_eq!(
            "branch-and-bound".parse::<SearchAlgorithm>().unwrap(),
            SearchAlgorithm::BranchAndBound
        );
        assert_eq!("ATC".parse::<RolloutPolicy>().unwrap(), RolloutPolicy::Atc);
        assert!("greedy".parse::<RolloutPolicy>().is_err());
        for a in [SearchAlgorithm::Dfs, SearchAlgorithm::BranchAndBound, SearchAlgorithm::Mcts] {
            assert_eq!(a.to_string().parse::<SearchAlgorithm>().unwrap(), a);
        }
    }

    #[test]
    fn test_partial_json() {
        let c: SearchConfig =
            serde_json::from_str(r#"{"algorithm":"mcts","mcts":{"rollouts_per_leaf":4}}"#).unwrap();
        assert_eq!(c.algorithm, SearchAlgorithm::Mcts);
        assert_eq!(c.mcts.rollouts_per_leaf, 4);
        assert_eq!(c.seed, 42);
    }

    #[test]
    fn test_builders_clamp() {
        let c = SearchConfig::default().with_workers(0).with_lookahead(-5);
        assert_eq!(c.workers, 1);
        assert_eq!(c.lookahead_ms, 0);
        assert_eq!(MctsConfig::default().with_rollouts_per_leaf(0).rollouts_per_leaf, 1);
    }
}
