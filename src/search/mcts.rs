//! Monte-Carlo tree search.
//!
//! Each iteration runs the four classic phases over an arena tree:
//!
//! 1. **Selection**: descend through fully expanded nodes by UCB1
//! 2. **Expansion**: add one untried action as a new child
//! 3. **Rollout**: complete the child greedily with the rollout policy,
//!    `rollouts_per_leaf` times, each on its own duration stream
//! 4. **Backpropagation**: add visits and rewards up to the root
//!
//! Reward is `reference / makespan`, where the reference is the greedy
//! policy's makespan from the root, so rewards sit around 1.0.
//!
//! Tree states always sample with the base seed; only rollouts are
//! reseeded, from (worker seed, iteration, rollout).
//!
//! # References
//! - Kocsis & Szepesvári (2006), "Bandit Based Monte-Carlo Planning"
//! - Browne et al. (2012), "A Survey of Monte Carlo Tree Search Methods"

use rayon::prelude::*;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, trace};

use super::{
    greedy_complete, mix_seed, policy_engine, worker_pool, Budget, Optimizer, SearchAlgorithm,
    SearchConfig, SearchOutcome, Termination,
};
use crate::dispatching::RuleEngine;
use crate::error::SchedulingError;
use crate::sim::{Action, SimulationState, Simulator};

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeId(usize);

#[derive(Debug)]
struct TreeNode {
    parent: Option<NodeId>,
    action: Option<Action>,
    /// Settled state after `action`.
    state: SimulationState,
    children: Vec<NodeId>,
    untried: VecDeque<Action>,
    visits: u64,
    total_reward: f64,
    best_makespan_ms: i64,
    terminal: bool,
    /// Terminal, or every child exhausted.
    exhausted: bool,
}

impl TreeNode {
    fn new(parent: Option<NodeId>, action: Option<Action>, state: SimulationState, untried: Vec<Action>) -> Self {
        let terminal = untried.is_empty();
        Self {
            parent,
            action,
            state,
            children: Vec::new(),
            untried: untried.into(),
            visits: 0,
            total_reward: 0.0,
            best_makespan_ms: i64::MAX,
            terminal,
            exhausted: terminal,
        }
    }

    fn mean_reward(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.total_reward / self.visits as f64
        }
    }
}

/// Search tree of one worker.
#[derive(Debug)]
struct Tree {
    nodes: Vec<TreeNode>,
    iterations: u64,
}

impl Tree {
    fn root(&self) -> &TreeNode {
        &self.nodes[0]
    }

    fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    fn push(&mut self, node: TreeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let Some(parent) = node.parent {
            self.nodes[parent.0].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    /// UCB1 descent; stops at a node with untried actions or no open child.
    fn select(&self, exploration: f64) -> NodeId {
        let mut id = NodeId(0);
        loop {
            let node = self.node(id);
            if !node.untried.is_empty() || node.terminal {
                return id;
            }
            let ln_parent = (node.visits.max(1) as f64).ln();
            let best = node
                .children
                .iter()
                .copied()
                .filter(|&c| !self.node(c).exhausted)
                .map(|c| {
                    let child = self.node(c);
                    let n = child.visits.max(1) as f64;
                    (c, child.mean_reward() + exploration * (ln_parent / n).sqrt())
                })
                .fold(None, |best: Option<(NodeId, f64)>, (c, ucb)| match best {
                    Some((_, b)) if b >= ucb => best,
                    _ => Some((c, ucb)),
                });
            match best {
                Some((child, _)) => id = child,
                None => return id,
            }
        }
    }

    fn backpropagate(&mut self, leaf: NodeId, visits: u64, reward: f64, best_makespan_ms: i64) {
        let mut cursor = Some(leaf);
        while let Some(id) = cursor {
            let node = &mut self.nodes[id.0];
            node.visits += visits;
            node.total_reward += reward;
            node.best_makespan_ms = node.best_makespan_ms.min(best_makespan_ms);
            cursor = node.parent;
        }
    }

    /// Re-derives `exhausted` from `leaf` up to the root.
    fn propagate_exhausted(&mut self, leaf: NodeId) {
        let mut cursor = Some(leaf);
        while let Some(id) = cursor {
            let node = &self.nodes[id.0];
            let exhausted = node.terminal
                || (node.untried.is_empty()
                    && node.children.iter().all(|&c| self.nodes[c.0].exhausted));
            if !exhausted {
                return;
            }
            self.nodes[id.0].exhausted = true;
            cursor = self.nodes[id.0].parent;
        }
    }

    /// Descends by best mean reward (ties: more visits, then smaller action).
    fn principal_leaf(&self, from: NodeId) -> NodeId {
        let mut id = from;
        loop {
            let node = self.node(id);
            let best = node.children.iter().copied().max_by(|&a, &b| {
                let (na, nb) = (self.node(a), self.node(b));
                na.mean_reward()
                    .total_cmp(&nb.mean_reward())
                    .then(na.visits.cmp(&nb.visits))
                    .then(nb.action.cmp(&na.action))
            });
            match best {
                Some(child) => id = child,
                None => return id,
            }
        }
    }
}

/// Monte-Carlo tree search optimizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MctsOptimizer;

impl Optimizer for MctsOptimizer {
    fn algorithm(&self) -> SearchAlgorithm {
        SearchAlgorithm::Mcts
    }

    fn search(&self, sim: &Simulator, config: &SearchConfig) -> Result<SearchOutcome, SchedulingError> {
        let budget = Budget::new(config.max_nodes, config.time_limit());
        let engine = policy_engine(config.rollout_policy);

        let mut root = sim.initialize(config.seed);
        let root_actions = sim.settle(&mut root)?;

        let mut reference_state = root.clone();
        let reference = greedy_complete(sim, &mut reference_state, &engine)?.max(1);
        debug!(reference_ms = reference, policy = %config.rollout_policy, "mcts reference");

        let new_tree = || Tree {
            nodes: vec![TreeNode::new(None, None, root.clone(), root_actions.clone())],
            iterations: 0,
        };

        let (tree, start, capped) = if config.workers > 1 {
            let pool = worker_pool(config.workers)?;
            let grown: Vec<Result<(Tree, bool), SchedulingError>> = pool.install(|| {
                (0..config.workers as u64)
                    .into_par_iter()
                    .map(|w| {
                        let mut tree = new_tree();
                        let worker_seed = mix_seed(config.seed, w, 0);
                        let capped =
                            grow(sim, &mut tree, config, &engine, &budget, reference, worker_seed)?;
                        Ok((tree, capped))
                    })
                    .collect()
            });
            let grown = grown.into_iter().collect::<Result<Vec<_>, _>>()?;
            let capped = grown.iter().any(|(_, c)| *c);
            let (tree, start) = merge_roots(grown.into_iter().map(|(t, _)| t).collect());
            (tree, start, capped)
        } else {
            let mut tree = new_tree();
            let capped = grow(sim, &mut tree, config, &engine, &budget, reference, config.seed)?;
            (tree, NodeId(0), capped)
        };

        let leaf = tree.principal_leaf(start);
        let mut state = tree.node(leaf).state.clone();
        let makespan_ms = greedy_complete(sim, &mut state, &engine)?;

        let termination = match budget.termination() {
            Some(reason) => reason,
            None if capped => Termination::IterationLimit,
            None => Termination::Exhausted,
        };
        debug!(
            iterations = tree.iterations,
            tree_size = tree.nodes.len(),
            root_visits = tree.root().visits,
            best_seen_ms = tree.root().best_makespan_ms,
            "mcts finished"
        );

        Ok(SearchOutcome {
            actions: state.actions().to_vec(),
            makespan_ms,
            nodes_explored: budget.nodes_explored(),
            termination,
            optimal: false,
            partial: false,
        })
    }
}

/// Runs iterations until the tree is exhausted or the budget stops it.
///
/// Returns whether the iteration cap stopped it.
fn grow(
    sim: &Simulator,
    tree: &mut Tree,
    config: &SearchConfig,
    engine: &RuleEngine,
    budget: &Budget,
    reference: i64,
    rollout_seed: u64,
) -> Result<bool, SchedulingError> {
    let rollouts = config.mcts.rollouts_per_leaf.max(1);
    loop {
        if tree.root().exhausted || budget.check().is_err() {
            return Ok(false);
        }
        if config.mcts.max_iterations.is_some_and(|max| tree.iterations >= max) {
            return Ok(true);
        }
        let iteration = tree.iterations;
        tree.iterations += 1;

        let selected = tree.select(config.mcts.exploration);
        let Some(action) = tree.nodes[selected.0].untried.pop_front() else {
            // Only reachable for a terminal node or one whose children are all exhausted.
            tree.propagate_exhausted(selected);
            continue;
        };
        if budget.tick().is_err() {
            return Ok(false);
        }

        let parent_state = &tree.node(selected).state;
        let mut child = match sim.applied(parent_state, &action) {
            Ok(child) => child,
            Err(err) if err.is_recoverable() => {
                tree.propagate_exhausted(selected);
                continue;
            }
            Err(err) => return Err(err),
        };
        let (untried, dead) = match sim.settle(&mut child) {
            Ok(actions) => (actions, false),
            Err(err) => {
                trace!(error = %err, "dead leaf");
                (Vec::new(), true)
            }
        };
        let leaf = tree.push(TreeNode::new(Some(selected), Some(action), child, untried));

        let (visits, reward, best) = if dead {
            (1, 0.0, i64::MAX)
        } else if tree.node(leaf).terminal {
            let makespan = tree.node(leaf).state.completed_makespan_ms().max(1);
            (1, reference as f64 / makespan as f64, makespan)
        } else {
            let mut total = 0.0;
            let mut best = i64::MAX;
            for r in 0..u64::from(rollouts) {
                let mut state = tree.node(leaf).state.clone();
                sim.reseed(&mut state, mix_seed(rollout_seed, iteration, r));
                if let Ok(makespan) = greedy_complete(sim, &mut state, engine) {
                    let makespan = makespan.max(1);
                    total += reference as f64 / makespan as f64;
                    best = best.min(makespan);
                }
            }
            (u64::from(rollouts), total, best)
        };
        tree.backpropagate(leaf, visits, reward, best);
        tree.propagate_exhausted(leaf);
    }
}

/// Sums root statistics across workers and picks the tree to descend.
///
/// Returns the tree holding the most-visited copy of the best root
/// action, and that child's id.
fn merge_roots(trees: Vec<Tree>) -> (Tree, NodeId) {
    let mut stats: BTreeMap<Action, (u64, f64)> = BTreeMap::new();
    for tree in &trees {
        for &c in &tree.root().children {
            let child = tree.node(c);
            if let Some(action) = child.action {
                let entry = stats.entry(action).or_default();
                entry.0 += child.visits;
                entry.1 += child.total_reward;
            }
        }
    }
    let best_action = stats
        .iter()
        .filter(|(_, (v, _))| *v > 0)
        .map(|(a, (v, r))| (*a, r / *v as f64, *v))
        .fold(None, |best: Option<(Action, f64, u64)>, cur| match best {
            Some(b) if (b.1, b.2) >= (cur.1, cur.2) => Some(b),
            _ => Some(cur),
        })
        .map(|(a, _, _)| a);

    let mut chosen: Option<(usize, NodeId, u64)> = None;
    for (t, tree) in trees.iter().enumerate() {
        for &c in &tree.root().children {
            let child = tree.node(c);
            let more_visited = match chosen {
                Some((_, _, v)) => child.visits > v,
                None => true,
            };
            if child.action == best_action && more_visited {
                chosen = Some((t, c, child.visits));
            }
        }
    }

    let mut trees = trees;
    match chosen {
        Some((t, c, _)) => (trees.swap_remove(t), c),
        None => (trees.swap_remove(0), NodeId(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DurationDistribution, Job, Machine, Scenario};
    use crate::search::fixtures::{flexible, two_by_two};
    use crate::search::{BranchAndBound, MctsConfig, RolloutPolicy};
    use crate::sim::SimulatorConfig;

    #[test]
    fn test_mcts_two_by_two() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let out = MctsOptimizer.search(&sim, &SearchConfig::default()).unwrap();
        assert_eq!(out.makespan_ms, 11000);
        assert_eq!(out.actions.len(), 4);
        // Tiny tree: explored completely before any budget.
        assert_eq!(out.termination, Termination::Exhausted);
    }

    #[test]
    fn test_mcts_never_beats_proven_optimum() {
        let sim = Simulator::new(&flexible(), SimulatorConfig::default()).unwrap();
        let base = SearchConfig::default().with_max_nodes(1_000_000);
        let bnb = BranchAndBound.search(&sim, &base).unwrap();
        for policy in [RolloutPolicy::Ect, RolloutPolicy::Spt, RolloutPolicy::Atc, RolloutPolicy::Edd] {
            let config = base
                .clone()
                .with_rollout_policy(policy)
                .with_mcts(MctsConfig::default().with_max_iterations(200));
            let out = MctsOptimizer.search(&sim, &config).unwrap();
            assert!(out.makespan_ms >= bnb.makespan_ms, "{policy}");
            assert_eq!(sim.replay(42, &out.actions).unwrap().makespan_ms, out.makespan_ms);
        }
    }

    #[test]
    fn test_mcts_iteration_limit() {
        let sim = Simulator::new(&flexible(), SimulatorConfig::default()).unwrap();
        let config = SearchConfig::default().with_mcts(MctsConfig::default().with_max_iterations(2));
        let out = MctsOptimizer.search(&sim, &config).unwrap();
        assert_eq!(out.termination, Termination::IterationLimit);
        assert!(out.nodes_explored <= 2);
        assert_eq!(out.actions.len(), 6);
    }

    #[test]
    fn test_mcts_deterministic_with_stochastic_durations() {
        let scenario = Scenario::new()
            .with_job_steps(Job::new("J1"), [("J1_A", "A"), ("J1_B", "B")])
            .with_job_steps(Job::new("J2"), [("J2_A", "A"), ("J2_B", "B")])
            .with_job_steps(Job::new("J3"), [("J3_A", "B"), ("J3_B", "A")])
            .with_machine(Machine::new("M1").with_capability("A").with_capability("B"))
            .with_machine(Machine::new("M2").with_capability("B"))
            .with_duration("A", "M1", DurationDistribution::normal(3000.0, 600.0))
            .with_duration("B", "M1", DurationDistribution::uniform(2000.0, 5000.0))
            .with_duration("B", "M2", DurationDistribution::exponential(3500.0));
        let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
        let config = SearchConfig::default()
            .with_seed(11)
            .with_mcts(MctsConfig::default().with_max_iterations(150).with_rollouts_per_leaf(3));
        let a = MctsOptimizer.search(&sim, &config).unwrap();
        let b = MctsOptimizer.search(&sim, &config).unwrap();
        assert_eq!(a.actions, b.actions);
        assert_eq!(a.makespan_ms, b.makespan_ms);
    }

    #[test]
    fn test_mcts_parallel_workers() {
        let sim = Simulator::new(&flexible(), SimulatorConfig::default()).unwrap();
        let config = SearchConfig::default()
            .with_workers(3)
            .with_mcts(MctsConfig::default().with_max_iterations(100));
        let out = MctsOptimizer.search(&sim, &config).unwrap();
        assert_eq!(out.actions.len(), 6);
        assert_eq!(sim.replay(42, &out.actions).unwrap().makespan_ms, out.makespan_ms);
    }
}
