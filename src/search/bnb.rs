//! Best-first branch-and-bound.
//!
//! Open nodes are ordered by lower bound (ties: deeper first, then
//! creation order). The incumbent starts from a greedy ECT completion;
//! a node whose bound exceeds the incumbent is pruned, and so is one
//! whose bound ties it unless its prefix could still yield a smaller
//! action sequence. Running out of open nodes proves optimality, and the
//! result is the smallest optimal sequence for any worker count.
//!
//! # Reference
//! Brucker (2007), "Scheduling Algorithms", Ch. 6.4

use rayon::prelude::*;
use std::collections::BinaryHeap;
use tracing::{debug, trace};

use super::{
    greedy_complete, policy_engine, worker_pool, Budget, Incumbent, Optimizer, RolloutPolicy,
    SearchAlgorithm, SearchConfig, SearchNode, SearchOutcome, Termination,
};
use crate::error::SchedulingError;
use crate::sim::{SimulationState, Simulator};

/// Branch-and-bound optimizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchAndBound;

impl Optimizer for BranchAndBound {
    fn algorithm(&self) -> SearchAlgorithm {
        SearchAlgorithm::BranchAndBound
    }

    fn search(&self, sim: &Simulator, config: &SearchConfig) -> Result<SearchOutcome, SchedulingError> {
        let budget = Budget::new(config.max_nodes, config.time_limit());
        let incumbent = Incumbent::new();

        let mut root = sim.initialize(config.seed);
        sim.settle(&mut root)?;

        let mut seed_state = root.clone();
        let greedy = greedy_complete(sim, &mut seed_state, &policy_engine(RolloutPolicy::Ect))?;
        incumbent.offer(greedy, seed_state.actions());
        debug!(makespan_ms = greedy, "incumbent seeded from ECT");

        if config.workers > 1 && !root.is_terminal() {
            let pool = worker_pool(config.workers)?;
            let children: Vec<SimulationState> = sim
                .legal_actions(&root)
                .iter()
                .filter_map(|a| sim.applied(&root, a).ok())
                .collect();
            let results: Vec<Result<(), SchedulingError>> = pool.install(|| {
                children
                    .into_par_iter()
                    .map(|child| {
                        budget.tick()?;
                        best_first(sim, child, &budget, &incumbent)
                    })
                    .collect()
            });
            for result in results {
                match result {
                    Err(err) if !err.is_recoverable() => return Err(err),
                    _ => {}
                }
            }
        } else {
            match best_first(sim, root, &budget, &incumbent) {
                Err(err) if !err.is_recoverable() => return Err(err),
                _ => {}
            }
        }

        let termination = budget.termination().unwrap_or(Termination::Exhausted);
        let exhausted = termination == Termination::Exhausted;
        let Some((makespan_ms, actions)) = incumbent.snapshot() else {
            return Err(SchedulingError::BudgetExceeded {
                nodes: budget.nodes_explored(),
            });
        };

        Ok(SearchOutcome {
            actions,
            makespan_ms,
            nodes_explored: budget.nodes_explored(),
            termination,
            optimal: exhausted,
            partial: !exhausted,
        })
    }
}

/// Best-first search below `start`.
fn best_first(
    sim: &Simulator,
    mut start: SimulationState,
    budget: &Budget,
    incumbent: &Incumbent,
) -> Result<(), SchedulingError> {
    if let Err(err) = sim.settle(&mut start) {
        trace!(error = %err, "dead branch");
        return Ok(());
    }
    if start.is_terminal() {
        incumbent.offer(start.completed_makespan_ms(), start.actions());
        return Ok(());
    }

    let mut sequence = 0u64;
    let mut open = BinaryHeap::new();
    open.push(SearchNode::new(sim, start, sequence));

    while let Some(node) = open.pop() {
        if node.lower_bound_ms > incumbent.bound() {
            // Every remaining node has a larger bound.
            break;
        }
        if !incumbent.admits(node.lower_bound_ms, node.state.actions()) {
            continue;
        }
        for action in sim.legal_actions(&node.state) {
            budget.tick()?;
            let mut child = match sim.applied(&node.state, &action) {
                Ok(child) => child,
                Err(err) if err.is_recoverable() => continue,
                Err(err) => return Err(err),
            };
            if sim.settle(&mut child).is_err() {
                continue;
            }
            if child.is_terminal() {
                incumbent.offer(child.completed_makespan_ms(), child.actions());
                continue;
            }
            sequence += 1;
            let child = SearchNode::new(sim, child, sequence);
            if incumbent.admits(child.lower_bound_ms, child.state.actions()) {
                open.push(child);
            } else {
                trace!(bound = child.lower_bound_ms, depth = child.depth, "pruned");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fixtures::{flexible, two_by_two};
    use crate::search::DfsOptimizer;
    use crate::sim::SimulatorConfig;

    #[test]
    fn test_bnb_two_by_two_optimal() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let out = BranchAndBound.search(&sim, &SearchConfig::default()).unwrap();
        assert_eq!(out.makespan_ms, 11000);
        assert!(out.optimal);
        assert_eq!(out.termination, Termination::Exhausted);
    }

    #[test]
    fn test_bnb_matches_dfs_optimum() {
        let sim = Simulator::new(&flexible(), SimulatorConfig::default()).unwrap();
        let config = SearchConfig::default().with_max_nodes(1_000_000);
        let dfs = DfsOptimizer.search(&sim, &config).unwrap();
        let bnb = BranchAndBound.search(&sim, &config).unwrap();
        assert!(dfs.optimal && bnb.optimal);
        assert_eq!(dfs.makespan_ms, bnb.makespan_ms);
        assert!(bnb.nodes_explored <= dfs.nodes_explored);
    }

    #[test]
    fn test_bnb_budget_keeps_greedy_incumbent() {
        let sim = Simulator::new(&flexible(), SimulatorConfig::default()).unwrap();
        let out = BranchAndBound
            .search(&sim, &SearchConfig::default().with_max_nodes(1))
            .unwrap();
        assert_eq!(out.actions.len(), 6);
        assert_eq!(sim.replay(42, &out.actions).unwrap().makespan_ms, out.makespan_ms);
        if !out.optimal {
            assert!(out.partial);
            assert_eq!(out.termination, Termination::NodeLimit);
        }
    }

    #[test]
    fn test_bnb_parallel_same_makespan() {
        let sim = Simulator::new(&flexible(), SimulatorConfig::default()).unwrap();
        let config = SearchConfig::default().with_max_nodes(1_000_000);
        let seq = BranchAndBound.search(&sim, &config).unwrap();
        let par = BranchAndBound.search(&sim, &config.clone().with_workers(4)).unwrap();
        assert!(par.optimal);
        assert_eq!(seq.makespan_ms, par.makespan_ms);
    }

    #[test]
    fn test_bnb_parallel_reproducible_actions_under_ties() {
        use crate::models::{DurationDistribution, Job, Machine, Scenario};

        // Interchangeable machines give many optimal schedules.
        let mut scenario = Scenario::new();
        for m in ["M1", "M2", "M3"] {
            scenario = scenario
                .with_machine(Machine::new(m).with_capability("A"))
                .with_duration("A", m, DurationDistribution::fixed(2000));
        }
        for j in 1..=4 {
            let job = format!("J{j}");
            let op = format!("J{j}_A");
            scenario = scenario.with_job_steps(Job::new(job.as_str()), [(op.as_str(), "A")]);
        }
        let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
        let config = SearchConfig::default().with_max_nodes(1_000_000);

        let seq = BranchAndBound.search(&sim, &config).unwrap();
        let dfs = DfsOptimizer.search(&sim, &config).unwrap();
        assert!(seq.optimal);
        assert_eq!(seq.makespan_ms, 4000);
        assert_eq!(seq.actions, dfs.actions);

        for _ in 0..20 {
            let par = BranchAndBound.search(&sim, &config.clone().with_workers(4)).unwrap();
            assert!(par.optimal);
            assert_eq!(par.actions, seq.actions);
        }
    }
}
