//! Exhaustive depth-first search.
//!
//! Enumerates every action sequence in (operation id, machine id) order
//! without pruning. Exhausting the tree proves optimality; a budget stop
//! returns the best leaf seen so far.

use rayon::prelude::*;
use tracing::{debug, trace};

use super::{
    greedy_complete, policy_engine, worker_pool, Budget, Incumbent, Optimizer, RolloutPolicy,
    SearchAlgorithm, SearchConfig, SearchOutcome, Termination,
};
use crate::error::SchedulingError;
use crate::sim::{Action, SimulationState, Simulator};

/// Depth-first optimizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DfsOptimizer;

impl Optimizer for DfsOptimizer {
    fn algorithm(&self) -> SearchAlgorithm {
        SearchAlgorithm::Dfs
    }

    fn search(&self, sim: &Simulator, config: &SearchConfig) -> Result<SearchOutcome, SchedulingError> {
        let budget = Budget::new(config.max_nodes, config.time_limit());
        let incumbent = Incumbent::new();

        let mut root = sim.initialize(config.seed);
        let actions = sim.settle(&mut root)?;

        if actions.is_empty() {
            incumbent.offer(root.completed_makespan_ms(), root.actions());
        } else if config.workers > 1 {
            let pool = worker_pool(config.workers)?;
            let results: Vec<Result<(), SchedulingError>> = pool.install(|| {
                actions
                    .par_iter()
                    .map(|action| root_child(sim, &root, action, &budget, &incumbent))
                    .collect()
            });
            for result in results {
                match result {
                    Err(err) if !err.is_recoverable() => return Err(err),
                    _ => {}
                }
            }
        } else {
            for action in &actions {
                match root_child(sim, &root, action, &budget, &incumbent) {
                    Ok(()) => {}
                    Err(err) if err.is_recoverable() => break,
                    Err(err) => return Err(err),
                }
            }
        }

        let termination = budget.termination().unwrap_or(Termination::Exhausted);
        let exhausted = termination == Termination::Exhausted;

        let (makespan_ms, actions) = match incumbent.snapshot() {
            Some(best) => best,
            None => {
                debug!("no leaf reached, completing greedily");
                let mut state = sim.initialize(config.seed);
                let makespan =
                    greedy_complete(sim, &mut state, &policy_engine(RolloutPolicy::Ect))?;
                (makespan, state.actions().to_vec())
            }
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

fn root_child(
    sim: &Simulator,
    root: &SimulationState,
    action: &Action,
    budget: &Budget,
    incumbent: &Incumbent,
) -> Result<(), SchedulingError> {
    budget.tick()?;
    expand_child(sim, root, action, budget, incumbent)
}

fn expand_child(
    sim: &Simulator,
    parent: &SimulationState,
    action: &Action,
    budget: &Budget,
    incumbent: &Incumbent,
) -> Result<(), SchedulingError> {
    match sim.applied(parent, action) {
        Ok(child) => descend(sim, child, budget, incumbent),
        Err(err) if err.is_recoverable() => {
            trace!(%action, error = %err, "action skipped");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Explores every completion of `state`.
///
/// Only a budget stop propagates as an error; dead-end branches are
/// abandoned silently.
fn descend(
    sim: &Simulator,
    mut state: SimulationState,
    budget: &Budget,
    incumbent: &Incumbent,
) -> Result<(), SchedulingError> {
    let actions = match sim.settle(&mut state) {
        Ok(actions) => actions,
        Err(err) => {
            trace!(error = %err, "dead branch");
            return Ok(());
        }
    };
    if actions.is_empty() {
        incumbent.offer(state.completed_makespan_ms(), state.actions());
        return Ok(());
    }
    for action in &actions {
        budget.tick()?;
        expand_child(sim, &state, action, budget, incumbent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fixtures::{flexible, two_by_two};
    use crate::sim::SimulatorConfig;

    #[test]
    fn test_dfs_two_by_two_optimal() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let out = DfsOptimizer.search(&sim, &SearchConfig::default()).unwrap();
        assert_eq!(out.makespan_ms, 11000);
        assert!(out.optimal);
        assert!(!out.partial);
        assert_eq!(out.termination, Termination::Exhausted);
        // Lexicographically smallest optimal sequence.
        assert_eq!(out.actions[0], Action::new(0, 0));
    }

    #[test]
    fn test_dfs_node_limit_is_partial() {
        let sim = Simulator::new(&flexible(), SimulatorConfig::default()).unwrap();
        let config = SearchConfig::default().with_max_nodes(3);
        let out = DfsOptimizer.search(&sim, &config).unwrap();
        assert!(out.partial);
        assert!(!out.optimal);
        assert_eq!(out.termination, Termination::NodeLimit);
        assert_eq!(out.actions.len(), 6);
        assert_eq!(sim.replay(42, &out.actions).unwrap().makespan_ms, out.makespan_ms);
    }

    #[test]
    fn test_dfs_parallel_matches_sequential() {
        let sim = Simulator::new(&flexible(), SimulatorConfig::default()).unwrap();
        let seq = DfsOptimizer
            .search(&sim, &SearchConfig::default().with_max_nodes(1_000_000))
            .unwrap();
        let par = DfsOptimizer
            .search(
                &sim,
                &SearchConfig::default().with_max_nodes(1_000_000).with_workers(3),
            )
            .unwrap();
        assert!(seq.optimal && par.optimal);
        assert_eq!(seq.makespan_ms, par.makespan_ms);
        assert_eq!(seq.actions, par.actions);
    }
}
