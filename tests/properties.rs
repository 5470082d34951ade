//! Property tests over randomly generated small job shops.

use proptest::prelude::*;
use std::time::Duration;
use u_jobshop::models::{DurationDistribution, Job, Machine, Scenario};
use u_jobshop::search::{optimize, MctsConfig, RolloutPolicy, SearchAlgorithm, SearchConfig};
use u_jobshop::sim::{Simulator, SimulatorConfig};
use u_jobshop::validation::validate_trace;

const TYPES: [&str; 2] = ["A", "B"];

/// Job routings (operation type indices), per-machine capability masks
/// and per-(type, machine) durations in seconds.
fn shop() -> impl Strategy<Value = Scenario> {
    (
        prop::collection::vec(prop::collection::vec(0..2usize, 1..=2), 1..=3),
        prop::collection::vec((any::<bool>(), any::<bool>()), 1..=2),
        prop::collection::vec(1..=6i64, 4),
    )
        .prop_map(|(jobs, masks, secs)| build(&jobs, &masks, &secs))
}

fn build(jobs: &[Vec<usize>], masks: &[(bool, bool)], secs: &[i64]) -> Scenario {
    let mut scenario = Scenario::new();
    for (j, routing) in jobs.iter().enumerate() {
        let id = format!("J{}", j + 1);
        let steps: Vec<(String, &str)> = routing
            .iter()
            .enumerate()
            .map(|(k, &t)| (format!("{id}_{k}"), TYPES[t]))
            .collect();
        scenario = scenario.with_job_steps(Job::new(id), steps);
    }
    for (m, &(a, b)) in masks.iter().enumerate() {
        let id = format!("M{}", m + 1);
        let mut machine = Machine::new(id.clone());
        // M1 can do everything so every type has a machine.
        for (t, capable) in [(0, a || m == 0), (1, b || m == 0)] {
            if capable {
                machine = machine.with_capability(TYPES[t]);
                scenario = scenario.with_duration(
                    TYPES[t],
                    id.clone(),
                    DurationDistribution::fixed(secs[t * 2 + m] * 1_000),
                );
            }
        }
        scenario = scenario.with_machine(machine);
    }
    scenario
}

fn config(algorithm: SearchAlgorithm) -> SearchConfig {
    SearchConfig::default()
        .with_algorithm(algorithm)
        .with_max_nodes(1_000_000)
        .with_time_limit(Duration::from_secs(120))
        .with_mcts(MctsConfig::default().with_max_iterations(60))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_exhaustive_searches_agree(scenario in shop()) {
        let dfs = optimize(&scenario, &config(SearchAlgorithm::Dfs)).unwrap();
        let bnb = optimize(&scenario, &config(SearchAlgorithm::BranchAndBound)).unwrap();
        prop_assert!(dfs.summary.optimal);
        prop_assert!(bnb.summary.optimal);
        prop_assert_eq!(dfs.summary.makespan_ms, bnb.summary.makespan_ms);
        prop_assert!(validate_trace(&scenario, &dfs.trace).is_empty());
    }

    #[test]
    fn prop_mcts_never_beats_optimum(scenario in shop(), policy in 0..4usize) {
        let policy = [RolloutPolicy::Ect, RolloutPolicy::Spt, RolloutPolicy::Atc, RolloutPolicy::Edd][policy];
        let bnb = optimize(&scenario, &config(SearchAlgorithm::BranchAndBound)).unwrap();
        let mcts = optimize(
            &scenario,
            &config(SearchAlgorithm::Mcts).with_rollout_policy(policy),
        )
        .unwrap();
        prop_assert!(mcts.summary.makespan_ms >= bnb.summary.makespan_ms);
        prop_assert!(validate_trace(&scenario, &mcts.trace).is_empty());
    }

    #[test]
    fn prop_traces_feasible_and_bounded(scenario in shop()) {
        let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
        let root_bound = sim.lower_bound(&sim.initialize(42));
        let result = optimize(&scenario, &config(SearchAlgorithm::BranchAndBound)).unwrap();

        prop_assert!(validate_trace(&scenario, &result.trace).is_empty());
        prop_assert_eq!(result.trace.len(), scenario.operations.len());
        prop_assert!(root_bound <= result.summary.makespan_ms);

        // No schedule beats the longest single operation.
        let longest_op: i64 = scenario
            .operations
            .iter()
            .map(|op| {
                scenario
                    .eligible_machines(&op.operation_type)
                    .iter()
                    .filter_map(|m| scenario.durations.get(&op.operation_type, &m.id))
                    .map(|d| d.expected_ms() as i64)
                    .min()
                    .unwrap_or(0)
            })
            .max()
            .unwrap_or(0);
        prop_assert!(result.summary.makespan_ms >= longest_op);
    }
}
