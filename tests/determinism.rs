//! Tests for deterministic simulation and search.
//!
//! The same scenario, seed and action sequence must always produce the
//! same trace, and every optimizer must be reproducible for a fixed seed
//! and worker count.

use std::time::Duration;
use tracing_test::traced_test;
use u_jobshop::models::{DurationDistribution, Job, Machine, Scenario, TransferTimeMatrix};
use u_jobshop::search::{optimize, MctsConfig, RolloutPolicy, SearchAlgorithm, SearchConfig};
use u_jobshop::sim::{Simulator, SimulatorConfig};
use u_jobshop::validation::validate_trace;

/// Three jobs over three machines with stochastic durations and transfers.
fn stochastic_shop() -> Scenario {
    Scenario::new()
        .with_job_steps(
            Job::new("J1").with_due_date(20_000),
            [("J1_cut", "cut"), ("J1_weld", "weld")],
        )
        .with_job_steps(
            Job::new("J2").with_priority(2),
            [("J2_cut", "cut"), ("J2_paint", "paint")],
        )
        .with_job_steps(
            Job::new("J3").with_release_time(1_000),
            [("J3_weld", "weld"), ("J3_paint", "paint")],
        )
        .with_machine(Machine::new("M1").with_capability("cut").with_capability("weld"))
        .with_machine(Machine::new("M2").with_capability("weld").with_capability("paint"))
        .with_machine(Machine::new("M3").with_capability("cut").with_capability("paint"))
        .with_duration("cut", "M1", DurationDistribution::normal(3_000.0, 400.0))
        .with_duration("cut", "M3", DurationDistribution::uniform(2_000.0, 4_500.0))
        .with_duration("weld", "M1", DurationDistribution::exponential(2_500.0))
        .with_duration("weld", "M2", DurationDistribution::normal(2_000.0, 300.0))
        .with_duration("paint", "M2", DurationDistribution::fixed(1_500))
        .with_duration("paint", "M3", DurationDistribution::normal(1_800.0, 200.0))
        .with_transfers(
            TransferTimeMatrix::new()
                .with_default(200)
                .with_transfer("M1", "M2", 500),
        )
}

fn config(algorithm: SearchAlgorithm) -> SearchConfig {
    SearchConfig::default()
        .with_algorithm(algorithm)
        .with_max_nodes(2_000)
        .with_time_limit(Duration::from_secs(60))
}

#[traced_test]
#[test]
fn test_initialize_is_reproducible() {
    let sim = Simulator::new(&stochastic_shop(), SimulatorConfig::default()).unwrap();
    let a = sim.initialize(7);
    let b = sim.initialize(7);
    assert_eq!(sim.legal_actions(&a), sim.legal_actions(&b));
    for op in 0..sim.operation_count() {
        for &m in sim.eligible_machines(op) {
            assert_eq!(sim.sample_duration(&a, op, m), sim.sample_duration(&b, op, m));
        }
    }
}

#[traced_test]
#[test]
fn test_replay_reproduces_optimizer_trace() {
    let scenario = stochastic_shop();
    for algorithm in [SearchAlgorithm::Dfs, SearchAlgorithm::BranchAndBound, SearchAlgorithm::Mcts] {
        let result = optimize(&scenario, &config(algorithm)).unwrap();
        assert!(validate_trace(&scenario, &result.trace).is_empty(), "{algorithm}");
        assert_eq!(result.trace.len(), scenario.operations.len());

        let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
        let replayed = sim.replay(result.summary.seed, &result.actions).unwrap();
        assert_eq!(replayed, result.trace, "{algorithm}");
        assert_eq!(replayed.makespan_ms, result.summary.makespan_ms);
    }
}

#[traced_test]
#[test]
fn test_same_seed_same_result() {
    let scenario = stochastic_shop();
    for algorithm in [SearchAlgorithm::Dfs, SearchAlgorithm::BranchAndBound, SearchAlgorithm::Mcts] {
        let first = optimize(&scenario, &config(algorithm)).unwrap();
        let second = optimize(&scenario, &config(algorithm)).unwrap();
        assert_eq!(first.actions, second.actions, "{algorithm}");
        assert_eq!(first.trace, second.trace, "{algorithm}");
        assert_eq!(first.summary.nodes_explored, second.summary.nodes_explored);
    }
}

#[traced_test]
#[test]
fn test_mcts_reproducible_for_every_policy() {
    let scenario = stochastic_shop();
    for policy in [RolloutPolicy::Ect, RolloutPolicy::Spt, RolloutPolicy::Atc, RolloutPolicy::Edd] {
        let cfg = config(SearchAlgorithm::Mcts)
            .with_rollout_policy(policy)
            .with_seed(11);
        let a = optimize(&scenario, &cfg).unwrap();
        let b = optimize(&scenario, &cfg).unwrap();
        assert_eq!(a.trace, b.trace, "{policy}");
    }
}

/// Reproducible across runs as long as the shared node budget does not
/// cut the workers short.
#[traced_test]
#[test]
fn test_parallel_workers_reproducible() {
    let scenario = stochastic_shop();
    for algorithm in [SearchAlgorithm::BranchAndBound, SearchAlgorithm::Mcts] {
        let cfg = config(algorithm)
            .with_max_nodes(5_000_000)
            .with_workers(3)
            .with_mcts(MctsConfig::default().with_max_iterations(200));
        let a = optimize(&scenario, &cfg).unwrap();
        let b = optimize(&scenario, &cfg).unwrap();
        assert_eq!(a.trace, b.trace, "{algorithm}");
        assert!(validate_trace(&scenario, &a.trace).is_empty());
    }
}

#[traced_test]
#[test]
fn test_branch_and_bound_independent_of_worker_count() {
    let scenario = stochastic_shop();
    let cfg = config(SearchAlgorithm::BranchAndBound).with_max_nodes(5_000_000);
    let single = optimize(&scenario, &cfg).unwrap();
    for workers in [2, 4] {
        let multi = optimize(&scenario, &cfg.clone().with_workers(workers)).unwrap();
        assert_eq!(multi.trace, single.trace, "workers = {workers}");
    }
}

#[traced_test]
#[test]
fn test_seed_changes_sampled_durations() {
    let sim = Simulator::new(&stochastic_shop(), SimulatorConfig::default()).unwrap();
    let durations = |seed: u64| -> Vec<Option<i64>> {
        let state = sim.initialize(seed);
        (0..sim.operation_count())
            .flat_map(|op| {
                sim.eligible_machines(op)
                    .iter()
                    .map(move |&m| (op, m))
                    .collect::<Vec<_>>()
            })
            .map(|(op, m)| sim.sample_duration(&state, op, m))
            .collect()
    };
    assert_eq!(durations(1), durations(1));
    assert_ne!(durations(1), durations(2));
}

#[traced_test]
#[test]
fn test_snapshot_restore() {
    let sim = Simulator::new(&stochastic_shop(), SimulatorConfig::default()).unwrap();
    let mut state = sim.initialize(3);
    let actions = sim.settle(&mut state).unwrap();
    let snapshot = state.clone();

    sim.apply(&mut state, &actions[0]).unwrap();
    let _ = sim.finish(&mut state);
    state = snapshot.clone();

    assert_eq!(state.clock_ms(), snapshot.clock_ms());
    assert_eq!(state.actions(), snapshot.actions());
    assert_eq!(sim.legal_actions(&state), actions);
}
