//! Job-shop scheduling CLI
//!
//! Optimizes a scenario, or dispatches it with the control tower, and
//! prints the result as JSON.
//!
//! # Example
//!
//! ```bash
//! # Branch-and-bound with the default budget
//! u-jobshop --scenario shop.json
//!
//! # MCTS with ATC rollouts on four workers
//! u-jobshop --scenario shop.json --algorithm mcts --policy atc --workers 4
//!
//! # Dynamic dispatching
//! u-jobshop --scenario shop.json --dispatch least_loaded
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use u_jobshop::control::{ControlTower, DispatchStrategy, RoutingResult, TowerStats};
use u_jobshop::kpi::ScheduleKpi;
use u_jobshop::models::{Scenario, Trace};
use u_jobshop::search::{self, ObjectiveSummary, RolloutPolicy, SearchAlgorithm, SearchConfig};
use u_jobshop::sim::{Simulator, SimulatorConfig};

/// Job-shop scheduler
///
/// Deterministic for a given scenario, seed and worker count.
#[derive(Parser, Debug)]
#[command(name = "u-jobshop")]
#[command(version, about, long_about = None)]
struct Args {
    /// Scenario JSON file
    #[arg(short = 's', long)]
    scenario: PathBuf,

    /// Search algorithm (dfs, branch_and_bound, mcts)
    #[arg(short = 'a', long, default_value = "branch_and_bound")]
    algorithm: SearchAlgorithm,

    /// Rollout policy for MCTS (ect, spt, atc, edd)
    #[arg(short = 'p', long, default_value = "ect")]
    policy: RolloutPolicy,

    /// Wall-clock search limit in milliseconds
    #[arg(long, default_value = "300000")]
    time_limit_ms: u64,

    /// Maximum node expansions
    #[arg(long, default_value = "10000")]
    max_nodes: u64,

    /// Random seed for duration sampling and rollouts
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Parallel search workers
    #[arg(short = 'w', long, default_value = "1")]
    workers: usize,

    /// Offer machines that free up within this many milliseconds (lets the
    /// control tower queue work on busy machines)
    #[arg(long, default_value = "0")]
    lookahead_ms: i64,

    /// Run the control tower with this strategy instead of searching
    #[arg(short = 'd', long)]
    dispatch: Option<DispatchStrategy>,
}

#[derive(Serialize)]
struct OptimizeReport<'a> {
    summary: &'a ObjectiveSummary,
    kpi: ScheduleKpi,
    trace: &'a Trace,
}

#[derive(Serialize)]
struct DispatchReport<'a> {
    routing: RoutingResult,
    stats: &'a TowerStats,
    kpi: ScheduleKpi,
    trace: &'a Trace,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,u_jobshop=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let scenario = load_scenario(&args.scenario)?;
    info!(
        path = %args.scenario.display(),
        jobs = scenario.jobs.len(),
        operations = scenario.operations.len(),
        machines = scenario.machines.len(),
        "scenario loaded"
    );

    let output = match args.dispatch {
        Some(strategy) => dispatch(&scenario, &args, strategy)?,
        None => optimize(&scenario, &args)?,
    };
    println!("{output}");
    Ok(())
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing scenario {}", path.display()))
}

fn optimize(scenario: &Scenario, args: &Args) -> Result<String> {
    let config = SearchConfig::default()
        .with_algorithm(args.algorithm)
        .with_rollout_policy(args.policy)
        .with_time_limit(Duration::from_millis(args.time_limit_ms))
        .with_max_nodes(args.max_nodes)
        .with_seed(args.seed)
        .with_workers(args.workers)
        .with_lookahead(args.lookahead_ms);

    let result = search::optimize(scenario, &config).context("optimization failed")?;
    let report = OptimizeReport {
        summary: &result.summary,
        kpi: ScheduleKpi::calculate(&result.trace, scenario),
        trace: &result.trace,
    };
    serde_json::to_string_pretty(&report).context("serializing result")
}

fn dispatch(scenario: &Scenario, args: &Args, strategy: DispatchStrategy) -> Result<String> {
    let sim = Simulator::new(
        scenario,
        SimulatorConfig::default().with_lookahead(args.lookahead_ms),
    )
    .context("invalid scenario")?;

    let mut tower = ControlTower::new(sim.clone(), strategy);
    tower.add_all_jobs()?;
    let mut state = sim.initialize(args.seed);
    let trace = tower
        .run_to_completion(&mut state)
        .with_context(|| format!("dispatching with {strategy}"))?;

    let report = DispatchReport {
        routing: tower.export_routing_result(),
        stats: tower.stats(),
        kpi: ScheduleKpi::calculate(&trace, scenario),
        trace: &trace,
    };
    serde_json::to_string_pretty(&report).context("serializing routing result")
}
