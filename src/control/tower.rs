//! Control tower.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{DispatchStrategy, RoutingEntry, RoutingResult};
use crate::dispatching::{DecisionContext, RuleEngine};
use crate::error::SchedulingError;
use crate::models::{MachineStatus, Trace};
use crate::sim::{Action, Candidate, SimulationState, Simulator};

/// An operation waiting to be routed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub operation_id: String,
    pub job_id: String,
    pub priority: i32,
    #[serde(skip)]
    operation: usize,
}

/// Snapshot of one machine as seen by the tower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineView {
    pub machine_id: String,
    pub status: MachineStatus,
    pub next_available_ms: i64,
    /// Committed, unfinished operations.
    pub queue_len: usize,
    pub workload_ms: i64,
    /// Busy time of finished work over elapsed time.
    pub utilization: f64,
}

/// Running totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TowerStats {
    pub total_assignments: usize,
    /// Sum of sampled durations of assigned operations (ms).
    pub total_processing_ms: i64,
    /// Assignments per machine ID.
    pub assignments_per_machine: BTreeMap<String, usize>,
    /// Decision rounds that assigned at least one operation.
    pub decision_rounds: usize,
}

/// Dynamic dispatcher over a [`Simulator`].
///
/// Machine choice is limited to the machines the simulator offers at the
/// current decision point: idle ones by default, or also busy ones that
/// free up within [`SimulatorConfig::lookahead_ms`](crate::sim::SimulatorConfig).
///
/// # Example
/// ```
/// use u_jobshop::control::{ControlTower, DispatchStrategy};
/// use u_jobshop::models::{DurationDistribution, Job, Machine, Scenario};
/// use u_jobshop::sim::{Simulator, SimulatorConfig};
///
/// let scenario = Scenario::new()
///     .with_job_steps(Job::new("J1"), [("J1_A", "A")])
///     .with_machine(Machine::new("M1").with_capability("A"))
///     .with_duration("A", "M1", DurationDistribution::fixed(1000));
/// let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
///
/// let mut tower = ControlTower::new(sim.clone(), DispatchStrategy::LoadBalancing);
/// tower.add_job_operations("J1", &["J1_A"], 0).unwrap();
/// let mut state = sim.initialize(42);
/// let trace = tower.run_to_completion(&mut state).unwrap();
/// assert_eq!(trace.makespan_ms, 1000);
/// assert_eq!(tower.export_routing_result().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ControlTower {
    simulator: Simulator,
    strategy: DispatchStrategy,
    engine: RuleEngine,
    pending: Vec<PendingOperation>,
    history: Vec<RoutingEntry>,
    stats: TowerStats,
}

impl ControlTower {
    pub fn new(simulator: Simulator, strategy: DispatchStrategy) -> Self {
        Self {
            simulator,
            strategy,
            engine: strategy.engine(),
            pending: Vec::new(),
            history: Vec::new(),
            stats: TowerStats::default(),
        }
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    /// Operations not yet routed, in service order.
    pub fn pending(&self) -> &[PendingOperation] {
        &self.pending
    }

    /// Queues a job's operations.
    ///
    /// Pending operations stay sorted by priority, descending; equal
    /// priorities keep insertion order. Operations already pending are
    /// ignored. Returns how many were added.
    ///
    /// # Errors
    /// [`SchedulingError::UnknownEntity`] if an ID is unknown or the
    /// operation belongs to another job. Nothing is queued in that case.
    pub fn add_job_operations<S: AsRef<str>>(
        &mut self,
        job_id: &str,
        operation_ids: &[S],
        priority: i32,
    ) -> Result<usize, SchedulingError> {
        let sim = &self.simulator;
        let job = sim.job_index(job_id).ok_or_else(|| SchedulingError::UnknownEntity {
            kind: "job",
            id: job_id.to_string(),
        })?;

        let mut incoming = Vec::with_capacity(operation_ids.len());
        for id in operation_ids {
            let id = id.as_ref();
            let op = sim
                .operation_index(id)
                .filter(|&op| sim.job_of(op) == job)
                .ok_or_else(|| SchedulingError::UnknownEntity {
                    kind: "operation",
                    id: id.to_string(),
                })?;
            let duplicate = self.pending.iter().chain(incoming.iter()).any(|p: &PendingOperation| p.operation == op);
            if !duplicate {
                incoming.push(PendingOperation {
                    operation_id: id.to_string(),
                    job_id: job_id.to_string(),
                    priority,
                    operation: op,
                });
            }
        }

        let added = incoming.len();
        self.pending.extend(incoming);
        self.pending.sort_by(|a, b| b.priority.cmp(&a.priority));
        debug!(job = job_id, added, priority, pending = self.pending.len(), "operations queued");
        Ok(added)
    }

    /// Queues every operation of every job, with the job's own priority.
    pub fn add_all_jobs(&mut self) -> Result<usize, SchedulingError> {
        let mut added = 0;
        for j in 0..self.simulator.job_count() {
            let job_id = self.simulator.job_id(j).to_string();
            let ops: Vec<String> = self
                .simulator
                .job_operations(j)
                .iter()
                .map(|&op| self.simulator.operation_id(op).to_string())
                .collect();
            let priority = self.simulator.job_priority(j);
            added += self.add_job_operations(&job_id, &ops, priority)?;
        }
        Ok(added)
    }

    /// The action the strategy would take now, if any pending operation
    /// can be routed.
    pub fn decide(&self, state: &SimulationState) -> Option<Action> {
        self.decide_candidate(state).map(|c| c.action)
    }

    fn decide_candidate(&self, state: &SimulationState) -> Option<Candidate> {
        let pending: BTreeMap<usize, (usize, i32)> = self
            .pending
            .iter()
            .enumerate()
            .map(|(i, p)| (p.operation, (i, p.priority)))
            .collect();
        let candidates: Vec<Candidate> = self
            .simulator
            .legal_actions(state)
            .into_iter()
            .filter_map(|action| {
                let &(rank, priority) = pending.get(&action.operation)?;
                let mut c = self.simulator.candidate(state, action);
                c.rank = rank;
                c.priority = priority;
                Some(c)
            })
            .collect();
        let context = DecisionContext::for_candidates(state.clock_ms(), &candidates);
        let best = self.engine.select_best(&candidates, &context)?;
        candidates.into_iter().nth(best)
    }

    /// Routes pending operations at the current decision point until no
    /// more can be placed.
    ///
    /// # Errors
    /// Simulator errors from applying a chosen action.
    pub fn assign_operations(&mut self, state: &mut SimulationState) -> Result<Vec<Action>, SchedulingError> {
        self.simulator.process_due(state);
        let mut assigned = Vec::new();
        while let Some(candidate) = self.decide_candidate(state) {
            let action = candidate.action;
            self.simulator.apply(state, &action)?;

            let (start, end) = self
                .simulator
                .projected_window(state, action.operation)
                .unwrap_or((candidate.earliest_start_ms, candidate.sampled_completion_ms()));
            self.history.push(RoutingEntry {
                operation_id: candidate.operation_id.clone(),
                job_id: candidate.job_id.clone(),
                assigned_machine: candidate.machine_id.clone(),
                start_time_ms: start,
                estimated_end_time_ms: end,
                priority_score: f64::from(candidate.priority),
            });
            self.pending.retain(|p| p.operation != action.operation);

            self.stats.total_assignments += 1;
            self.stats.total_processing_ms += end - start;
            *self
                .stats
                .assignments_per_machine
                .entry(candidate.machine_id.clone())
                .or_default() += 1;

            debug!(
                clock_ms = state.clock_ms(),
                strategy = %self.strategy,
                operation = %candidate.operation_id,
                machine = %candidate.machine_id,
                start_ms = start,
                end_ms = end,
                "operation routed"
            );
            assigned.push(action);
        }
        if !assigned.is_empty() {
            self.stats.decision_rounds += 1;
        }
        Ok(assigned)
    }

    /// Alternates routing and time advancement until every operation is done.
    ///
    /// # Errors
    /// - [`SchedulingError::Stalled`] if pending work can never be routed
    /// - [`SchedulingError::Incomplete`] if operations were never queued
    pub fn run_to_completion(&mut self, state: &mut SimulationState) -> Result<Trace, SchedulingError> {
        loop {
            self.assign_operations(state)?;
            if state.is_terminal() {
                break;
            }
            if self.simulator.advance(state).is_none() {
                if !self.pending.is_empty() || state.unassigned_count() == 0 {
                    return Err(SchedulingError::Stalled {
                        clock_ms: state.clock_ms(),
                        remaining: state.unfinished_count(),
                    });
                }
                return Err(SchedulingError::Incomplete {
                    unassigned: state.unassigned_count(),
                });
            }
        }
        let trace = self.simulator.to_trace(state);
        info!(
            strategy = %self.strategy,
            makespan_ms = trace.makespan_ms,
            assignments = self.stats.total_assignments,
            "control tower run finished"
        );
        Ok(trace)
    }

    /// Reports a machine status change (breakdown, maintenance, repair).
    pub fn set_machine_status(
        &mut self,
        state: &mut SimulationState,
        machine_id: &str,
        status: MachineStatus,
        until_ms: Option<i64>,
    ) -> Result<(), SchedulingError> {
        let m = self
            .simulator
            .machine_index(machine_id)
            .ok_or_else(|| SchedulingError::UnknownEntity {
                kind: "machine",
                id: machine_id.to_string(),
            })?;
        self.simulator.update_machine_status(state, m, status, until_ms)
    }

    /// Per-machine view at the state's clock.
    pub fn machine_views(&self, state: &SimulationState) -> Vec<MachineView> {
        let clock = state.clock_ms();
        state
            .machines()
            .iter()
            .enumerate()
            .map(|(m, ms)| MachineView {
                machine_id: self.simulator.machine_id(m).to_string(),
                status: ms.status(),
                next_available_ms: ms.available_at(clock, None),
                queue_len: ms.queue_len(),
                workload_ms: ms.assigned_workload_ms(),
                utilization: if clock > 0 {
                    ms.busy_ms() as f64 / clock as f64
                } else {
                    0.0
                },
            })
            .collect()
    }

    pub fn stats(&self) -> &TowerStats {
        &self.stats
    }

    /// Clears pending operations, history and statistics.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.history.clear();
        self.stats = TowerStats::default();
    }

    /// Assignments made so far.
    pub fn export_routing_result(&self) -> RoutingResult {
        RoutingResult {
            strategy: self.strategy,
            entries: self.history.clone(),
        }
    }
}
