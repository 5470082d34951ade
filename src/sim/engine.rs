//! Simulation engine.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::event::{EventKind, EventQueue, ScheduledEvent};
use super::state::{
    Completion, JobState, MachineState, OperationStatus, SampleStream, SimulationState, Slot,
};
use super::{Action, Candidate, SimulatorConfig};
use crate::error::{InvalidActionReason, ScenarioError, SchedulingError};
use crate::models::{DurationDistribution, MachineStatus, Scenario, Trace, TraceRecord};
use crate::validation::validate_scenario;

#[derive(Debug)]
pub(super) struct OpInfo {
    pub(super) id: String,
    pub(super) job: usize,
    pub(super) position: usize,
    /// Capable machines, ascending.
    pub(super) eligible: Vec<usize>,
    /// Distribution per machine index (`None` when incapable).
    pub(super) dists: Vec<Option<DurationDistribution>>,
    pub(super) min_expected_ms: f64,
}

#[derive(Debug)]
pub(super) struct JobInfo {
    pub(super) id: String,
    pub(super) ops: Vec<usize>,
    pub(super) priority: i32,
    pub(super) weight: f64,
    pub(super) due_date_ms: Option<i64>,
    pub(super) release_ms: i64,
}

#[derive(Debug)]
pub(super) struct MachineInfo {
    pub(super) id: String,
    pub(super) capability_count: usize,
}

/// Scenario compiled to index-based tables, each sorted by ID.
#[derive(Debug)]
pub(super) struct Layout {
    pub(super) scenario: Scenario,
    pub(super) ops: Vec<OpInfo>,
    pub(super) jobs: Vec<JobInfo>,
    pub(super) machines: Vec<MachineInfo>,
    pub(super) transfer: Vec<Vec<i64>>,
    op_index: HashMap<String, usize>,
    machine_index: HashMap<String, usize>,
    job_index: HashMap<String, usize>,
}

impl Layout {
    fn compile(scenario: &Scenario) -> Self {
        let mut machine_ids: Vec<&str> = scenario.machines.iter().map(|m| m.id.as_str()).collect();
        machine_ids.sort_unstable();
        let machine_index: HashMap<String, usize> = machine_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), i))
            .collect();

        let mut job_ids: Vec<&str> = scenario.jobs.iter().map(|j| j.id.as_str()).collect();
        job_ids.sort_unstable();
        let job_index: HashMap<String, usize> = job_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), i))
            .collect();

        let mut op_ids: Vec<&str> = scenario.operations.iter().map(|o| o.id.as_str()).collect();
        op_ids.sort_unstable();
        let op_index: HashMap<String, usize> = op_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), i))
            .collect();

        let machines: Vec<MachineInfo> = machine_ids
            .iter()
            .filter_map(|id| scenario.machine(id))
            .map(|m| MachineInfo {
                id: m.id.clone(),
                capability_count: m.capability_count(),
            })
            .collect();

        let jobs: Vec<JobInfo> = job_ids
            .iter()
            .filter_map(|id| scenario.job(id))
            .map(|j| JobInfo {
                id: j.id.clone(),
                ops: j
                    .operations
                    .iter()
                    .filter_map(|o| op_index.get(o).copied())
                    .collect(),
                priority: j.priority,
                weight: j.weight,
                due_date_ms: j.due_date,
                release_ms: j.release_ms().max(0),
            })
            .collect();

        let ops: Vec<OpInfo> = op_ids
            .iter()
            .filter_map(|id| scenario.operation(id))
            .map(|o| {
                let job = job_index.get(&o.job_id).copied().unwrap_or_default();
                let dists: Vec<Option<DurationDistribution>> = machines
                    .iter()
                    .map(|m| {
                        let capable = scenario
                            .machine(&m.id)
                            .is_some_and(|sm| sm.can_perform(&o.operation_type));
                        if capable {
                            scenario.durations.get(&o.operation_type, &m.id).copied()
                        } else {
                            None
                        }
                    })
                    .collect();
                let eligible: Vec<usize> = dists
                    .iter()
                    .enumerate()
                    .filter_map(|(m, d)| d.map(|_| m))
                    .collect();
                let min_expected_ms = dists
                    .iter()
                    .flatten()
                    .map(DurationDistribution::expected_ms)
                    .fold(f64::INFINITY, f64::min);
                let position = jobs
                    .get(job)
                    .and_then(|j| j.ops.iter().position(|&x| op_index.get(&o.id) == Some(&x)))
                    .unwrap_or(o.sequence as usize);
                OpInfo {
                    id: o.id.clone(),
                    job,
                    position,
                    eligible,
                    dists,
                    min_expected_ms: if min_expected_ms.is_finite() {
                        min_expected_ms
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        let transfer: Vec<Vec<i64>> = machines
            .iter()
            .map(|from| {
                machines
                    .iter()
                    .map(|to| scenario.transfers.transfer_ms(&from.id, &to.id))
                    .collect()
            })
            .collect();

        Self {
            scenario: scenario.clone(),
            ops,
            jobs,
            machines,
            transfer,
            op_index,
            machine_index,
            job_index,
        }
    }
}

/// Discrete-event job-shop simulator.
///
/// Cheap to clone (the compiled scenario is shared). Every method takes
/// the state explicitly; the simulator itself never changes after
/// construction.
///
/// # Example
/// ```
/// use u_jobshop::models::{DurationDistribution, Job, Machine, Scenario};
/// use u_jobshop::sim::{Simulator, SimulatorConfig};
///
/// let scenario = Scenario::new()
///     .with_job_steps(Job::new("J1"), [("J1_A", "cut")])
///     .with_machine(Machine::new("M1").with_capability("cut"))
///     .with_duration("cut", "M1", DurationDistribution::fixed(2000));
///
/// let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
/// let mut state = sim.initialize(42);
/// let actions = sim.settle(&mut state).unwrap();
/// sim.apply(&mut state, &actions[0]).unwrap();
/// sim.finish(&mut state).unwrap();
/// assert_eq!(sim.to_trace(&state).makespan_ms, 2000);
/// ```
#[derive(Debug, Clone)]
pub struct Simulator {
    pub(super) layout: Arc<Layout>,
    config: SimulatorConfig,
}

impl Simulator {
    /// Validates and compiles a scenario.
    ///
    /// # Errors
    /// [`ScenarioError`] listing every validation failure.
    pub fn new(scenario: &Scenario, config: SimulatorConfig) -> Result<Self, ScenarioError> {
        validate_scenario(scenario)?;
        Ok(Self {
            layout: Arc::new(Layout::compile(scenario)),
            config,
        })
    }

    /// Same compiled scenario with another configuration.
    pub fn with_config(&self, config: SimulatorConfig) -> Self {
        Self {
            layout: Arc::clone(&self.layout),
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> SimulatorConfig {
        self.config
    }

    /// The scenario this simulator was built from.
    pub fn scenario(&self) -> &Scenario {
        &self.layout.scenario
    }

    // ======================== Index lookups ========================

    /// Number of operations.
    pub fn operation_count(&self) -> usize {
        self.layout.ops.len()
    }

    /// Number of machines.
    pub fn machine_count(&self) -> usize {
        self.layout.machines.len()
    }

    /// Number of jobs.
    pub fn job_count(&self) -> usize {
        self.layout.jobs.len()
    }

    /// ID of operation `op`.
    pub fn operation_id(&self, op: usize) -> &str {
        &self.layout.ops[op].id
    }

    /// ID of machine `m`.
    pub fn machine_id(&self, m: usize) -> &str {
        &self.layout.machines[m].id
    }

    /// ID of job `j`.
    pub fn job_id(&self, j: usize) -> &str {
        &self.layout.jobs[j].id
    }

    /// Index of an operation ID.
    pub fn operation_index(&self, id: &str) -> Option<usize> {
        self.layout.op_index.get(id).copied()
    }

    /// Index of a machine ID.
    pub fn machine_index(&self, id: &str) -> Option<usize> {
        self.layout.machine_index.get(id).copied()
    }

    /// Index of a job ID.
    pub fn job_index(&self, id: &str) -> Option<usize> {
        self.layout.job_index.get(id).copied()
    }

    /// Job owning operation `op`.
    pub fn job_of(&self, op: usize) -> usize {
        self.layout.ops[op].job
    }

    /// Operations of job `j` in processing order.
    pub fn job_operations(&self, j: usize) -> &[usize] {
        &self.layout.jobs[j].ops
    }

    /// Priority of job `j`.
    pub fn job_priority(&self, j: usize) -> i32 {
        self.layout.jobs[j].priority
    }

    /// Release time of job `j` (ms).
    pub fn job_release_ms(&self, j: usize) -> i64 {
        self.layout.jobs[j].release_ms
    }

    /// Machines capable of operation `op`, ascending.
    pub fn eligible_machines(&self, op: usize) -> &[usize] {
        &self.layout.ops[op].eligible
    }

    /// Capability count of machine `m`.
    pub fn capability_count(&self, m: usize) -> usize {
        self.layout.machines[m].capability_count
    }

    /// Builds an appending action from IDs.
    pub fn action(&self, operation_id: &str, machine_id: &str) -> Result<Action, SchedulingError> {
        let op = self
            .operation_index(operation_id)
            .ok_or_else(|| SchedulingError::UnknownEntity {
                kind: "operation",
                id: operation_id.to_string(),
            })?;
        let m = self
            .machine_index(machine_id)
            .ok_or_else(|| SchedulingError::UnknownEntity {
                kind: "machine",
                id: machine_id.to_string(),
            })?;
        Ok(Action::new(op, m))
    }

    /// Mean duration of `op` on `m`, if capable.
    pub fn expected_duration_ms(&self, op: usize, m: usize) -> Option<f64> {
        self.layout
            .ops
            .get(op)?
            .dists
            .get(m)?
            .map(|d| d.expected_ms())
    }

    /// Duration `op` would take on `m` under the state's sample stream.
    pub fn sample_duration(&self, state: &SimulationState, op: usize, m: usize) -> Option<i64> {
        let dist = self.layout.ops.get(op)?.dists.get(m)?.as_ref()?;
        Some(state.stream.draw(dist, op, m))
    }

    // ======================== Lifecycle ========================

    /// Builds the state at t=0 for a seed.
    ///
    /// Jobs released at t ≤ 0 are ready immediately; later releases and
    /// initial machine reservations are queued as events.
    pub fn initialize(&self, seed: u64) -> SimulationState {
        let layout = &*self.layout;
        let mut events = EventQueue::new();

        let machines: Vec<MachineState> = layout
            .machines
            .iter()
            .enumerate()
            .map(|(m, info)| {
                let initial = self
                    .scenario()
                    .machine(&info.id)
                    .map(|sm| sm.initial)
                    .unwrap_or_default();
                let until = initial.available_from_ms.filter(|&t| t > 0);
                match (initial.status, until) {
                    (MachineStatus::Down, None) if initial.available_from_ms.is_none() => {
                        MachineState::new(MachineStatus::Down, None)
                    }
                    (MachineStatus::Busy | MachineStatus::Down, Some(t)) => {
                        events.push(t, EventKind::MachineFree { machine: m });
                        MachineState::new(initial.status, Some(t))
                    }
                    _ => MachineState::new(MachineStatus::Idle, None),
                }
            })
            .collect();

        for (j, info) in layout.jobs.iter().enumerate() {
            events.push(info.release_ms, EventKind::JobRelease { job: j });
        }

        let n = layout.ops.len();
        let mut state = SimulationState {
            clock_ms: 0,
            machines,
            operations: vec![OperationStatus::Waiting; n],
            jobs: layout
                .jobs
                .iter()
                .map(|_| JobState {
                    released: false,
                    next: 0,
                    last_end_ms: None,
                    last_machine: None,
                })
                .collect(),
            events,
            stream: SampleStream::new(seed),
            unfinished: n,
            unassigned: n,
            completed: Vec::new(),
            actions: Vec::new(),
        };
        self.process_due(&mut state);
        state
    }

    /// Redirects all future duration samples to another stream.
    ///
    /// Durations already committed are unaffected.
    pub fn reseed(&self, state: &mut SimulationState, seed: u64) {
        state.stream = SampleStream::new(seed);
    }

    // ======================== Actions ========================

    /// Checks an action without applying it.
    ///
    /// # Errors
    /// [`SchedulingError::InvalidAction`] with the first failed check.
    pub fn check(&self, state: &SimulationState, action: &Action) -> Result<(), SchedulingError> {
        let reject = |reason: InvalidActionReason| -> Result<(), SchedulingError> {
            Err(SchedulingError::InvalidAction {
                action: *action,
                reason,
            })
        };

        let Some(info) = self.layout.ops.get(action.operation) else {
            return reject(InvalidActionReason::UnknownOperation);
        };
        let Some(ms) = state.machines.get(action.machine) else {
            return reject(InvalidActionReason::UnknownMachine);
        };
        match state.operations[action.operation] {
            OperationStatus::Ready { .. } => {}
            OperationStatus::Waiting => return reject(InvalidActionReason::NotReady),
            _ => return reject(InvalidActionReason::AlreadyAssigned),
        }
        if info.eligible.binary_search(&action.machine).is_err() {
            return reject(InvalidActionReason::MissingCapability);
        }
        if ms.status == MachineStatus::Down {
            return reject(InvalidActionReason::MachineDown);
        }
        if action.position.is_some_and(|p| p > ms.queue.len()) {
            return reject(InvalidActionReason::InvalidPosition);
        }
        let horizon = state.clock_ms.saturating_add(self.config.lookahead_ms);
        if ms.available_at(state.clock_ms, action.position) > horizon {
            return reject(InvalidActionReason::MachineUnavailable);
        }
        Ok(())
    }

    /// Applies an action in place.
    ///
    /// The operation's duration is drawn, its start is set to
    /// `max(machine free, clock + transfer)` and its start/completion
    /// events are scheduled. On error the state is untouched.
    ///
    /// # Errors
    /// - [`SchedulingError::InvalidAction`] if the action is not legal now
    /// - [`SchedulingError::CapabilityMismatch`] if no duration exists for the pair
    pub fn apply(&self, state: &mut SimulationState, action: &Action) -> Result<(), SchedulingError> {
        self.check(state, action)?;

        let op = action.operation;
        let m = action.machine;
        let info = &self.layout.ops[op];
        let Some(dist) = info.dists[m].as_ref() else {
            return Err(SchedulingError::CapabilityMismatch {
                operation_id: info.id.clone(),
                machine_id: self.layout.machines[m].id.clone(),
            });
        };

        let transfer_ms = state.jobs[info.job]
            .last_machine
            .map(|prev| self.layout.transfer[prev][m])
            .unwrap_or(0);
        let ready_ms = (state.clock_ms + transfer_ms).max(self.layout.jobs[info.job].release_ms);
        let duration_ms = state.stream.draw(dist, op, m);

        let slot = Slot {
            operation: op,
            duration_ms,
            ready_ms,
            transfer_ms,
            start_ms: ready_ms,
        };
        let ms = &mut state.machines[m];
        match action.position {
            Some(p) => ms.queue.insert(p, slot),
            None => ms.queue.push_back(slot),
        }
        ms.assigned_workload_ms += duration_ms;
        ms.assigned_count += 1;
        state.operations[op] = OperationStatus::Queued { machine: m };
        state.unassigned -= 1;
        state.actions.push(*action);

        trace!(
            clock_ms = state.clock_ms,
            operation = %info.id,
            machine = %self.layout.machines[m].id,
            duration_ms,
            transfer_ms,
            "action applied"
        );

        self.try_start(state, m);
        Ok(())
    }

    /// Applies an action to a copy of the state.
    pub fn applied(
        &self,
        state: &SimulationState,
        action: &Action,
    ) -> Result<SimulationState, SchedulingError> {
        self.check(state, action)?;
        let mut next = state.clone();
        self.apply(&mut next, action)?;
        Ok(next)
    }

    /// Every legal appending action, ordered by (operation id, machine id).
    ///
    /// An action is legal when the operation is ready and unassigned and
    /// the machine is capable, not down, and free no later than
    /// `clock + lookahead`.
    pub fn legal_actions(&self, state: &SimulationState) -> Vec<Action> {
        let clock = state.clock_ms;
        let horizon = clock.saturating_add(self.config.lookahead_ms);
        let mut actions = Vec::new();
        for (op, status) in state.operations.iter().enumerate() {
            if !matches!(status, OperationStatus::Ready { .. }) {
                continue;
            }
            for &m in &self.layout.ops[op].eligible {
                let ms = &state.machines[m];
                if ms.status != MachineStatus::Down && ms.available_at(clock, None) <= horizon {
                    actions.push(Action::new(op, m));
                }
            }
        }
        actions
    }

    /// Legal actions with their dispatching features.
    pub fn candidates(&self, state: &SimulationState) -> Vec<Candidate> {
        self.legal_actions(state)
            .into_iter()
            .map(|a| self.candidate(state, a))
            .collect()
    }

    /// Dispatching features of one action (legal or not).
    pub fn candidate(&self, state: &SimulationState, action: Action) -> Candidate {
        let layout = &*self.layout;
        let info = &layout.ops[action.operation];
        let job = &layout.jobs[info.job];
        let ms = &state.machines[action.machine];
        let clock = state.clock_ms;

        let dist = info.dists[action.machine];
        let expected_duration_ms = dist.map(|d| d.expected_ms()).unwrap_or(0.0);
        let sampled_duration_ms = dist
            .map(|d| state.stream.draw(&d, action.operation, action.machine))
            .unwrap_or(0);
        let machine_available_ms = ms.available_at(clock, action.position);
        let transfer = state.jobs[info.job]
            .last_machine
            .map(|prev| layout.transfer[prev][action.machine])
            .unwrap_or(0);
        let earliest_start_ms = machine_available_ms
            .max(clock + transfer)
            .max(job.release_ms);
        let remaining_work_ms = job
            .ops
            .iter()
            .skip(info.position)
            .map(|&o| layout.ops[o].min_expected_ms)
            .sum();

        Candidate {
            action,
            operation_id: info.id.clone(),
            machine_id: layout.machines[action.machine].id.clone(),
            job_id: job.id.clone(),
            priority: job.priority,
            weight: job.weight,
            due_date_ms: job.due_date_ms,
            release_ms: job.release_ms,
            expected_duration_ms,
            sampled_duration_ms,
            earliest_start_ms,
            expected_completion_ms: earliest_start_ms as f64 + expected_duration_ms,
            machine_available_ms,
            machine_queue_len: ms.queue_len(),
            machine_workload_ms: ms.assigned_workload_ms,
            machine_capability_count: layout.machines[action.machine].capability_count,
            remaining_work_ms,
            rank: action.operation,
        }
    }

    // ======================== Time advancement ========================

    /// Processes every event due at or before the clock.
    ///
    /// Returns operations that became ready.
    pub fn process_due(&self, state: &mut SimulationState) -> Vec<usize> {
        let mut ready = Vec::new();
        while state
            .events
            .peek_time()
            .is_some_and(|t| t <= state.clock_ms)
        {
            if let Some(event) = state.events.pop() {
                self.process(state, event, &mut ready);
            }
        }
        ready
    }

    /// Moves the clock to the next event time and processes that batch.
    ///
    /// Returns the operations that became ready, or `None` when no
    /// events remain.
    pub fn advance(&self, state: &mut SimulationState) -> Option<Vec<usize>> {
        let next = state.events.peek_time()?;
        state.clock_ms = state.clock_ms.max(next);
        Some(self.process_due(state))
    }

    /// Advances to the next decision point.
    ///
    /// Returns the legal actions there, or an empty list once every
    /// operation has finished.
    ///
    /// # Errors
    /// [`SchedulingError::Stalled`] if work remains but nothing can happen.
    pub fn settle(&self, state: &mut SimulationState) -> Result<Vec<Action>, SchedulingError> {
        loop {
            self.process_due(state);
            if state.is_terminal() {
                return Ok(Vec::new());
            }
            let actions = self.legal_actions(state);
            if !actions.is_empty() {
                return Ok(actions);
            }
            if self.advance(state).is_none() {
                warn!(
                    clock_ms = state.clock_ms,
                    remaining = state.unfinished,
                    "simulation stalled"
                );
                return Err(SchedulingError::Stalled {
                    clock_ms: state.clock_ms,
                    remaining: state.unfinished,
                });
            }
        }
    }

    /// Runs committed work to completion.
    ///
    /// # Errors
    /// - [`SchedulingError::Incomplete`] if operations remain unassigned
    /// - [`SchedulingError::Stalled`] if committed work can never finish
    pub fn finish(&self, state: &mut SimulationState) -> Result<(), SchedulingError> {
        let pending = self.settle(state)?;
        if pending.is_empty() {
            Ok(())
        } else {
            Err(SchedulingError::Incomplete {
                unassigned: state.unassigned,
            })
        }
    }

    /// Replays an action sequence from the initial state of `seed`.
    ///
    /// Each action is applied at the first decision point where it is
    /// legal; the clock advances until then.
    pub fn replay_state(
        &self,
        seed: u64,
        actions: &[Action],
    ) -> Result<SimulationState, SchedulingError> {
        let mut state = self.initialize(seed);
        for action in actions {
            loop {
                self.process_due(&mut state);
                let Err(err) = self.check(&state, action) else {
                    break;
                };
                let waitable = matches!(
                    err.invalid_action_reason(),
                    Some(
                        InvalidActionReason::NotReady
                            | InvalidActionReason::MachineUnavailable
                            | InvalidActionReason::MachineDown
                    )
                );
                if !waitable || self.advance(&mut state).is_none() {
                    return Err(err);
                }
            }
            self.apply(&mut state, action)?;
        }
        self.finish(&mut state)?;
        Ok(state)
    }

    /// Replays an action sequence and returns its trace.
    pub fn replay(&self, seed: u64, actions: &[Action]) -> Result<Trace, SchedulingError> {
        let state = self.replay_state(seed, actions)?;
        Ok(self.to_trace(&state))
    }

    /// Changes a machine's status at the current clock.
    ///
    /// - `Down` with `until = None`: down until set back to `Idle`
    /// - `Down`/`Busy` with `until`: unavailable until that time
    /// - `Idle`: available now
    ///
    /// An operation already running keeps running; queued ones wait.
    pub fn update_machine_status(
        &self,
        state: &mut SimulationState,
        machine: usize,
        status: MachineStatus,
        until: Option<i64>,
    ) -> Result<(), SchedulingError> {
        let clock = state.clock_ms;
        let Some(ms) = state.machines.get_mut(machine) else {
            return Err(SchedulingError::UnknownEntity {
                kind: "machine",
                id: format!("#{machine}"),
            });
        };
        // A downtime that already ended leaves the machine available.
        let status = match until {
            Some(t) if t <= clock => MachineStatus::Idle,
            _ => status,
        };
        let until = until.filter(|&t| t > clock);
        match (status, until) {
            (MachineStatus::Idle, _) | (MachineStatus::Busy, None) => {
                ms.unavailable_until = None;
                ms.status = if ms.running.is_some() {
                    MachineStatus::Busy
                } else {
                    MachineStatus::Idle
                };
            }
            (MachineStatus::Down, None) => {
                ms.status = MachineStatus::Down;
                ms.unavailable_until = None;
            }
            (MachineStatus::Down | MachineStatus::Busy, Some(t)) => {
                ms.status = status;
                ms.unavailable_until = Some(t);
                state.events.push(t, EventKind::MachineFree { machine });
            }
        }
        debug!(
            clock_ms = clock,
            machine = %self.layout.machines[machine].id,
            status = %status,
            until_ms = ?until,
            "machine status updated"
        );
        self.try_start(state, machine);
        Ok(())
    }

    // ======================== Queries ========================

    /// When machine `m` finishes its committed work.
    pub fn available_at(&self, state: &SimulationState, m: usize) -> i64 {
        state.machines[m].available_at(state.clock_ms, None)
    }

    /// Actual or projected `(start, end)` of an assigned operation.
    pub fn projected_window(&self, state: &SimulationState, op: usize) -> Option<(i64, i64)> {
        match state.operations.get(op)? {
            OperationStatus::Running { start_ms, end_ms, .. }
            | OperationStatus::Done { start_ms, end_ms, .. } => Some((*start_ms, *end_ms)),
            OperationStatus::Queued { machine } => state.machines[*machine]
                .projected_slots(state.clock_ms)
                .into_iter()
                .find(|(slot, _, _)| slot.operation == op)
                .map(|(_, start, end)| (start, end)),
            _ => None,
        }
    }

    /// Trace of every finished operation.
    pub fn to_trace(&self, state: &SimulationState) -> Trace {
        Trace::from_records(
            state
                .completed
                .iter()
                .map(|c| self.record(c))
                .collect(),
        )
    }

    fn record(&self, c: &Completion) -> TraceRecord {
        let info = &self.layout.ops[c.operation];
        TraceRecord::new(
            info.id.clone(),
            self.layout.jobs[info.job].id.clone(),
            self.layout.machines[c.machine].id.clone(),
            c.start_ms,
            c.end_ms,
        )
        .with_transfer(c.transfer_ms)
    }

    // ======================== Event handling ========================

    fn process(&self, state: &mut SimulationState, event: ScheduledEvent, ready: &mut Vec<usize>) {
        let clock = state.clock_ms;
        trace!(time_ms = event.key.time_ms, event = ?event.kind, "processing event");
        match event.kind {
            EventKind::JobRelease { job } => {
                state.jobs[job].released = true;
                if let Some(&first) = self.layout.jobs[job].ops.first() {
                    if state.operations[first] == OperationStatus::Waiting {
                        state.operations[first] = OperationStatus::Ready { since_ms: clock };
                        ready.push(first);
                    }
                }
            }
            EventKind::OperationStart { operation, machine } => {
                let ms = &mut state.machines[machine];
                if let Some(slot) = ms.running.as_mut().filter(|s| s.operation == operation) {
                    slot.start_ms = clock;
                    let end_ms = clock + slot.duration_ms;
                    state.operations[operation] = OperationStatus::Running {
                        machine,
                        start_ms: clock,
                        end_ms,
                    };
                    state
                        .events
                        .push(end_ms, EventKind::OperationComplete { operation, machine });
                }
            }
            EventKind::OperationComplete { operation, machine } => {
                self.complete(state, operation, machine, ready);
            }
            EventKind::MachineFree { machine } => {
                let ms = &mut state.machines[machine];
                // Stale when the status changed after this event was queued.
                if ms.unavailable_until == Some(event.key.time_ms) {
                    ms.unavailable_until = None;
                    ms.status = if ms.running.is_some() {
                        MachineStatus::Busy
                    } else {
                        MachineStatus::Idle
                    };
                    self.try_start(state, machine);
                }
            }
        }
    }

    fn complete(
        &self,
        state: &mut SimulationState,
        operation: usize,
        machine: usize,
        ready: &mut Vec<usize>,
    ) {
        let clock = state.clock_ms;
        let ms = &mut state.machines[machine];
        let Some(slot) = ms.running.take() else {
            warn!(operation, machine, "completion without running slot");
            return;
        };
        ms.busy_ms += slot.duration_ms;
        if ms.status != MachineStatus::Down {
            ms.status = if ms.unavailable_until.is_some() {
                MachineStatus::Busy
            } else {
                MachineStatus::Idle
            };
        }

        state.operations[operation] = OperationStatus::Done {
            machine,
            start_ms: slot.start_ms,
            end_ms: clock,
        };
        state.completed.push(Completion {
            operation,
            machine,
            start_ms: slot.start_ms,
            end_ms: clock,
            transfer_ms: slot.transfer_ms,
        });
        state.unfinished -= 1;

        let job = self.layout.ops[operation].job;
        let js = &mut state.jobs[job];
        js.next += 1;
        js.last_end_ms = Some(clock);
        js.last_machine = Some(machine);
        if let Some(&succ) = self.layout.jobs[job].ops.get(js.next) {
            state.operations[succ] = OperationStatus::Ready { since_ms: clock };
            ready.push(succ);
        }

        self.try_start(state, machine);
    }

    /// Moves the head of the queue onto an idle machine.
    fn try_start(&self, state: &mut SimulationState, machine: usize) {
        let clock = state.clock_ms;
        let ms = &mut state.machines[machine];
        if ms.status == MachineStatus::Down || ms.running.is_some() {
            return;
        }
        if ms.unavailable_until.is_some_and(|t| t > clock) {
            return;
        }
        let Some(mut slot) = ms.queue.pop_front() else {
            return;
        };
        let start_ms = clock.max(slot.ready_ms);
        slot.start_ms = start_ms;
        ms.running = Some(slot);
        ms.status = MachineStatus::Busy;

        let operation = slot.operation;
        if start_ms <= clock {
            let end_ms = start_ms + slot.duration_ms;
            state.operations[operation] = OperationStatus::Running {
                machine,
                start_ms,
                end_ms,
            };
            state
                .events
                .push(end_ms, EventKind::OperationComplete { operation, machine });
        } else {
            state
                .events
                .push(start_ms, EventKind::OperationStart { operation, machine });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InitialMachineStatus, Job, Machine, TransferTimeMatrix};

    fn two_by_two() -> Scenario {
        Scenario::new()
            .with_job_steps(Job::new("J1"), [("J1_A", "A"), ("J1_B", "B")])
            .with_job_steps(Job::new("J2"), [("J2_A", "A"), ("J2_B", "B")])
            .with_machine(Machine::new("M1").with_capability("A"))
            .with_machine(Machine::new("M2").with_capability("B"))
            .with_duration("A", "M1", DurationDistribution::normal(3000.0, 0.0))
            .with_duration("B", "M2", DurationDistribution::normal(4000.0, 0.0))
    }

    fn run_first_legal(sim: &Simulator, state: &mut SimulationState) {
        loop {
            let actions = sim.settle(state).unwrap();
            if actions.is_empty() {
                break;
            }
            sim.apply(state, &actions[0]).unwrap();
        }
    }

    #[test]
    fn test_compiled_indices_sorted_by_id() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        assert_eq!(sim.operation_id(0), "J1_A");
        assert_eq!(sim.operation_id(3), "J2_B");
        assert_eq!(sim.machine_index("M2"), Some(1));
        assert_eq!(sim.job_operations(1), &[2, 3]);
        assert_eq!(sim.eligible_machines(1), &[1]);
    }

    #[test]
    fn test_initial_legal_actions() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let state = sim.initialize(42);
        assert_eq!(state.clock_ms(), 0);
        assert_eq!(
            sim.legal_actions(&state),
            vec![Action::new(0, 0), Action::new(2, 0)]
        );
    }

    #[test]
    fn test_two_by_two_trace() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let mut state = sim.initialize(42);
        run_first_legal(&sim, &mut state);

        assert!(state.is_terminal());
        let trace = sim.to_trace(&state);
        assert_eq!(trace.makespan_ms, 11000);
        let b2 = trace.record_for_operation("J2_B").unwrap();
        assert_eq!((b2.start_ms, b2.end_ms), (7000, 11000));
        let a2 = trace.record_for_operation("J2_A").unwrap();
        assert_eq!((a2.start_ms, a2.end_ms), (3000, 6000));
        assert!(crate::validation::validate_trace(sim.scenario(), &trace).is_empty());
    }

    #[test]
    fn test_invalid_action_leaves_state_untouched() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let mut state = sim.initialize(42);

        let err = sim.apply(&mut state, &Action::new(1, 1)).unwrap_err();
        assert_eq!(err.invalid_action_reason(), Some(InvalidActionReason::NotReady));

        let err = sim.apply(&mut state, &Action::new(0, 1)).unwrap_err();
        assert_eq!(
            err.invalid_action_reason(),
            Some(InvalidActionReason::MissingCapability)
        );

        let err = sim.apply(&mut state, &Action::new(9, 0)).unwrap_err();
        assert_eq!(
            err.invalid_action_reason(),
            Some(InvalidActionReason::UnknownOperation)
        );

        assert_eq!(state.unassigned_count(), 4);
        assert!(state.actions().is_empty());

        sim.apply(&mut state, &Action::new(0, 0)).unwrap();
        let err = sim.apply(&mut state, &Action::new(0, 0)).unwrap_err();
        assert_eq!(
            err.invalid_action_reason(),
            Some(InvalidActionReason::AlreadyAssigned)
        );
        let err = sim.apply(&mut state, &Action::new(2, 0)).unwrap_err();
        assert_eq!(
            err.invalid_action_reason(),
            Some(InvalidActionReason::MachineUnavailable)
        );
    }

    #[test]
    fn test_applied_does_not_mutate_parent() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let parent = sim.initialize(42);
        let child = sim.applied(&parent, &Action::new(0, 0)).unwrap();
        assert_eq!(parent.unassigned_count(), 4);
        assert_eq!(child.unassigned_count(), 3);
        assert_eq!(
            child.operation_status(0),
            Some(OperationStatus::Running {
                machine: 0,
                start_ms: 0,
                end_ms: 3000
            })
        );
    }

    #[test]
    fn test_transfer_delays_start() {
        let scenario = two_by_two()
            .with_transfers(TransferTimeMatrix::new().with_transfer("M1", "M2", 500));
        let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
        let mut state = sim.initialize(42);
        run_first_legal(&sim, &mut state);

        let trace = sim.to_trace(&state);
        let b1 = trace.record_for_operation("J1_B").unwrap();
        assert_eq!((b1.start_ms, b1.transfer_ms), (3500, 500));
        assert!(crate::validation::validate_trace(sim.scenario(), &trace).is_empty());
    }

    #[test]
    fn test_release_time_gates_first_operation() {
        let scenario = Scenario::new()
            .with_job_steps(Job::new("J1").with_release_time(1500), [("J1_A", "A")])
            .with_machine(Machine::new("M1").with_capability("A"))
            .with_duration("A", "M1", DurationDistribution::fixed(1000));
        let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
        let mut state = sim.initialize(0);
        assert!(sim.legal_actions(&state).is_empty());

        let actions = sim.settle(&mut state).unwrap();
        assert_eq!(state.clock_ms(), 1500);
        sim.apply(&mut state, &actions[0]).unwrap();
        sim.finish(&mut state).unwrap();
        assert_eq!(sim.to_trace(&state).makespan_ms, 2500);
    }

    #[test]
    fn test_initial_downtime_is_waited_out() {
        let scenario = two_by_two().with_machine(
            Machine::new("M3")
                .with_capability("A")
                .with_initial_status(InitialMachineStatus::down(Some(2000))),
        );
        let scenario = scenario.with_duration("A", "M3", DurationDistribution::fixed(100));
        let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
        let mut state = sim.initialize(1);
        let m3 = sim.machine_index("M3").unwrap();
        assert_eq!(state.machine(m3).unwrap().status(), MachineStatus::Down);
        assert!(sim.legal_actions(&state).iter().all(|a| a.machine != m3));

        sim.apply(&mut state, &Action::new(0, 0)).unwrap();
        sim.apply(&mut state, &Action::new(2, 0).at_position(0))
            .unwrap_err();
        let actions = sim.settle(&mut state).unwrap();
        assert_eq!(state.clock_ms(), 2000);
        assert!(actions.contains(&Action::new(2, m3)));
    }

    #[test]
    fn test_down_forever_stalls() {
        let scenario = Scenario::new()
            .with_job_steps(Job::new("J1"), [("J1_A", "A")])
            .with_machine(
                Machine::new("M1")
                    .with_capability("A")
                    .with_initial_status(InitialMachineStatus::down(None)),
            )
            .with_duration("A", "M1", DurationDistribution::fixed(1000));
        let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();
        let mut state = sim.initialize(0);
        assert!(matches!(
            sim.settle(&mut state),
            Err(SchedulingError::Stalled { remaining: 1, .. })
        ));
    }

    #[test]
    fn test_update_machine_status_reservation() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let mut state = sim.initialize(0);
        sim.update_machine_status(&mut state, 0, MachineStatus::Down, Some(5000))
            .unwrap();
        assert!(sim.legal_actions(&state).is_empty());

        let actions = sim.settle(&mut state).unwrap();
        assert_eq!(state.clock_ms(), 5000);
        assert_eq!(actions[0], Action::new(0, 0));

        // Setting the machine idle again clears the reservation early.
        let mut early = sim.initialize(0);
        sim.update_machine_status(&mut early, 0, MachineStatus::Down, Some(5000))
            .unwrap();
        sim.update_machine_status(&mut early, 0, MachineStatus::Idle, None)
            .unwrap();
        assert_eq!(sim.legal_actions(&early).len(), 2);
    }

    #[test]
    fn test_lookahead_allows_queueing() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default().with_lookahead(5000))
            .unwrap();
        let mut state = sim.initialize(0);
        sim.apply(&mut state, &Action::new(0, 0)).unwrap();
        assert!(sim.legal_actions(&state).contains(&Action::new(2, 0)));
        sim.apply(&mut state, &Action::new(2, 0)).unwrap();
        assert_eq!(sim.projected_window(&state, 2), Some((3000, 6000)));
        assert_eq!(sim.available_at(&state, 0), 6000);
    }

    #[test]
    fn test_replay_reproduces_trace() {
        let scenario = Scenario::new()
            .with_job_steps(Job::new("J1"), [("J1_A", "A"), ("J1_B", "B")])
            .with_job_steps(Job::new("J2"), [("J2_A", "A")])
            .with_machine(Machine::new("M1").with_capability("A").with_capability("B"))
            .with_machine(Machine::new("M2").with_capability("A"))
            .with_duration("A", "M1", DurationDistribution::normal(2000.0, 400.0))
            .with_duration("A", "M2", DurationDistribution::uniform(1000.0, 3000.0))
            .with_duration("B", "M1", DurationDistribution::exponential(1500.0));
        let sim = Simulator::new(&scenario, SimulatorConfig::default()).unwrap();

        let mut state = sim.initialize(7);
        run_first_legal(&sim, &mut state);
        let trace = sim.to_trace(&state);

        let replayed = sim.replay(7, state.actions()).unwrap();
        assert_eq!(trace, replayed);

        let mut again = sim.initialize(7);
        run_first_legal(&sim, &mut again);
        assert_eq!(sim.to_trace(&again), trace);
    }

    #[test]
    fn test_replay_rejects_short_sequence() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        assert!(matches!(
            sim.replay(0, &[Action::new(0, 0)]),
            Err(SchedulingError::Incomplete { unassigned: 3 })
        ));
    }

    #[test]
    fn test_candidate_features() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let state = sim.initialize(0);
        let c = sim.candidate(&state, Action::new(0, 0));
        assert_eq!(c.operation_id, "J1_A");
        assert_eq!(c.expected_duration_ms, 3000.0);
        assert_eq!(c.earliest_start_ms, 0);
        assert_eq!(c.expected_completion_ms, 3000.0);
        assert_eq!(c.sampled_completion_ms(), 3000);
        assert_eq!(c.remaining_work_ms, 7000.0);
    }

    #[test]
    fn test_rejects_invalid_scenario() {
        let scenario = Scenario::new().with_job(Job::new("J1"));
        assert!(Simulator::new(&scenario, SimulatorConfig::default()).is_err());
    }
}
