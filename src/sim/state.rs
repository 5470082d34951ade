//! Simulation state snapshot.
//!
//! A [`SimulationState`] is plain data: cloning it takes a snapshot,
//! assigning a clone back restores it. Search branches each own their
//! state, so exploring one branch can never disturb another.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::event::EventQueue;
use super::Action;
use crate::models::{DurationDistribution, MachineStatus};

/// Lifecycle of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationStatus {
    /// Job predecessor unfinished or job not released.
    Waiting,
    /// May be assigned.
    Ready { since_ms: i64 },
    /// Committed to a machine, not started.
    Queued { machine: usize },
    /// Processing.
    Running {
        machine: usize,
        start_ms: i64,
        end_ms: i64,
    },
    /// Finished.
    Done {
        machine: usize,
        start_ms: i64,
        end_ms: i64,
    },
}

impl OperationStatus {
    /// Whether the operation has been committed to a machine.
    pub fn is_assigned(&self) -> bool {
        !matches!(self, Self::Waiting | Self::Ready { .. })
    }

    /// Machine the operation is committed to, if any.
    pub fn machine(&self) -> Option<usize> {
        match *self {
            Self::Queued { machine }
            | Self::Running { machine, .. }
            | Self::Done { machine, .. } => Some(machine),
            _ => None,
        }
    }
}

/// An operation committed to a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub operation: usize,
    /// Sampled processing time.
    pub duration_ms: i64,
    /// Earliest start (arrival after transfer).
    pub ready_ms: i64,
    /// Transfer time from the predecessor's machine.
    pub transfer_ms: i64,
    /// Actual start once the slot holds the machine.
    pub start_ms: i64,
}

/// Runtime state of one machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineState {
    pub(crate) status: MachineStatus,
    /// Reservation or downtime end; `None` with `Down` means indefinitely.
    pub(crate) unavailable_until: Option<i64>,
    /// Slot holding the machine (started, or waiting for its transfer).
    pub(crate) running: Option<Slot>,
    pub(crate) queue: VecDeque<Slot>,
    pub(crate) assigned_workload_ms: i64,
    pub(crate) assigned_count: usize,
    pub(crate) busy_ms: i64,
}

impl MachineState {
    pub(crate) fn new(status: MachineStatus, unavailable_until: Option<i64>) -> Self {
        Self {
            status,
            unavailable_until,
            running: None,
            queue: VecDeque::new(),
            assigned_workload_ms: 0,
            assigned_count: 0,
            busy_ms: 0,
        }
    }

    /// Current status.
    pub fn status(&self) -> MachineStatus {
        self.status
    }

    /// Committed, unfinished operations (holding slot included).
    pub fn queue_len(&self) -> usize {
        self.queue.len() + usize::from(self.running.is_some())
    }

    /// Not-yet-started queued slots.
    pub fn queued(&self) -> impl Iterator<Item = &Slot> {
        self.queue.iter()
    }

    /// The slot holding the machine.
    pub fn running(&self) -> Option<&Slot> {
        self.running.as_ref()
    }

    /// Total processing time ever committed (ms).
    pub fn assigned_workload_ms(&self) -> i64 {
        self.assigned_workload_ms
    }

    /// Number of operations ever committed.
    pub fn assigned_count(&self) -> usize {
        self.assigned_count
    }

    /// Processing time of finished operations (ms).
    pub fn busy_ms(&self) -> i64 {
        self.busy_ms
    }

    /// When the machine finishes the committed work in front of `position`
    /// (all of it when `None`). `i64::MAX` while down indefinitely.
    pub fn available_at(&self, clock_ms: i64, position: Option<usize>) -> i64 {
        if self.status == MachineStatus::Down && self.unavailable_until.is_none() {
            return i64::MAX;
        }
        let mut t = match &self.running {
            Some(s) => s.start_ms + s.duration_ms,
            None => clock_ms,
        };
        if let Some(until) = self.unavailable_until {
            t = t.max(until);
        }
        let take = position.unwrap_or(self.queue.len());
        for s in self.queue.iter().take(take) {
            t = t.max(s.ready_ms) + s.duration_ms;
        }
        t
    }

    /// Projected `(start, end)` of every committed slot, in queue order.
    pub(crate) fn projected_slots(&self, clock_ms: i64) -> Vec<(Slot, i64, i64)> {
        let mut out = Vec::with_capacity(self.queue_len());
        let mut t = clock_ms.max(self.unavailable_until.unwrap_or(clock_ms));
        if let Some(s) = &self.running {
            let end = s.start_ms + s.duration_ms;
            out.push((*s, s.start_ms, end));
            t = t.max(end);
        }
        for s in &self.queue {
            let start = t.max(s.ready_ms);
            let end = start + s.duration_ms;
            out.push((*s, start, end));
            t = end;
        }
        out
    }
}

/// Per-job progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub(crate) released: bool,
    /// Position of the first unfinished operation.
    pub(crate) next: usize,
    pub(crate) last_end_ms: Option<i64>,
    pub(crate) last_machine: Option<usize>,
}

/// A finished operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub operation: usize,
    pub machine: usize,
    pub start_ms: i64,
    pub end_ms: i64,
    pub transfer_ms: i64,
}

/// Keyed sampling stream.
///
/// The duration of operation `op` on machine `m` depends only on the
/// seed and the `(op, m)` pair, never on the order in which decisions
/// were taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleStream {
    seed: u64,
}

impl SampleStream {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Duration of `operation` on `machine` (ms).
    pub fn draw(&self, dist: &DurationDistribution, operation: usize, machine: usize) -> i64 {
        if dist.is_deterministic() {
            return dist.expected_ms().max(0.0).round() as i64;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(((operation as u64) << 32) | machine as u64);
        dist.sample(&mut rng)
    }
}

/// Snapshot of a simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationState {
    pub(crate) clock_ms: i64,
    pub(crate) machines: Vec<MachineState>,
    pub(crate) operations: Vec<OperationStatus>,
    pub(crate) jobs: Vec<JobState>,
    pub(crate) events: EventQueue,
    pub(crate) stream: SampleStream,
    pub(crate) unfinished: usize,
    pub(crate) unassigned: usize,
    pub(crate) completed: Vec<Completion>,
    pub(crate) actions: Vec<Action>,
}

impl SimulationState {
    /// Current simulated time (ms).
    pub fn clock_ms(&self) -> i64 {
        self.clock_ms
    }

    /// State of machine `m`.
    pub fn machine(&self, m: usize) -> Option<&MachineState> {
        self.machines.get(m)
    }

    /// All machine states, in machine-id order.
    pub fn machines(&self) -> &[MachineState] {
        &self.machines
    }

    /// Status of operation `op`.
    pub fn operation_status(&self, op: usize) -> Option<OperationStatus> {
        self.operations.get(op).copied()
    }

    /// Operations not yet committed to a machine.
    pub fn unassigned_count(&self) -> usize {
        self.unassigned
    }

    /// Operations not yet finished.
    pub fn unfinished_count(&self) -> usize {
        self.unfinished
    }

    /// Whether every operation has finished.
    pub fn is_terminal(&self) -> bool {
        self.unfinished == 0
    }

    /// Finished operations, in completion order.
    pub fn completed(&self) -> &[Completion] {
        &self.completed
    }

    /// Actions applied so far, in order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Pending events.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Seed of the duration stream.
    pub fn sample_seed(&self) -> u64 {
        self.stream.seed()
    }

    /// Latest end among finished operations.
    pub fn completed_makespan_ms(&self) -> i64 {
        self.completed.iter().map(|c| c.end_ms).max().unwrap_or(0)
    }

    /// Latest projected end of all committed work.
    pub fn projected_makespan_ms(&self) -> i64 {
        let committed = self
            .machines
            .iter()
            .filter(|m| m.queue_len() > 0)
            .map(|m| m.available_at(self.clock_ms, None))
            .max()
            .unwrap_or(0);
        committed.max(self.completed_makespan_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(operation: usize, duration_ms: i64, ready_ms: i64) -> Slot {
        Slot {
            operation,
            duration_ms,
            ready_ms,
            transfer_ms: 0,
            start_ms: 0,
        }
    }

    #[test]
    fn test_available_at_idle() {
        let m = MachineState::new(MachineStatus::Idle, None);
        assert_eq!(m.available_at(500, None), 500);
        assert_eq!(m.queue_len(), 0);
    }

    #[test]
    fn test_available_at_with_queue() {
        let mut m = MachineState::new(MachineStatus::Busy, None);
        m.running = Some(Slot {
            start_ms: 0,
            ..slot(0, 1000, 0)
        });
        m.queue.push_back(slot(1, 500, 0));
        m.queue.push_back(slot(2, 300, 2000)); // waits for transfer
        assert_eq!(m.available_at(0, Some(0)), 1000);
        assert_eq!(m.available_at(0, Some(1)), 1500);
        assert_eq!(m.available_at(0, None), 2300);
        assert_eq!(m.queue_len(), 3);

        let proj = m.projected_slots(0);
        assert_eq!((proj[2].1, proj[2].2), (2000, 2300));
    }

    #[test]
    fn test_available_at_down() {
        let forever = MachineState::new(MachineStatus::Down, None);
        assert_eq!(forever.available_at(0, None), i64::MAX);
        let repair = MachineState::new(MachineStatus::Down, Some(4000));
        assert_eq!(repair.available_at(1000, None), 4000);
    }

    #[test]
    fn test_stream_is_keyed() {
        let d = DurationDistribution::normal(1000.0, 200.0);
        let s = SampleStream::new(9);
        assert_eq!(s.draw(&d, 2, 1), s.draw(&d, 2, 1));
        assert_eq!(SampleStream::new(9).draw(&d, 2, 1), s.draw(&d, 2, 1));
        let others: Vec<i64> = (0..8).map(|op| s.draw(&d, op, 0)).collect();
        assert!(others.iter().any(|&x| x != others[0]));
    }

    #[test]
    fn test_stream_deterministic_shortcut() {
        let s = SampleStream::new(1);
        assert_eq!(s.draw(&DurationDistribution::normal(3000.0, 0.0), 0, 0), 3000);
        assert_eq!(s.draw(&DurationDistribution::fixed(42), 5, 5), 42);
    }
}
