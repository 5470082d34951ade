//! Makespan lower bound.
//!
//! Combines three relaxations and returns the largest:
//!
//! - **Machine**: a machine's committed end plus the work of unassigned
//!   operations only it can perform.
//! - **Aggregate**: committed ends plus the minimum remaining work,
//!   spread evenly over the usable machines.
//! - **Job**: a job's last committed end plus the minimum durations of
//!   its unassigned operations (transfers relaxed to zero).
//!
//! Durations are the ones the state's sample stream would draw, so the
//! bound is admissible for every continuation that appends to queues.
//!
//! # Reference
//! Brucker (2007), "Scheduling Algorithms", Ch. 6.4 (Branch and Bound for Job Shops)

use super::{OperationStatus, SimulationState, Simulator};
use crate::models::MachineStatus;

impl Simulator {
    /// Lower bound on the makespan of any completion of `state`.
    ///
    /// Returns `i64::MAX` when some unassigned operation has no usable
    /// machine left.
    pub fn lower_bound(&self, state: &SimulationState) -> i64 {
        let clock = state.clock_ms;
        let m_count = self.machine_count();
        let usable: Vec<bool> = state
            .machines
            .iter()
            .map(|ms| !(ms.status == MachineStatus::Down && ms.unavailable_until.is_none()))
            .collect();
        let avail: Vec<i64> = state
            .machines
            .iter()
            .map(|ms| ms.available_at(clock, None))
            .collect();

        let mut bound = clock.max(state.completed_makespan_ms());
        for (m, ms) in state.machines.iter().enumerate() {
            if usable[m] && ms.queue_len() > 0 {
                bound = bound.max(avail[m]);
            }
        }

        let n = self.operation_count();
        let mut min_duration = vec![0i64; n];
        let mut exclusive = vec![0i64; m_count];
        let mut total_min = 0i64;
        for (op, status) in state.operations.iter().enumerate() {
            if status.is_assigned() {
                continue;
            }
            let mut best = i64::MAX;
            let mut usable_count = 0;
            let mut only = 0;
            for &m in self.eligible_machines(op) {
                if !usable[m] {
                    continue;
                }
                usable_count += 1;
                only = m;
                if let Some(d) = self.sample_duration(state, op, m) {
                    best = best.min(d);
                }
            }
            if usable_count == 0 || best == i64::MAX {
                return i64::MAX;
            }
            if usable_count == 1 {
                exclusive[only] += best;
            }
            min_duration[op] = best;
            total_min += best;
        }

        // Machine bound.
        for m in 0..m_count {
            if usable[m] && exclusive[m] > 0 {
                bound = bound.max(avail[m].saturating_add(exclusive[m]));
            }
        }

        // Aggregate bound.
        let mut committed = 0i64;
        let mut usable_machines = 0i64;
        for (m, ms) in state.machines.iter().enumerate() {
            if !usable[m] {
                continue;
            }
            usable_machines += 1;
            committed += if ms.queue_len() > 0 { avail[m] } else { clock };
        }
        if usable_machines > 0 && total_min > 0 {
            let total = committed + total_min;
            bound = bound.max((total + usable_machines - 1) / usable_machines);
        }

        // Job bound.
        let mut projected_end = vec![None; n];
        for ms in &state.machines {
            for (slot, _, end) in ms.projected_slots(clock) {
                projected_end[slot.operation] = Some(end);
            }
        }
        for j in 0..self.job_count() {
            let mut t = clock.max(self.job_release_ms(j));
            let mut remaining = 0i64;
            for &op in self.job_operations(j) {
                match state.operations[op] {
                    OperationStatus::Done { end_ms, .. } | OperationStatus::Running { end_ms, .. } => {
                        t = t.max(end_ms);
                    }
                    OperationStatus::Queued { .. } => {
                        if let Some(end) = projected_end[op] {
                            t = t.max(end);
                        }
                    }
                    OperationStatus::Waiting | OperationStatus::Ready { .. } => {
                        remaining += min_duration[op];
                    }
                }
            }
            bound = bound.max(t + remaining);
        }

        bound
    }
}
