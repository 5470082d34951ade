//! Best complete schedule shared across workers.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

use crate::sim::Action;

/// Incumbent solution.
///
/// The makespan is mirrored in an atomic so pruning reads never lock;
/// those reads may be stale, which only weakens pruning.
///
/// Equal makespans are resolved toward the lexicographically smaller
/// action sequence, so the final incumbent is independent of the order
/// in which workers report.
#[derive(Debug)]
pub struct Incumbent {
    bound: AtomicI64,
    best: Mutex<Option<(i64, Vec<Action>)>>,
}

impl Incumbent {
    pub fn new() -> Self {
        Self {
            bound: AtomicI64::new(i64::MAX),
            best: Mutex::new(None),
        }
    }

    /// Current best makespan (`i64::MAX` when none).
    pub fn bound(&self) -> i64 {
        self.bound.load(Ordering::Relaxed)
    }

    /// Offers a complete schedule; returns whether it became the incumbent.
    pub fn offer(&self, makespan_ms: i64, actions: &[Action]) -> bool {
        if makespan_ms > self.bound() {
            return false;
        }
        let mut best = self.best.lock();
        let better = match best.as_ref() {
            None => true,
            Some((m, a)) => makespan_ms < *m || (makespan_ms == *m && actions < a.as_slice()),
        };
        if better {
            debug!(makespan_ms, depth = actions.len(), "incumbent improved");
            *best = Some((makespan_ms, actions.to_vec()));
            self.bound.store(makespan_ms, Ordering::Relaxed);
        }
        better
    }

    /// Whether a partial schedule with this lower bound and action prefix
    /// can still become the incumbent.
    ///
    /// A bound equal to the incumbent's makespan is admitted only while
    /// the prefix does not sort after the incumbent's own prefix, so ties
    /// settle on the smallest optimal sequence whichever worker finds it.
    pub fn admits(&self, lower_bound_ms: i64, prefix: &[Action]) -> bool {
        if lower_bound_ms < self.bound() {
            return true;
        }
        match self.best.lock().as_ref() {
            None => true,
            Some((m, best)) if lower_bound_ms == *m => {
                prefix <= &best[..prefix.len().min(best.len())]
            }
            Some((m, _)) => lower_bound_ms < *m,
        }
    }

    /// Copy of the incumbent.
    pub fn snapshot(&self) -> Option<(i64, Vec<Action>)> {
        self.best.lock().clone()
    }
}

impl Default for Incumbent {
    fn default() -> Self {
        Self::new()
    }
}
