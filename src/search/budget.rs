//! Cooperative search budget.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

use super::Termination;
use crate::error::SchedulingError;

/// Node and wall-clock budget shared by all workers of one search.
///
/// Workers call [`Budget::tick`] before every expansion; once a limit
/// trips, every later tick fails and the first reason is kept.
#[derive(Debug)]
pub struct Budget {
    nodes: AtomicU64,
    max_nodes: u64,
    deadline: Option<Instant>,
    stop: Mutex<Option<Termination>>,
}

impl Budget {
    /// Starts a budget now.
    pub fn new(max_nodes: u64, time_limit: Duration) -> Self {
        Self {
            nodes: AtomicU64::new(0),
            max_nodes,
            deadline: Instant::now().checked_add(time_limit),
            stop: Mutex::new(None),
        }
    }

    /// Accounts for one expansion.
    ///
    /// # Errors
    /// [`SchedulingError::BudgetExceeded`] once a limit is reached.
    pub fn tick(&self) -> Result<(), SchedulingError> {
        self.check()?;
        let n = self.nodes.fetch_add(1, Ordering::Relaxed);
        if n >= self.max_nodes {
            self.nodes.fetch_sub(1, Ordering::Relaxed);
            return Err(self.halt(Termination::NodeLimit));
        }
        Ok(())
    }

    /// Checks the stop flag and the deadline without counting a node.
    pub fn check(&self) -> Result<(), SchedulingError> {
        if self.stop.lock().is_some() {
            return Err(self.exceeded());
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(self.halt(Termination::TimeLimit));
        }
        Ok(())
    }

    /// Stops the search for `reason` (the first reason wins).
    pub fn halt(&self, reason: Termination) -> SchedulingError {
        let mut stop = self.stop.lock();
        if stop.is_none() {
            warn!(
                reason = %reason,
                nodes = self.nodes_explored(),
                "search budget reached"
            );
            *stop = Some(reason);
        }
        self.exceeded()
    }

    /// Expansions performed so far.
    pub fn nodes_explored(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }

    /// Why the search was stopped, if it was.
    pub fn termination(&self) -> Option<Termination> {
        *self.stop.lock()
    }

    fn exceeded(&self) -> SchedulingError {
        SchedulingError::BudgetExceeded {
            nodes: self.nodes_explored(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_limit() {
        let b = Budget::new(2, Duration::from_secs(60));
        assert!(b.tick().is_ok());
        assert!(b.tick().is_ok());
        let err = b.tick().unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(b.nodes_explored(), 2);
        assert_eq!(b.termination(), Some(Termination::NodeLimit));
        assert!(b.check().is_err());
    }

    #[test]
    fn test_time_limit() {
        let b = Budget::new(100, Duration::ZERO);
        assert!(b.tick().is_err());
        assert_eq!(b.termination(), Some(Termination::TimeLimit));
        assert_eq!(b.nodes_explored(), 0);
    }

    #[test]
    fn test_first_reason_wins() {
        let b = Budget::new(100, Duration::from_secs(60));
        b.halt(Termination::IterationLimit);
        b.halt(Termination::NodeLimit);
        assert_eq!(b.termination(), Some(Termination::IterationLimit));
    }
}
