//! Search tree node.

use std::cmp::Ordering;

use crate::sim::{Action, SimulationState, Simulator};

/// A settled simulation state inside a search.
///
/// Ordered for a max-heap so that the *best* node pops first: lowest
/// lower bound, then deepest, then earliest created.
#[derive(Debug, Clone)]
pub struct SearchNode {
    pub state: SimulationState,
    /// Actions applied since the initial state.
    pub depth: usize,
    /// Projected makespan of the committed work.
    pub projected_makespan_ms: i64,
    pub lower_bound_ms: i64,
    /// Creation order.
    pub sequence: u64,
}

impl SearchNode {
    /// Wraps a settled state, computing its bounds.
    pub fn new(sim: &Simulator, state: SimulationState, sequence: u64) -> Self {
        Self {
            depth: state.actions().len(),
            projected_makespan_ms: state.projected_makespan_ms(),
            lower_bound_ms: sim.lower_bound(&state),
            state,
            sequence,
        }
    }

    /// Actions taken to reach this node.
    pub fn actions(&self) -> &[Action] {
        self.state.actions()
    }

    fn key(&self) -> (i64, std::cmp::Reverse<usize>, u64) {
        (self.lower_bound_ms, std::cmp::Reverse(self.depth), self.sequence)
    }
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SearchNode {}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fixtures::two_by_two;
    use crate::sim::SimulatorConfig;
    use std::collections::BinaryHeap;

    #[test]
    fn test_heap_order() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let root = sim.initialize(0);
        let child = sim.applied(&root, &Action::new(0, 0)).unwrap();

        let mut heap = BinaryHeap::new();
        let mut a = SearchNode::new(&sim, root.clone(), 0);
        a.lower_bound_ms = 9000;
        let mut b = SearchNode::new(&sim, root, 1);
        b.lower_bound_ms = 8000;
        let mut c = SearchNode::new(&sim, child, 2);
        c.lower_bound_ms = 8000;
        heap.push(a);
        heap.push(b);
        heap.push(c);

        // Same bound: deeper first.
        assert_eq!(heap.pop().unwrap().sequence, 2);
        assert_eq!(heap.pop().unwrap().sequence, 1);
        assert_eq!(heap.pop().unwrap().sequence, 0);
    }

    #[test]
    fn test_node_bounds() {
        let sim = Simulator::new(&two_by_two(), SimulatorConfig::default()).unwrap();
        let state = sim.applied(&sim.initialize(0), &Action::new(0, 0)).unwrap();
        let node = SearchNode::new(&sim, state, 0);
        assert_eq!(node.depth, 1);
        assert_eq!(node.projected_makespan_ms, 3000);
        assert_eq!(node.lower_bound_ms, 8000);
        assert_eq!(node.actions(), &[Action::new(0, 0)]);
    }
}
