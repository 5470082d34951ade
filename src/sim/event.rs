//! Event queue with deterministic ordering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Simulation event.
///
/// Indices refer to the simulator's id-sorted operation, machine and
/// job tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// An operation finished processing.
    OperationComplete { operation: usize, machine: usize },
    /// A machine reservation or downtime ended.
    MachineFree { machine: usize },
    /// A job became available.
    JobRelease { job: usize },
    /// A committed operation begins processing.
    OperationStart { operation: usize, machine: usize },
}

impl EventKind {
    /// Processing priority at equal timestamps (lower first).
    ///
    /// Completions free machines before releases add work and before
    /// deferred starts claim the machine.
    pub fn priority(&self) -> u8 {
        match self {
            Self::OperationComplete { .. } => 0,
            Self::MachineFree { .. } => 1,
            Self::JobRelease { .. } => 2,
            Self::OperationStart { .. } => 3,
        }
    }
}

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Priority (completions before frees before releases before starts)
/// 3. Sequence number (FIFO for same time/priority)
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct EventKey {
    /// When this event should be processed (ms).
    pub time_ms: i64,
    /// Priority for ordering at same time.
    pub priority: u8,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time_ms.cmp(&other.time_ms) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match self.priority.cmp(&other.priority) {
            Ordering::Equal => {}
            ord => return ord,
        }

        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A queued event together with its ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub key: EventKey,
    pub kind: EventKind,
}

/// Time-ordered event queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "QueueRepr", into = "QueueRepr")]
pub struct EventQueue {
    events: BTreeMap<EventKey, EventKind>,
    next_sequence: u64,
}

#[derive(Clone, Serialize, Deserialize)]
struct QueueRepr {
    next_sequence: u64,
    events: Vec<ScheduledEvent>,
}

impl From<QueueRepr> for EventQueue {
    fn from(repr: QueueRepr) -> Self {
        Self {
            events: repr.events.into_iter().map(|e| (e.key, e.kind)).collect(),
            next_sequence: repr.next_sequence,
        }
    }
}

impl From<EventQueue> for QueueRepr {
    fn from(queue: EventQueue) -> Self {
        Self {
            next_sequence: queue.next_sequence,
            events: queue
                .events
                .into_iter()
                .map(|(key, kind)| ScheduledEvent { key, kind })
                .collect(),
        }
    }
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event at the given time.
    pub fn push(&mut self, time_ms: i64, kind: EventKind) -> EventKey {
        let key = EventKey {
            time_ms,
            priority: kind.priority(),
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.events.insert(key, kind);
        key
    }

    /// Removes and returns the earliest event.
    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        self.events
            .pop_first()
            .map(|(key, kind)| ScheduledEvent { key, kind })
    }

    /// Time of the earliest event.
    pub fn peek_time(&self) -> Option<i64> {
        self.events.first_key_value().map(|(k, _)| k.time_ms)
    }

    /// Pending events in processing order.
    pub fn iter(&self) -> impl Iterator<Item = ScheduledEvent> + '_ {
        self.events
            .iter()
            .map(|(&key, &kind)| ScheduledEvent { key, kind })
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
