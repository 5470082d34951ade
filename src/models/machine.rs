//! Machine model.
//!
//! Machines process operations whose type is listed in their
//! capabilities. A machine runs at most one operation at a time.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 1.2

use serde::{Deserialize, Serialize};
use std::fmt;

/// A machine that can be assigned operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// Unique machine identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Operation types this machine can perform.
    pub capabilities: Vec<String>,
    /// Status at t=0.
    #[serde(default)]
    pub initial: InitialMachineStatus,
}

/// Operational status of a machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    /// Ready to start work.
    #[default]
    Idle,
    /// Processing, or reserved until a known time.
    Busy,
    /// Unavailable (breakdown or maintenance).
    #[serde(alias = "maintenance", alias = "breakdown")]
    Down,
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Down => "down",
        };
        f.write_str(s)
    }
}

/// Machine status at the start of a simulation.
///
/// `Busy` and `Down` machines become idle at `available_from_ms`.
/// A `Down` machine with no `available_from_ms` stays down until an
/// explicit status update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialMachineStatus {
    /// Status at t=0.
    pub status: MachineStatus,
    /// Time the machine becomes available (ms).
    #[serde(default)]
    pub available_from_ms: Option<i64>,
}

impl InitialMachineStatus {
    /// Idle and available at t=0.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Busy until the given time.
    pub fn busy_until(until_ms: i64) -> Self {
        Self {
            status: MachineStatus::Busy,
            available_from_ms: Some(until_ms),
        }
    }

    /// Down until the given time, or indefinitely.
    pub fn down(until_ms: Option<i64>) -> Self {
        Self {
            status: MachineStatus::Down,
            available_from_ms: until_ms,
        }
    }
}

impl Machine {
    /// Creates a new idle machine without capabilities.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            capabilities: Vec::new(),
            initial: InitialMachineStatus::idle(),
        }
    }

    /// Sets the machine name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a capability (operation type).
    pub fn with_capability(mut self, operation_type: impl Into<String>) -> Self {
        self.capabilities.push(operation_type.into());
        self
    }

    /// Sets the initial status.
    pub fn with_initial_status(mut self, initial: InitialMachineStatus) -> Self {
        self.initial = initial;
        self
    }

    /// Whether this machine can perform the given operation type.
    pub fn can_perform(&self, operation_type: &str) -> bool {
        self.capabilities.iter().any(|c| c == operation_type)
    }

    /// Number of distinct operation types this machine supports.
    pub fn capability_count(&self) -> usize {
        self.capabilities.len()
    }
}
