//! Control tower: real-time dispatching over the simulator.
//!
//! The [`ControlTower`] keeps a priority-ordered list of pending job
//! operations and, at each decision point, lets one
//! [`DispatchStrategy`] route them onto machines through the same
//! [`Action`](crate::sim::Action) model the optimizers use. Every
//! assignment is recorded and exported as a [`RoutingResult`] that can be
//! replayed through [`Simulator::replay`](crate::sim::Simulator::replay).

mod routing;
mod strategy;
mod tower;

pub use routing::{RoutingEntry, RoutingResult};
pub use strategy::DispatchStrategy;
pub use tower::{ControlTower, MachineView, PendingOperation, TowerStats};
