//! Job-shop scheduling for the U-Engine ecosystem.
//!
//! A deterministic discrete-event simulator exposes scheduling as a
//! sequence of decisions (operation → machine). Search optimizers and a
//! dynamic control tower both drive the same simulator.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `Job`, `Operation`, `Machine`,
//!   `DurationDistribution`, `TransferTimeMatrix`, `Scenario`, `Trace`
//! - **`validation`**: Scenario integrity checks and trace feasibility checks
//! - **`sim`**: Event queue, simulation state, actions, lower bound
//! - **`dispatching`**: Priority rules (ECT, SPT, EDD, ATC, ...) and the rule engine
//! - **`search`**: DFS, branch-and-bound and MCTS optimizers
//! - **`control`**: Control tower with dispatch strategies and routing results
//! - **`kpi`**: Schedule performance indicators
//!
//! # Determinism
//!
//! Durations are drawn from a stream keyed by (seed, operation, machine).
//! Replaying an action sequence with its seed reproduces the trace
//! exactly. Exhaustive DFS and branch-and-bound return the same action
//! sequence for any worker count; MCTS is reproducible for a fixed one.
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"
//! - Brucker (2007), "Scheduling Algorithms"
//! - Browne et al. (2012), "A Survey of Monte Carlo Tree Search Methods"

pub mod control;
pub mod dispatching;
pub mod error;
pub mod kpi;
pub mod models;
pub mod search;
pub mod sim;
pub mod validation;

pub use error::{InvalidActionReason, ScenarioError, SchedulingError};
