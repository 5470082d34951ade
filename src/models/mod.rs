//! Job-shop domain models.
//!
//! Provides the data types for describing a scheduling scenario and the
//! realized schedule a simulation produces.
//!
//! # Domain Mappings
//!
//! | u-jobshop | Manufacturing | Logistics |
//! |-----------|--------------|-----------|
//! | Job | Production order | Shipment |
//! | Operation | Process step | Transport leg |
//! | Machine | Machine / cell | Dock / vehicle |
//! | Trace | Executed production plan | Executed route plan |

mod duration;
mod job;
mod machine;
mod operation;
mod scenario;
mod trace;
mod transfer;

pub use duration::{DurationDistribution, DurationModel};
pub use job::Job;
pub use machine::{InitialMachineStatus, Machine, MachineStatus};
pub use operation::Operation;
pub use scenario::Scenario;
pub use trace::{Trace, TraceRecord, Violation, ViolationType};
pub use transfer::TransferTimeMatrix;
