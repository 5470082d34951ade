//! Scenario (problem instance) model.
//!
//! A scenario bundles everything a simulation needs: jobs, the operation
//! catalog, machines with their initial status, the duration model and
//! the transfer-time matrix. It is immutable once a simulation starts.

use serde::{Deserialize, Serialize};

use super::{DurationDistribution, DurationModel, Job, Machine, Operation, TransferTimeMatrix};

/// A job-shop scheduling problem instance.
///
/// Entities reference each other by string ID only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    /// Jobs to schedule.
    pub jobs: Vec<Job>,
    /// Operation catalog.
    pub operations: Vec<Operation>,
    /// Available machines.
    pub machines: Vec<Machine>,
    /// Processing-time distributions per (operation type, machine).
    #[serde(default)]
    pub durations: DurationModel,
    /// Inter-machine transfer times.
    #[serde(default)]
    pub transfers: TransferTimeMatrix,
}

impl Scenario {
    /// Creates an empty scenario.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job.
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// Adds an operation to the catalog.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Adds a machine.
    pub fn with_machine(mut self, machine: Machine) -> Self {
        self.machines.push(machine);
        self
    }

    /// Defines a duration distribution for an (operation type, machine) pair.
    pub fn with_duration(
        mut self,
        operation_type: impl Into<String>,
        machine_id: impl Into<String>,
        distribution: DurationDistribution,
    ) -> Self {
        self.durations.set(operation_type, machine_id, distribution);
        self
    }

    /// Sets the transfer-time matrix.
    pub fn with_transfers(mut self, transfers: TransferTimeMatrix) -> Self {
        self.transfers = transfers;
        self
    }

    /// Adds a job together with its operations.
    ///
    /// `steps` lists `(operation id, operation type)` in processing order.
    pub fn with_job_steps<I, S, T>(mut self, job: Job, steps: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut job = job;
        for (seq, (op_id, op_type)) in steps.into_iter().enumerate() {
            let op_id = op_id.into();
            job.operations.push(op_id.clone());
            self.operations
                .push(Operation::new(op_id, job.id.clone(), seq as u32, op_type));
        }
        self.jobs.push(job);
        self
    }

    /// Finds a job by ID.
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Finds an operation by ID.
    pub fn operation(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.id == id)
    }

    /// Finds a machine by ID.
    pub fn machine(&self, id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id == id)
    }

    /// Machines able to process the given operation type.
    pub fn eligible_machines(&self, operation_type: &str) -> Vec<&Machine> {
        self.machines
            .iter()
            .filter(|m| m.can_perform(operation_type))
            .collect()
    }

    /// Total number of operations.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }
}
