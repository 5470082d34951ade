//! Operation model.
//!
//! An operation is the smallest schedulable unit of work. Its type
//! decides which machines may process it.

use serde::{Deserialize, Serialize};

/// An operation (processing step of a job).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique operation identifier.
    pub id: String,
    /// Owning job identifier.
    pub job_id: String,
    /// Operation type, matched against machine capabilities.
    pub operation_type: String,
    /// Position within the job (0-indexed).
    pub sequence: u32,
}

impl Operation {
    /// Creates a new operation.
    pub fn new(
        id: impl Into<String>,
        job_id: impl Into<String>,
        sequence: u32,
        operation_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            job_id: job_id.into(),
            operation_type: operation_type.into(),
            sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_new() {
        let op = Operation::new("J1_O2", "J1", 1, "drilling");
        assert_eq!(op.id, "J1_O2");
        assert_eq!(op.job_id, "J1");
        assert_eq!(op.sequence, 1);
        assert_eq!(op.operation_type, "drilling");
    }
}
