//! Inter-machine transfer times.
//!
//! When consecutive operations of a job run on different machines, the
//! successor cannot start until the work piece has been moved. Transfer
//! times are directed: `from → to` may differ from `to → from`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transfer time matrix between machines.
///
/// Staying on the same machine costs 0 unless explicitly set.
///
/// # Example
/// ```
/// use u_jobshop::models::TransferTimeMatrix;
///
/// let mut tm = TransferTimeMatrix::new().with_default(500);
/// tm.set_transfer("M1", "M2", 1200);
/// assert_eq!(tm.transfer_ms("M1", "M2"), 1200);
/// assert_eq!(tm.transfer_ms("M2", "M1"), 500);
/// assert_eq!(tm.transfer_ms("M1", "M1"), 0);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferTimeMatrix {
    /// Explicit transfer times: from machine → to machine → ms.
    #[serde(default)]
    transfers: BTreeMap<String, BTreeMap<String, i64>>,
    /// Time for machine pairs without an explicit entry (ms).
    #[serde(default)]
    default_ms: i64,
}

impl TransferTimeMatrix {
    /// Creates an empty matrix (all transfers free).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default transfer time.
    pub fn with_default(mut self, default_ms: i64) -> Self {
        self.default_ms = default_ms;
        self
    }

    /// Builder: defines a transfer and returns self.
    pub fn with_transfer(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        time_ms: i64,
    ) -> Self {
        self.set_transfer(from, to, time_ms);
        self
    }

    /// Defines the transfer time from one machine to another.
    pub fn set_transfer(&mut self, from: impl Into<String>, to: impl Into<String>, time_ms: i64) {
        self.transfers
            .entry(from.into())
            .or_default()
            .insert(to.into(), time_ms);
    }

    /// Transfer time between two machines (ms).
    pub fn transfer_ms(&self, from: &str, to: &str) -> i64 {
        let explicit = self.transfers.get(from).and_then(|row| row.get(to));
        match explicit {
            Some(&ms) => ms,
            None if from == to => 0,
            None => self.default_ms,
        }
    }

    /// Default transfer time (ms).
    pub fn default_ms(&self) -> i64 {
        self.default_ms
    }

    /// Iterates over explicit `(from, to, ms)` entries.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, i64)> {
        self.transfers.iter().flat_map(|(from, row)| {
            row.iter()
                .map(move |(to, &ms)| (from.as_str(), to.as_str(), ms))
        })
    }

    /// Number of explicitly defined transfers.
    pub fn transfer_count(&self) -> usize {
        self.transfers.values().map(BTreeMap::len).sum()
    }
}
