//! Processing-time distributions.
//!
//! Every (operation type, machine) pair has a duration distribution.
//! Sampling is a pure function of the distribution and the random
//! stream handed in, so a seeded stream yields reproducible durations.
//!
//! # References
//! - Law (2015), "Simulation Modeling and Analysis", Ch. 6 (Input Distributions)
//! - Box & Muller (1958), "A Note on the Generation of Random Normal Deviates"

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Probabilistic processing-time model.
///
/// Parameters are in milliseconds. Samples are rounded to whole
/// milliseconds and never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum DurationDistribution {
    /// Deterministic duration.
    Fixed { duration_ms: i64 },
    /// Normal distribution, truncated at zero.
    Normal { mean_ms: f64, std_ms: f64 },
    /// Uniform distribution on `[low_ms, high_ms]`.
    Uniform { low_ms: f64, high_ms: f64 },
    /// Exponential distribution with the given mean.
    Exponential { mean_ms: f64 },
}

impl DurationDistribution {
    /// Deterministic duration.
    pub fn fixed(duration_ms: i64) -> Self {
        Self::Fixed { duration_ms }
    }

    /// Normal distribution.
    pub fn normal(mean_ms: f64, std_ms: f64) -> Self {
        Self::Normal { mean_ms, std_ms }
    }

    /// Uniform distribution.
    pub fn uniform(low_ms: f64, high_ms: f64) -> Self {
        Self::Uniform { low_ms, high_ms }
    }

    /// Exponential distribution.
    pub fn exponential(mean_ms: f64) -> Self {
        Self::Exponential { mean_ms }
    }

    /// Expected (mean) duration in ms.
    pub fn expected_ms(&self) -> f64 {
        match *self {
            Self::Fixed { duration_ms } => duration_ms as f64,
            Self::Normal { mean_ms, .. } => mean_ms.max(0.0),
            Self::Uniform { low_ms, high_ms } => (low_ms + high_ms) / 2.0,
            Self::Exponential { mean_ms } => mean_ms,
        }
    }

    /// Whether every sample equals the expected value.
    pub fn is_deterministic(&self) -> bool {
        match *self {
            Self::Fixed { .. } => true,
            Self::Normal { std_ms, .. } => std_ms <= 0.0,
            Self::Uniform { low_ms, high_ms } => (high_ms - low_ms).abs() < f64::EPSILON,
            Self::Exponential { mean_ms } => mean_ms <= 0.0,
        }
    }

    /// Whether the parameters describe a usable distribution.
    pub fn is_well_formed(&self) -> bool {
        match *self {
            Self::Fixed { duration_ms } => duration_ms >= 0,
            Self::Normal { mean_ms, std_ms } => mean_ms.is_finite() && std_ms.is_finite() && std_ms >= 0.0,
            Self::Uniform { low_ms, high_ms } => {
                low_ms.is_finite() && high_ms.is_finite() && low_ms >= 0.0 && low_ms <= high_ms
            }
            Self::Exponential { mean_ms } => mean_ms.is_finite() && mean_ms >= 0.0,
        }
    }

    /// Draws one duration (ms) from the given stream.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        let raw = match *self {
            Self::Fixed { duration_ms } => return duration_ms.max(0),
            Self::Normal { mean_ms, std_ms } => {
                if std_ms <= 0.0 {
                    mean_ms
                } else {
                    // Box-Muller transform
                    let u1: f64 = rng.random::<f64>().max(1e-12);
                    let u2: f64 = rng.random::<f64>();
                    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                    mean_ms + std_ms * z
                }
            }
            Self::Uniform { low_ms, high_ms } => {
                if high_ms <= low_ms {
                    low_ms
                } else {
                    low_ms + (high_ms - low_ms) * rng.random::<f64>()
                }
            }
            Self::Exponential { mean_ms } => {
                if mean_ms <= 0.0 {
                    0.0
                } else {
                    let u: f64 = rng.random::<f64>();
                    -mean_ms * (1.0 - u).ln()
                }
            }
        };
        raw.max(0.0).round() as i64
    }
}

impl Default for DurationDistribution {
    fn default() -> Self {
        Self::Fixed { duration_ms: 0 }
    }
}

/// Duration distributions keyed by operation type, then machine ID.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurationModel {
    table: BTreeMap<String, BTreeMap<String, DurationDistribution>>,
}

impl DurationModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines the distribution for an (operation type, machine) pair.
    pub fn set(
        &mut self,
        operation_type: impl Into<String>,
        machine_id: impl Into<String>,
        distribution: DurationDistribution,
    ) {
        self.table
            .entry(operation_type.into())
            .or_default()
            .insert(machine_id.into(), distribution);
    }

    /// Builder: defines a distribution and returns self.
    pub fn with(
        mut self,
        operation_type: impl Into<String>,
        machine_id: impl Into<String>,
        distribution: DurationDistribution,
    ) -> Self {
        self.set(operation_type, machine_id, distribution);
        self
    }

    /// Looks up the distribution for an (operation type, machine) pair.
    pub fn get(&self, operation_type: &str, machine_id: &str) -> Option<&DurationDistribution> {
        self.table.get(operation_type)?.get(machine_id)
    }

    /// Iterates over `(operation type, machine ID, distribution)` entries.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &DurationDistribution)> {
        self.table.iter().flat_map(|(op_type, per_machine)| {
            per_machine
                .iter()
                .map(move |(m, d)| (op_type.as_str(), m.as_str(), d))
        })
    }

    /// Number of defined pairs.
    pub fn len(&self) -> usize {
        self.table.values().map(BTreeMap::len).sum()
    }

    /// Whether no pairs are defined.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
