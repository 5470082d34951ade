//! Schedule quality metrics (KPIs).
//!
//! Computes standard scheduling performance indicators from a realized
//! [`Trace`] and the [`Scenario`] it was produced for.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Makespan (C_max) | Latest completion time |
//! | Total Tardiness | Sum of max(0, completion - due date) over jobs |
//! | Weighted Tardiness | Same, each job scaled by its weight |
//! | Maximum Tardiness | Largest single delay |
//! | On-Time Rate | Fraction of finished jobs meeting their due date |
//! | Avg Utilization | Mean machine busyness over the makespan |
//! | Avg Flow Time | Mean time from release to completion |
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 1.2: Performance Measures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Scenario, Trace};

/// Schedule performance indicators.
///
/// All time values are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleKpi {
    /// Makespan: latest completion time (ms).
    pub makespan_ms: i64,
    /// Sum of job tardiness (ms).
    pub total_tardiness_ms: i64,
    /// Sum of weight × tardiness.
    pub weighted_tardiness: f64,
    /// Maximum tardiness of any single job (ms).
    pub max_tardiness_ms: i64,
    /// Fraction of jobs completing on time (0.0..1.0).
    pub on_time_rate: f64,
    /// Average machine utilization (0.0..1.0).
    pub avg_utilization: f64,
    /// Per-machine utilization; idle machines report 0.
    pub utilization_by_machine: BTreeMap<String, f64>,
    /// Average flow time: mean(completion - release) in ms.
    pub avg_flow_time_ms: f64,
    /// Jobs with at least one operation in the trace.
    pub jobs_completed: usize,
}

impl ScheduleKpi {
    /// Computes KPIs from a trace and its scenario.
    ///
    /// Jobs absent from the trace are ignored.
    pub fn calculate(trace: &Trace, scenario: &Scenario) -> Self {
        let mut total_tardiness: i64 = 0;
        let mut weighted_tardiness = 0.0;
        let mut max_tardiness: i64 = 0;
        let mut on_time_count: usize = 0;
        let mut total_flow_time: f64 = 0.0;
        let mut counted_jobs: usize = 0;

        for job in &scenario.jobs {
            let Some(completion) = trace.job_completion_time(&job.id) else {
                continue;
            };
            counted_jobs += 1;
            total_flow_time += (completion - job.release_ms()) as f64;

            match job.due_date {
                Some(due) if completion > due => {
                    let tardiness = completion - due;
                    total_tardiness += tardiness;
                    weighted_tardiness += job.weight * tardiness as f64;
                    max_tardiness = max_tardiness.max(tardiness);
                }
                // No due date counts as on time.
                _ => on_time_count += 1,
            }
        }

        let mut utilization_by_machine: BTreeMap<String, f64> = scenario
            .machines
            .iter()
            .map(|m| (m.id.clone(), 0.0))
            .collect();
        utilization_by_machine.extend(trace.machine_utilizations());

        let avg_utilization = if trace.is_empty() || utilization_by_machine.is_empty() {
            0.0
        } else {
            let sum: f64 = utilization_by_machine.values().sum();
            sum / utilization_by_machine.len() as f64
        };

        let on_time_rate = if counted_jobs == 0 {
            1.0
        } else {
            on_time_count as f64 / counted_jobs as f64
        };

        let avg_flow_time_ms = if counted_jobs == 0 {
            0.0
        } else {
            total_flow_time / counted_jobs as f64
        };

        Self {
            makespan_ms: trace.makespan_ms,
            total_tardiness_ms: total_tardiness,
            weighted_tardiness,
            max_tardiness_ms: max_tardiness,
            on_time_rate,
            avg_utilization,
            utilization_by_machine,
            avg_flow_time_ms,
            jobs_completed: counted_jobs,
        }
    }

    /// Whether the schedule meets the given quality thresholds.
    pub fn meets_thresholds(&self, max_tardiness_ms: i64, min_utilization: f64) -> bool {
        self.max_tardiness_ms <= max_tardiness_ms && self.avg_utilization >= min_utilization
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DurationDistribution, Job, Machine, TraceRecord};

    fn scenario(jobs: Vec<Job>) -> Scenario {
        let mut s = Scenario::new()
            .with_machine(Machine::new("M1").with_capability("A"))
            .with_machine(Machine::new("M2").with_capability("A"))
            .with_duration("A", "M1", DurationDistribution::fixed(1000))
            .with_duration("A", "M2", DurationDistribution::fixed(1000));
        for job in jobs {
            let op = format!("{}_A", job.id);
            s = s.with_job_steps(job, [(op, "A")]);
        }
        s
    }

    fn record(job: &str, machine: &str, start: i64, end: i64) -> TraceRecord {
        TraceRecord::new(format!("{job}_A"), job, machine, start, end)
    }

    #[test]
    fn test_kpi_basic() {
        let s = scenario(vec![
            Job::new("J1").with_due_date(5000),
            Job::new("J2").with_due_date(5000),
        ]);
        let trace = Trace::from_records(vec![
            record("J1", "M1", 0, 1000),
            record("J2", "M1", 1000, 3000),
        ]);
        let kpi = ScheduleKpi::calculate(&trace, &s);
        assert_eq!(kpi.makespan_ms, 3000);
        assert_eq!(kpi.total_tardiness_ms, 0);
        assert_eq!(kpi.jobs_completed, 2);
        assert!((kpi.on_time_rate - 1.0).abs() < 1e-10);
        assert!((kpi.avg_flow_time_ms - 2000.0).abs() < 1e-10); // (1000+3000)/2
    }

    #[test]
    fn test_kpi_tardiness() {
        let s = scenario(vec![
            Job::new("J1").with_due_date(500).with_weight(3.0), // tardy 500
            Job::new("J2").with_due_date(5000),
        ]);
        let trace = Trace::from_records(vec![
            record("J1", "M1", 0, 1000),
            record("J2", "M1", 1000, 2000),
        ]);
        let kpi = ScheduleKpi::calculate(&trace, &s);
        assert_eq!(kpi.total_tardiness_ms, 500);
        assert_eq!(kpi.max_tardiness_ms, 500);
        assert!((kpi.weighted_tardiness - 1500.0).abs() < 1e-10);
        assert!((kpi.on_time_rate - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_kpi_utilization_includes_idle_machines() {
        let s = scenario(vec![Job::new("J1"), Job::new("J2")]);
        let trace = Trace::from_records(vec![
            record("J1", "M1", 0, 2000),
            record("J2", "M1", 2000, 4000),
        ]);
        let kpi = ScheduleKpi::calculate(&trace, &s);
        assert!((kpi.utilization_by_machine["M1"] - 1.0).abs() < 1e-10);
        assert!((kpi.utilization_by_machine["M2"] - 0.0).abs() < 1e-10);
        assert!((kpi.avg_utilization - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_kpi_flow_time_from_release() {
        let s = scenario(vec![Job::new("J1").with_release_time(1000), Job::new("J2")]);
        let trace = Trace::from_records(vec![
            record("J1", "M1", 2000, 3000), // flow 2000
            record("J2", "M1", 0, 1000),    // flow 1000
        ]);
        let kpi = ScheduleKpi::calculate(&trace, &s);
        assert!((kpi.avg_flow_time_ms - 1500.0).abs() < 1e-10);
    }

    #[test]
    fn test_kpi_empty() {
        let kpi = ScheduleKpi::calculate(&Trace::default(), &scenario(vec![Job::new("J1")]));
        assert_eq!(kpi.makespan_ms, 0);
        assert_eq!(kpi.jobs_completed, 0);
        assert!((kpi.on_time_rate - 1.0).abs() < 1e-10);
        assert!((kpi.avg_utilization - 0.0).abs() < 1e-10);
    }

    #[test]
    fn test_meets_thresholds() {
        let s = scenario(vec![Job::new("J1").with_due_date(500)]);
        let trace = Trace::from_records(vec![record("J1", "M1", 0, 1000)]);
        let kpi = ScheduleKpi::calculate(&trace, &s);
        assert!(kpi.meets_thresholds(500, 0.0));
        assert!(!kpi.meets_thresholds(499, 0.0));
        assert!(!kpi.meets_thresholds(1000, 0.9)); // M2 idle
    }
}
