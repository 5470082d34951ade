//! Dispatching rules and rule engine.
//!
//! Rules score [`Candidate`] actions (an operation on a machine) at a
//! decision point; the [`RuleEngine`] composes them into a total order.
//! MCTS rollouts and the control tower both dispatch through this module.
//!
//! # Usage
//!
//! ```
//! use u_jobshop::dispatching::{RuleEngine, TieBreaker};
//! use u_jobshop::dispatching::rules;
//!
//! let engine = RuleEngine::new()
//!     .with_rule(rules::Edd)
//!     .with_tie_breaker(rules::Spt)
//!     .with_final_tie_breaker(TieBreaker::ById);
//! ```
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 4
//! - Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

mod context;
mod engine;
pub mod rules;

pub use context::DecisionContext;
pub use engine::{EvaluationMode, RuleEngine, TieBreaker};

use crate::sim::Candidate;
use std::fmt::Debug;

/// Score returned by a dispatching rule.
///
/// Lower scores = higher priority (dispatched first).
pub type RuleScore = f64;

/// A dispatching rule that scores candidate actions.
///
/// # Score Convention
/// **Lower score = higher priority.**
///
/// # Reference
/// Pinedo (2016), "Scheduling", Ch. 4: Priority Dispatching
pub trait DispatchingRule: Send + Sync + Debug {
    /// Rule name (e.g., "SPT", "EDD").
    fn name(&self) -> &'static str;

    /// Scores one candidate at the current decision point.
    fn evaluate(&self, candidate: &Candidate, context: &DecisionContext) -> RuleScore;

    /// Rule description.
    fn description(&self) -> &'static str {
        self.name()
    }
}
