//! Greedy completion with a dispatching policy.

use super::RolloutPolicy;
use crate::dispatching::{rules, DecisionContext, RuleEngine, TieBreaker};
use crate::error::SchedulingError;
use crate::sim::{Candidate, SimulationState, Simulator};

/// Rule engine implementing a rollout policy.
///
/// Every policy falls back to ECT, then to action order.
pub fn policy_engine(policy: RolloutPolicy) -> RuleEngine {
    let engine = match policy {
        RolloutPolicy::Ect => RuleEngine::new().with_rule(rules::Ect).with_tie_breaker(rules::Spt),
        RolloutPolicy::Spt => RuleEngine::new().with_rule(rules::Spt).with_tie_breaker(rules::Ect),
        RolloutPolicy::Atc => RuleEngine::new()
            .with_rule(rules::Atc::default())
            .with_tie_breaker(rules::Ect),
        RolloutPolicy::Edd => RuleEngine::new().with_rule(rules::Edd).with_tie_breaker(rules::Ect),
    };
    engine.with_final_tie_breaker(TieBreaker::ById)
}

/// Completes `state` by always applying the engine's best legal action.
///
/// Returns the makespan reached.
///
/// # Errors
/// [`SchedulingError::Stalled`] if the state cannot be completed.
pub fn greedy_complete(
    sim: &Simulator,
    state: &mut SimulationState,
    engine: &RuleEngine,
) -> Result<i64, SchedulingError> {
    loop {
        let actions = sim.settle(state)?;
        if actions.is_empty() {
            return Ok(state.completed_makespan_ms());
        }
        let candidates: Vec<Candidate> = actions
            .into_iter()
            .map(|a| sim.candidate(state, a))
            .collect();
        let context = DecisionContext::for_candidates(state.clock_ms(), &candidates);
        let Some(best) = engine.select_best(&candidates, &context) else {
            continue;
        };
        sim.apply(state, &candidates[best].action)?;
    }
}
