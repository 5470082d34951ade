//! Rule engine for multi-criteria dispatching.
//!
//! Composes multiple dispatching rules with configurable evaluation modes
//! and tie-breaking strategies.
//!
//! # Reference
//! Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

use std::cmp::Ordering;
use std::sync::Arc;

use super::{DecisionContext, DispatchingRule, RuleScore};
use crate::sim::Candidate;

/// How multiple rules are combined.
#[derive(Debug, Clone, Default)]
pub enum EvaluationMode {
    /// Apply rules in sequence; use next rule only on ties.
    #[default]
    Sequential,
    /// Compute weighted sum of all rule scores.
    Weighted,
}

/// How ties are broken after all rules are exhausted.
#[derive(Debug, Clone, Default)]
pub enum TieBreaker {
    /// Keep input order (stable sort).
    #[default]
    NextRule,
    /// Deterministic by action: (operation id, machine id, position).
    ById,
}

#[derive(Clone)]
struct WeightedRule {
    rule: Arc<dyn DispatchingRule>,
    weight: f64,
}

/// A composable rule engine for candidate prioritization.
///
/// Supports sequential multi-layer evaluation (primary rule → tie-breaker)
/// and weighted combination modes.
#[derive(Clone)]
pub struct RuleEngine {
    rules: Vec<WeightedRule>,
    mode: EvaluationMode,
    tie_breaker: TieBreaker,
    epsilon: f64,
}

impl RuleEngine {
    /// Creates an empty rule engine.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            mode: EvaluationMode::Sequential,
            tie_breaker: TieBreaker::NextRule,
            epsilon: 1e-9,
        }
    }

    fn push<R: DispatchingRule + 'static>(mut self, rule: R, weight: f64) -> Self {
        self.rules.push(WeightedRule {
            rule: Arc::new(rule),
            weight,
        });
        self
    }

    /// Adds a primary rule (weight 1.0).
    pub fn with_rule<R: DispatchingRule + 'static>(self, rule: R) -> Self {
        self.push(rule, 1.0)
    }

    /// Adds a weighted rule.
    pub fn with_weighted_rule<R: DispatchingRule + 'static>(self, rule: R, weight: f64) -> Self {
        self.push(rule, weight)
    }

    /// Adds a tie-breaking rule (weight 0.0, used only in Sequential mode).
    pub fn with_tie_breaker<R: DispatchingRule + 'static>(self, rule: R) -> Self {
        self.push(rule, 0.0)
    }

    /// Sets the evaluation mode.
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the final tie-breaking strategy.
    pub fn with_final_tie_breaker(mut self, tie_breaker: TieBreaker) -> Self {
        self.tie_breaker = tie_breaker;
        self
    }

    /// Names of the configured rules, in evaluation order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|wr| wr.rule.name()).collect()
    }

    /// Candidate indices, highest priority first.
    ///
    /// Every rule is evaluated once per candidate. Keys are compared
    /// exactly (`total_cmp`), since an epsilon tolerance is not transitive;
    /// NaN scores sort last.
    pub fn sort_indices(&self, candidates: &[Candidate], context: &DecisionContext) -> Vec<usize> {
        let keys: Vec<Vec<RuleScore>> = candidates.iter().map(|c| self.key(c, context)).collect();
        let mut indices: Vec<usize> = (0..candidates.len()).collect();
        indices.sort_by(|&a, &b| {
            compare_keys_exact(&keys[a], &keys[b])
                .then_with(|| self.final_tie(&candidates[a], &candidates[b]))
        });
        indices
    }

    /// Index of the highest-priority candidate.
    ///
    /// On a complete tie the earliest candidate wins.
    pub fn select_best(&self, candidates: &[Candidate], context: &DecisionContext) -> Option<usize> {
        let mut iter = candidates.iter().enumerate();
        let (_, first) = iter.next()?;
        let mut best = (0, self.key(first, context));
        for (i, c) in iter {
            let key = self.key(c, context);
            let order = self
                .compare_keys(&key, &best.1)
                .then_with(|| self.final_tie(c, &candidates[best.0]));
            if order == Ordering::Less {
                best = (i, key);
            }
        }
        Some(best.0)
    }

    /// Weighted score of each rule for one candidate.
    pub fn evaluate(&self, candidate: &Candidate, context: &DecisionContext) -> Vec<RuleScore> {
        self.rules
            .iter()
            .map(|wr| wr.rule.evaluate(candidate, context) * wr.weight)
            .collect()
    }

    /// Score of the primary rule (or the weighted sum in Weighted mode).
    pub fn primary_score(&self, candidate: &Candidate, context: &DecisionContext) -> RuleScore {
        match self.mode {
            EvaluationMode::Weighted => self.evaluate(candidate, context).iter().sum(),
            EvaluationMode::Sequential => self
                .rules
                .first()
                .map_or(0.0, |wr| wr.rule.evaluate(candidate, context)),
        }
    }

    /// Sort key: raw scores per rule, or the single weighted sum.
    fn key(&self, candidate: &Candidate, context: &DecisionContext) -> Vec<RuleScore> {
        match self.mode {
            EvaluationMode::Sequential => self
                .rules
                .iter()
                .map(|wr| wr.rule.evaluate(candidate, context))
                .collect(),
            EvaluationMode::Weighted => vec![self.primary_score(candidate, context)],
        }
    }

    /// Lexicographic with epsilon; NaN compares equal.
    fn compare_keys(&self, a: &[RuleScore], b: &[RuleScore]) -> Ordering {
        a.iter()
            .zip(b)
            .find(|(x, y)| (*x - *y).abs() > self.epsilon)
            .map_or(Ordering::Equal, |(x, y)| x.partial_cmp(y).unwrap_or(Ordering::Equal))
    }

    fn final_tie(&self, a: &Candidate, b: &Candidate) -> Ordering {
        match self.tie_breaker {
            TieBreaker::NextRule => Ordering::Equal,
            TieBreaker::ById => a.action.cmp(&b.action),
        }
    }
}

fn compare_keys_exact(a: &[RuleScore], b: &[RuleScore]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field(
                "rules",
                &self
                    .rules
                    .iter()
                    .map(|r| format!("{}(w={})", r.rule.name(), r.weight))
                    .collect::<Vec<_>>(),
            )
            .field("mode", &self.mode)
            .field("tie_breaker", &self.tie_breaker)
            .finish()
    }
}
