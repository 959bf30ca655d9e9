//! Confidence scoring.
//!
//! Pure function: base confidence plus the weight of every satisfied
//! confidence factor, clamped to [0, 100]. Golden tests lock exact scores.

use esper_shared::event::Event;
use esper_shared::evidence::Evidence;
use esper_shared::factor::FactorExpr;
use esper_shared::rule::RuleDefinition;
use std::collections::BTreeMap;

/// One factor's contribution, satisfied or not, for explainability
#[derive(Debug, Clone)]
pub struct FactorOutcome {
    pub signal: String,
    pub expression: String,
    pub weight: i8,
    pub satisfied: bool,
}

#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    /// Final score, clamped to 0-100
    pub score: u8,
    pub breakdown: Vec<FactorOutcome>,
}

/// `Score(rule, matchedEvidence, events)`
pub fn score_rule(
    rule: &RuleDefinition,
    matched: &BTreeMap<String, Evidence>,
    events: &[Event],
) -> ScoreOutcome {
    let mut score = i16::from(rule.base_confidence);
    let mut breakdown = Vec::with_capacity(rule.confidence_factors.len());

    for factor in &rule.confidence_factors {
        let satisfied = match &factor.condition {
            FactorExpr::Exists => matched.contains_key(&factor.signal),
            FactorExpr::CountGte(n) => {
                let count = events
                    .iter()
                    .filter(|e| e.type_matches(&factor.signal))
                    .count() as u64;
                count >= *n
            }
            FactorExpr::PhaseDurationGt(n) => matched
                .values()
                .any(|evidence| evidence.duration_seconds().is_some_and(|d| d > *n)),
            FactorExpr::Unsupported(_) => false,
        };

        if satisfied {
            score += i16::from(factor.weight);
        }
        breakdown.push(FactorOutcome {
            signal: factor.signal.clone(),
            expression: factor.condition.to_string(),
            weight: factor.weight,
            satisfied,
        });
    }

    ScoreOutcome {
        score: score.clamp(0, 100) as u8,
        breakdown,
    }
}
