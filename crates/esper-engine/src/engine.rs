//! Session analysis orchestrator.
//!
//! Loads the session's events and the tenant's rules once, evaluates every
//! not-yet-evaluated rule in rule-list order, and records fired diagnoses.
//! Invoking analysis again on an unchanged session adds nothing: the result
//! store is consulted fresh on every invocation.

use crate::conditions::{evaluate_condition, EvalContext};
use crate::repo::{EventRepository, ResultStore, RuleRepository};
use crate::score::score_rule;
use chrono::{DateTime, Utc};
use esper_shared::error::EsperError;
use esper_shared::evidence::Evidence;
use esper_shared::result::RuleResult;
use esper_shared::rule::RuleDefinition;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Hard failures: the engine never substitutes defaults for missing inputs.
/// Per-rule evaluation faults are not errors; they are logged and skipped.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("loading rules failed: {0}")]
    Rules(#[source] EsperError),

    #[error("loading events failed: {0}")]
    Events(#[source] EsperError),

    #[error("result store failed: {0}")]
    Store(#[source] EsperError),
}

pub struct RuleEngine {
    rules: Arc<dyn RuleRepository>,
    events: Arc<dyn EventRepository>,
    results: Arc<dyn ResultStore>,
}

impl RuleEngine {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        events: Arc<dyn EventRepository>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            rules,
            events,
            results,
        }
    }

    /// Analyze one session against the tenant's active rule set.
    ///
    /// Returns the rules fired by THIS invocation, highest confidence first.
    /// Rules with an already-stored result are skipped entirely.
    pub fn analyze_session(
        &self,
        tenant: &str,
        session: &str,
    ) -> Result<Vec<RuleResult>, EngineError> {
        let events = self
            .events
            .session_events(tenant, session)
            .map_err(EngineError::Events)?;
        if events.is_empty() {
            debug!(tenant, session, "no events; skipping analysis");
            return Ok(Vec::new());
        }

        let rules = self.rules.active_rules(tenant).map_err(EngineError::Rules)?;
        let evaluated = self
            .results
            .evaluated_rule_ids(tenant, session)
            .map_err(EngineError::Store)?;

        let now = Utc::now();
        let ctx = EvalContext {
            events: &events,
            now,
        };

        let mut fired = Vec::new();
        for rule in rules.iter().filter(|r| r.enabled) {
            if evaluated.contains(&rule.rule_id) {
                debug!(tenant, session, rule_id = %rule.rule_id, "already evaluated");
                continue;
            }

            // A fault in one rule must not abort the remaining rules
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                evaluate_rule(rule, &ctx, tenant, session, now)
            }));
            match outcome {
                Ok(Some(result)) => {
                    self.results.record(&result).map_err(EngineError::Store)?;
                    debug!(
                        tenant,
                        session,
                        rule_id = %rule.rule_id,
                        confidence = result.confidence_score,
                        "rule fired"
                    );
                    fired.push(result);
                }
                Ok(None) => {}
                Err(_) => {
                    warn!(tenant, session, rule_id = %rule.rule_id, "rule evaluation panicked; skipping");
                }
            }
        }

        // Stable sort: rule-list order breaks confidence ties
        fired.sort_by(|a, b| b.confidence_score.cmp(&a.confidence_score));
        info!(
            tenant,
            session,
            events = events.len(),
            rules = rules.len(),
            fired = fired.len(),
            "session analysis complete"
        );
        Ok(fired)
    }
}

/// Evaluate a single rule. Short-circuits on the first unmatched required
/// condition; optional conditions that do not match simply contribute no
/// evidence.
fn evaluate_rule(
    rule: &RuleDefinition,
    ctx: &EvalContext,
    tenant: &str,
    session: &str,
    now: DateTime<Utc>,
) -> Option<RuleResult> {
    let mut matched: BTreeMap<String, Evidence> = BTreeMap::new();

    for cond in &rule.conditions {
        let eval = evaluate_condition(cond, ctx);
        if eval.matched {
            if let Some(evidence) = eval.evidence {
                matched.insert(cond.signal.clone(), evidence);
            }
        } else if cond.required {
            debug!(
                rule_id = %rule.rule_id,
                signal = %cond.signal,
                "required condition unmatched"
            );
            return None;
        }
    }

    let outcome = score_rule(rule, &matched, ctx.events);
    if outcome.score < rule.confidence_threshold {
        debug!(
            rule_id = %rule.rule_id,
            score = outcome.score,
            threshold = rule.confidence_threshold,
            "below confidence threshold"
        );
        return None;
    }

    // Satisfied factors become evidence too; a factor never displaces a
    // condition's evidence under the same signal
    for factor in outcome.breakdown.iter().filter(|f| f.satisfied) {
        matched
            .entry(factor.signal.clone())
            .or_insert_with(|| Evidence::Factor {
                expression: factor.expression.clone(),
                weight: factor.weight,
            });
    }

    Some(RuleResult::new(
        tenant,
        session,
        rule,
        outcome.score,
        matched,
        now,
    ))
}
