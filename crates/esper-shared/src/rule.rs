//! Declarative rule model.
//!
//! A rule names a known enrollment failure pattern: the conditions that must
//! hold over a session's event history, the confidence model, and the
//! operator-facing explanation. Rules are read-only inputs to the engine;
//! authoring and tenant merging happen outside it.

use crate::factor::ConfidenceFactor;
use serde::{Deserialize, Serialize};

/// Default confidence threshold when a rule document omits one
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Descriptive only; both kinds evaluate identically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    #[default]
    Single,
    Correlation,
}

/// Where a condition draws its evidence from.
///
/// Closed set: adding a source is a compile-time extension, with one
/// evaluator per variant in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSource {
    #[default]
    EventType,
    EventData,
    EventCount,
    PhaseDuration,
    AppInstallDuration,
    EventCorrelation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Contains,
    Regex,
    Gt,
    Lt,
    Gte,
    Lte,
    Exists,
    CountGte,
}

/// One testable predicate over the event stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Label for the evidence bucket this condition fills
    pub signal: String,
    pub source: ConditionSource,
    /// Type to match, or the "event A" type for correlation
    pub event_type: Option<String>,
    /// Payload key; dot-paths are literal keys in the flattened payload
    pub data_field: Option<String>,
    pub operator: Option<ConditionOperator>,
    /// Comparison literal
    pub value: Option<String>,
    /// A required condition that does not match vetoes the whole rule
    #[serde(default)]
    pub required: bool,
    /// Correlation: the "event B" type
    pub correlate_event_type: Option<String>,
    /// Correlation: payload key that must match between A and B
    pub join_field: Option<String>,
    /// Correlation: max gap between A and B in either direction; 0 = unbounded
    #[serde(default)]
    pub time_window_seconds: i64,
    /// Correlation: independent filter on event A
    pub event_a_filter_field: Option<String>,
    pub event_a_filter_operator: Option<ConditionOperator>,
    pub event_a_filter_value: Option<String>,
}

/// Declarative failure pattern definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    /// Unique, stable identifier
    pub rule_id: String,
    pub title: String,
    pub severity: RuleSeverity,
    pub category: String,
    #[serde(default)]
    pub trigger: TriggerKind,
    pub conditions: Vec<Condition>,
    /// Starting confidence, 0-100
    pub base_confidence: u8,
    #[serde(default)]
    pub confidence_factors: Vec<ConfidenceFactor>,
    #[serde(default = "default_threshold")]
    pub confidence_threshold: u8,
    /// Human-readable diagnosis shown when the rule fires
    pub explanation: String,
    #[serde(default)]
    pub remediation_steps: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_threshold() -> u8 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_enabled() -> bool {
    true
}

impl RuleDefinition {
    /// Structural problems a rule author should fix. The engine itself
    /// treats all of these as non-matches rather than errors.
    pub fn lint(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.conditions.is_empty() {
            problems.push("rule has no conditions".to_string());
        }
        if self.base_confidence > 100 {
            problems.push(format!(
                "baseConfidence {} exceeds 100",
                self.base_confidence
            ));
        }
        if self.confidence_threshold > 100 {
            problems.push(format!(
                "confidenceThreshold {} exceeds 100",
                self.confidence_threshold
            ));
        }

        for (i, cond) in self.conditions.iter().enumerate() {
            let at = |msg: String| format!("condition {} ({}): {}", i, cond.signal, msg);
            match cond.source {
                ConditionSource::EventType | ConditionSource::EventData => {
                    if cond.event_type.is_none() && cond.source == ConditionSource::EventType {
                        problems.push(at("eventType is missing".to_string()));
                    }
                }
                ConditionSource::EventCount => {
                    if cond.event_type.is_none() {
                        problems.push(at("eventType is missing".to_string()));
                    }
                    if cond.operator != Some(ConditionOperator::CountGte) {
                        problems.push(at("event_count only supports count_gte".to_string()));
                    }
                    if cond
                        .value
                        .as_deref()
                        .map_or(true, |v| v.trim().parse::<usize>().is_err())
                    {
                        problems.push(at("value is not a whole number".to_string()));
                    }
                }
                ConditionSource::PhaseDuration => {
                    if cond.value.is_none() {
                        problems.push(at("value (target phase name) is missing".to_string()));
                    }
                }
                ConditionSource::AppInstallDuration => {
                    if cond.operator.is_none() || cond.value.is_none() {
                        problems.push(at("operator and value are required".to_string()));
                    }
                }
                ConditionSource::EventCorrelation => {
                    if cond.event_type.is_none() {
                        problems.push(at("eventType (event A) is missing".to_string()));
                    }
                    if cond.correlate_event_type.is_none() {
                        problems.push(at("correlateEventType is missing".to_string()));
                    }
                    if cond.join_field.is_none() {
                        problems.push(at("joinField is missing".to_string()));
                    }
                }
            }
        }

        for factor in &self.confidence_factors {
            if let crate::factor::FactorExpr::Unsupported(raw) = &factor.condition {
                problems.push(format!(
                    "factor {}: unsupported expression {:?} (never satisfied)",
                    factor.signal, raw
                ));
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_document_defaults() {
        let raw = r#"{
            "ruleId": "app-install-failure",
            "title": "App install failed",
            "severity": "high",
            "category": "apps",
            "conditions": [
                {"signal": "failure", "source": "event_type", "eventType": "app_install_failed", "required": true}
            ],
            "baseConfidence": 80,
            "explanation": "An app failed to install."
        }"#;
        let rule: RuleDefinition = serde_json::from_str(raw).unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(rule.trigger, TriggerKind::Single);
        assert!(rule.confidence_factors.is_empty());
        assert!(rule.conditions[0].required);
        assert_eq!(rule.conditions[0].time_window_seconds, 0);
        assert!(rule.lint().is_empty());
    }

    #[test]
    fn test_lint_flags_correlation_without_join() {
        let raw = r#"{
            "ruleId": "bad",
            "title": "Bad",
            "severity": "low",
            "category": "test",
            "conditions": [
                {"signal": "pair", "source": "event_correlation", "eventType": "a"}
            ],
            "baseConfidence": 50,
            "explanation": "x"
        }"#;
        let rule: RuleDefinition = serde_json::from_str(raw).unwrap();
        let problems = rule.lint();
        assert!(problems.iter().any(|p| p.contains("correlateEventType")));
        assert!(problems.iter().any(|p| p.contains("joinField")));
    }

    #[test]
    fn test_lint_flags_bad_count_condition() {
        let raw = r#"{
            "ruleId": "bad-count",
            "title": "Bad count",
            "severity": "low",
            "category": "test",
            "conditions": [
                {"signal": "n", "source": "event_count", "eventType": "x", "operator": "gte", "value": "many"}
            ],
            "baseConfidence": 50,
            "explanation": "x"
        }"#;
        let rule: RuleDefinition = serde_json::from_str(raw).unwrap();
        let problems = rule.lint();
        assert!(problems.iter().any(|p| p.contains("count_gte")));
        assert!(problems.iter().any(|p| p.contains("whole number")));
    }
}
