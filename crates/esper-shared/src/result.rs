//! The durable output of a fired rule: a diagnosis with evidence.

use crate::evidence::Evidence;
use crate::rule::{RuleDefinition, RuleSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One diagnosis for one session. At most one exists per
/// `(tenant, session, ruleId)`; it is created when the rule fires and never
/// mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub tenant_id: String,
    pub session_id: String,
    pub rule_id: String,
    pub rule_title: String,
    pub severity: RuleSeverity,
    pub category: String,
    /// Clamped to 0-100
    pub confidence_score: u8,
    pub explanation: String,
    pub remediation_steps: Vec<String>,
    /// Signal → structured evidence for every matched condition and every
    /// contributing factor. BTreeMap keeps serialization deterministic.
    pub matched_conditions: BTreeMap<String, Evidence>,
    pub detected_at: DateTime<Utc>,
}

impl RuleResult {
    pub fn new(
        tenant_id: &str,
        session_id: &str,
        rule: &RuleDefinition,
        confidence_score: u8,
        matched_conditions: BTreeMap<String, Evidence>,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            rule_id: rule.rule_id.clone(),
            rule_title: rule.title.clone(),
            severity: rule.severity,
            category: rule.category.clone(),
            confidence_score,
            explanation: rule.explanation.clone(),
            remediation_steps: rule.remediation_steps.clone(),
            matched_conditions,
            detected_at,
        }
    }
}
