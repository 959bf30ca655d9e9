//! Built-in rule library.
//!
//! Shipped defaults for the most common enrollment failure patterns, used
//! when no rule directory is configured. Tenants override or extend these
//! through the file-backed rule repository.

use crate::event::{APP_INSTALL_FAILED, PHASE_CHANGE_EVENT_TYPE};
use crate::factor::{ConfidenceFactor, FactorExpr};
use crate::rule::{
    Condition, ConditionOperator, ConditionSource, RuleDefinition, RuleSeverity, TriggerKind,
};

/// The built-in rule set, in evaluation order
pub fn builtin_rules() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition {
            rule_id: "policy-blocked-enrollment".to_string(),
            title: "Enrollment blocked by MDM policy".to_string(),
            severity: RuleSeverity::Critical,
            category: "policy".to_string(),
            trigger: TriggerKind::Single,
            conditions: vec![Condition {
                signal: "policy_error".to_string(),
                source: ConditionSource::EventData,
                event_type: Some("enrollment_error".to_string()),
                data_field: Some("errorCode".to_string()),
                operator: Some(ConditionOperator::Regex),
                value: Some("0x8018001[48]".to_string()),
                required: true,
                ..Condition::default()
            }],
            base_confidence: 85,
            confidence_factors: vec![],
            confidence_threshold: 40,
            explanation: "The management service rejected this device's enrollment. \
                          This error code family indicates a licensing or enrollment \
                          restriction policy, not a device-side fault."
                .to_string(),
            remediation_steps: vec![
                "Verify the enrolling user has an MDM license assigned".to_string(),
                "Check the tenant's device enrollment restrictions".to_string(),
            ],
            enabled: true,
        },
        RuleDefinition {
            rule_id: "app-install-failure".to_string(),
            title: "Required app failed to install".to_string(),
            severity: RuleSeverity::High,
            category: "apps".to_string(),
            trigger: TriggerKind::Single,
            conditions: vec![Condition {
                signal: "install_failure".to_string(),
                source: ConditionSource::EventType,
                event_type: Some(APP_INSTALL_FAILED.to_string()),
                required: true,
                ..Condition::default()
            }],
            base_confidence: 70,
            confidence_factors: vec![ConfidenceFactor {
                signal: APP_INSTALL_FAILED.to_string(),
                condition: FactorExpr::CountGte(2),
                weight: 15,
            }],
            confidence_threshold: 40,
            explanation: "At least one required app reported an install failure during \
                          enrollment. Repeated failures raise confidence that the app, \
                          not transient conditions, is the blocker."
                .to_string(),
            remediation_steps: vec![
                "Check the failing app's install logs on the device".to_string(),
                "Confirm the app package is valid for this platform and architecture"
                    .to_string(),
            ],
            enabled: true,
        },
        RuleDefinition {
            rule_id: "low-disk-install-failures".to_string(),
            title: "App installs failing on low disk space".to_string(),
            severity: RuleSeverity::High,
            category: "storage".to_string(),
            trigger: TriggerKind::Correlation,
            conditions: vec![Condition {
                signal: "failure_with_low_disk".to_string(),
                source: ConditionSource::EventCorrelation,
                event_type: Some(APP_INSTALL_FAILED.to_string()),
                correlate_event_type: Some("performance_snapshot".to_string()),
                join_field: Some("appId".to_string()),
                time_window_seconds: 300,
                data_field: Some("disk_free_gb".to_string()),
                operator: Some(ConditionOperator::Lt),
                value: Some("10".to_string()),
                required: true,
                ..Condition::default()
            }],
            base_confidence: 60,
            confidence_factors: vec![ConfidenceFactor {
                signal: APP_INSTALL_FAILED.to_string(),
                condition: FactorExpr::CountGte(2),
                weight: 20,
            }],
            confidence_threshold: 50,
            explanation: "An app install failed while a performance snapshot taken near \
                          the failure showed less than 10 GB of free disk. The installs \
                          are most likely failing for lack of space."
                .to_string(),
            remediation_steps: vec![
                "Free disk space or provision devices with larger storage".to_string(),
                "Reduce the set of apps required during enrollment".to_string(),
            ],
            enabled: true,
        },
        RuleDefinition {
            rule_id: "device-setup-stall".to_string(),
            title: "Device setup phase is stalled".to_string(),
            severity: RuleSeverity::Medium,
            category: "esp".to_string(),
            trigger: TriggerKind::Single,
            conditions: vec![Condition {
                signal: "device_setup_phase".to_string(),
                source: ConditionSource::PhaseDuration,
                event_type: Some(PHASE_CHANGE_EVENT_TYPE.to_string()),
                value: Some("DeviceSetup".to_string()),
                required: true,
                ..Condition::default()
            }],
            base_confidence: 50,
            confidence_factors: vec![ConfidenceFactor {
                signal: "long_device_setup".to_string(),
                condition: FactorExpr::PhaseDurationGt(1800),
                weight: 40,
            }],
            confidence_threshold: 70,
            explanation: "The session entered the device setup phase and stayed there \
                          past the expected duration. Something in device preparation \
                          (apps, policies, certificates) is not completing."
                .to_string(),
            remediation_steps: vec![
                "Review which app or policy the enrollment status page is waiting on"
                    .to_string(),
            ],
            enabled: true,
        },
        RuleDefinition {
            rule_id: "account-setup-stall".to_string(),
            title: "Account setup phase is stalled".to_string(),
            severity: RuleSeverity::Medium,
            category: "esp".to_string(),
            trigger: TriggerKind::Single,
            conditions: vec![Condition {
                signal: "account_setup_phase".to_string(),
                source: ConditionSource::PhaseDuration,
                event_type: Some(PHASE_CHANGE_EVENT_TYPE.to_string()),
                value: Some("AccountSetup".to_string()),
                required: true,
                ..Condition::default()
            }],
            base_confidence: 45,
            confidence_factors: vec![ConfidenceFactor {
                signal: "long_account_setup".to_string(),
                condition: FactorExpr::PhaseDurationGt(2400),
                weight: 35,
            }],
            confidence_threshold: 70,
            explanation: "The session is stuck applying user-targeted configuration. \
                          User-scoped apps or policies are not completing."
                .to_string(),
            remediation_steps: vec![
                "Check user-targeted app assignments for this enrollment profile"
                    .to_string(),
            ],
            enabled: true,
        },
        RuleDefinition {
            rule_id: "network-flap-during-enrollment".to_string(),
            title: "Unstable network during enrollment".to_string(),
            severity: RuleSeverity::Medium,
            category: "network".to_string(),
            trigger: TriggerKind::Single,
            conditions: vec![
                Condition {
                    signal: "disconnects".to_string(),
                    source: ConditionSource::EventCount,
                    event_type: Some("network_disconnected".to_string()),
                    operator: Some(ConditionOperator::CountGte),
                    value: Some("3".to_string()),
                    required: true,
                    ..Condition::default()
                },
                Condition {
                    signal: "dns_failure".to_string(),
                    source: ConditionSource::EventType,
                    event_type: Some("dns_resolution_failed".to_string()),
                    required: false,
                    ..Condition::default()
                },
            ],
            base_confidence: 55,
            confidence_factors: vec![
                ConfidenceFactor {
                    signal: "dns_failure".to_string(),
                    condition: FactorExpr::Exists,
                    weight: 15,
                },
                ConfidenceFactor {
                    signal: "network_disconnected".to_string(),
                    condition: FactorExpr::CountGte(6),
                    weight: 10,
                },
            ],
            confidence_threshold: 50,
            explanation: "The device repeatedly lost network connectivity while \
                          enrolling. Content downloads and policy check-ins cannot \
                          complete on a flapping link."
                .to_string(),
            remediation_steps: vec![
                "Move the device to a wired or stable wireless network".to_string(),
                "Check proxy and captive-portal interference".to_string(),
            ],
            enabled: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_rules_lint_clean() {
        for rule in builtin_rules() {
            let problems = rule.lint();
            assert!(
                problems.is_empty(),
                "rule {} has problems: {:?}",
                rule.rule_id,
                problems
            );
        }
    }

    #[test]
    fn test_builtin_rule_ids_unique() {
        let rules = builtin_rules();
        let ids: HashSet<&str> = rules.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids.len(), rules.len());
    }

    #[test]
    fn test_builtin_rules_survive_serde() {
        for rule in builtin_rules() {
            let json = serde_json::to_string(&rule).unwrap();
            let back: RuleDefinition = serde_json::from_str(&json).unwrap();
            assert_eq!(back.rule_id, rule.rule_id);
            assert_eq!(back.conditions.len(), rule.conditions.len());
            assert_eq!(back.confidence_factors, rule.confidence_factors);
        }
    }
}
