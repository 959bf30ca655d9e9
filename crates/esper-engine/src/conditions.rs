//! Condition evaluation.
//!
//! One evaluator per `ConditionSource` variant. Every evaluator follows the
//! same contract: scan the session's events in document order and return the
//! FIRST satisfying occurrence as evidence. Rule authors write their
//! explanation text against first-match evidence; never "improve" it to
//! best-match or most-recent.
//!
//! Malformed conditions (missing fields, unsupported operators) are
//! non-matches, never errors.

use crate::matchers::matches_operator;
use chrono::{DateTime, Utc};
use esper_shared::event::{
    Event, APP_INSTALL_COMPLETED, APP_INSTALL_FAILED, APP_INSTALL_STARTED,
    PHASE_CHANGE_EVENT_TYPE, PHASE_FIELD,
};
use esper_shared::evidence::Evidence;
use esper_shared::rule::{Condition, ConditionOperator, ConditionSource};

/// Immutable snapshot a single analysis runs against. `now` is captured once
/// per analysis so open-ended phase durations are measured consistently (and
/// injectable in tests).
pub struct EvalContext<'a> {
    pub events: &'a [Event],
    pub now: DateTime<Utc>,
}

/// Outcome of evaluating one condition
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub matched: bool,
    /// Present on every match; `event_count` also returns its running count
    /// on non-match, for factor scoring and debugging.
    pub evidence: Option<Evidence>,
}

impl Evaluation {
    fn no_match() -> Self {
        Self {
            matched: false,
            evidence: None,
        }
    }

    fn matched(evidence: Evidence) -> Self {
        Self {
            matched: true,
            evidence: Some(evidence),
        }
    }
}

/// `Evaluate(condition, events) -> (matched, evidence)`
pub fn evaluate_condition(cond: &Condition, ctx: &EvalContext) -> Evaluation {
    match cond.source {
        ConditionSource::EventType => eval_event_type(cond, ctx),
        ConditionSource::EventData => eval_event_data(cond, ctx),
        ConditionSource::EventCount => eval_event_count(cond, ctx),
        ConditionSource::PhaseDuration => eval_phase_duration(cond, ctx),
        ConditionSource::AppInstallDuration => eval_app_install_duration(cond, ctx),
        ConditionSource::EventCorrelation => eval_event_correlation(cond, ctx),
    }
}

/// Field comparison an evaluator applies to one event. A missing operator
/// degrades to an existence check on the field.
fn field_satisfies(event: &Event, field: &str, cond: &Condition) -> Option<String> {
    let value = event.data.get(field)?.render();
    let op = cond.operator.unwrap_or(ConditionOperator::Exists);
    let compare = cond.value.as_deref().unwrap_or("");
    if matches_operator(&value, op, compare) {
        Some(value)
    } else {
        None
    }
}

fn eval_event_type(cond: &Condition, ctx: &EvalContext) -> Evaluation {
    let Some(wanted) = cond.event_type.as_deref() else {
        return Evaluation::no_match();
    };
    let matching: Vec<&Event> = ctx
        .events
        .iter()
        .filter(|e| e.type_matches(wanted))
        .collect();
    if matching.is_empty() {
        return Evaluation::no_match();
    }

    match cond.data_field.as_deref() {
        // Field comparison: first matching event whose field satisfies it
        Some(field) => {
            for event in &matching {
                if let Some(value) = field_satisfies(event, field, cond) {
                    return Evaluation::matched(Evidence::Event {
                        event_id: event.id,
                        event_type: event.event_type.clone(),
                        timestamp: event.timestamp,
                        field: Some(field.to_string()),
                        value: Some(value),
                        match_count: matching.len(),
                    });
                }
            }
            Evaluation::no_match()
        }
        // Existence: the first matching event is the evidence
        None => {
            let first = matching[0];
            Evaluation::matched(Evidence::Event {
                event_id: first.id,
                event_type: first.event_type.clone(),
                timestamp: first.timestamp,
                field: None,
                value: None,
                match_count: matching.len(),
            })
        }
    }
}

fn eval_event_data(cond: &Condition, ctx: &EvalContext) -> Evaluation {
    let Some(field) = cond.data_field.as_deref() else {
        return Evaluation::no_match();
    };
    let candidates: Vec<&Event> = ctx
        .events
        .iter()
        .filter(|e| match cond.event_type.as_deref() {
            Some(t) => e.type_matches(t),
            None => true,
        })
        .collect();
    for event in &candidates {
        if let Some(value) = field_satisfies(event, field, cond) {
            return Evaluation::matched(Evidence::Event {
                event_id: event.id,
                event_type: event.event_type.clone(),
                timestamp: event.timestamp,
                field: Some(field.to_string()),
                value: Some(value),
                match_count: candidates.len(),
            });
        }
    }
    Evaluation::no_match()
}

fn eval_event_count(cond: &Condition, ctx: &EvalContext) -> Evaluation {
    let Some(wanted) = cond.event_type.as_deref() else {
        return Evaluation::no_match();
    };
    let matching: Vec<&Event> = ctx
        .events
        .iter()
        .filter(|e| e.type_matches(wanted))
        .collect();
    let count = matching.len();

    let threshold = match (cond.operator, cond.value.as_deref()) {
        (Some(ConditionOperator::CountGte), Some(value)) => value.trim().parse::<usize>().ok(),
        _ => None,
    };
    let matched = threshold.is_some_and(|n| count >= n);

    // The running count is evidence even on non-match
    Evaluation {
        matched,
        evidence: Some(Evidence::Count {
            event_type: wanted.to_string(),
            count,
            first_event_id: if matched {
                matching.first().map(|e| e.id)
            } else {
                None
            },
        }),
    }
}

fn eval_phase_duration(cond: &Condition, ctx: &EvalContext) -> Evaluation {
    let field = cond.data_field.as_deref().unwrap_or(PHASE_FIELD);
    let Some(target) = cond.value.as_deref() else {
        return Evaluation::no_match();
    };

    let phase_events: Vec<&Event> = ctx
        .events
        .iter()
        .filter(|e| e.type_matches(PHASE_CHANGE_EVENT_TYPE))
        .collect();

    for (i, event) in phase_events.iter().enumerate() {
        let Some(phase) = event.data.get(field) else {
            continue;
        };
        if !matches_operator(&phase.render(), ConditionOperator::Equals, target) {
            continue;
        }
        // Duration runs to the next phase change, or to "now" while the
        // phase is still open. The operator is NOT applied here; duration
        // thresholds belong to confidence factors.
        let (end, end_event_id) = match phase_events.get(i + 1) {
            Some(next) => (next.timestamp, Some(next.id)),
            None => (ctx.now, None),
        };
        let duration_seconds = (end - event.timestamp).num_seconds();
        return Evaluation::matched(Evidence::Duration {
            label: target.to_string(),
            start_event_id: event.id,
            end_event_id,
            duration_seconds,
        });
    }
    Evaluation::no_match()
}

fn eval_app_install_duration(cond: &Condition, ctx: &EvalContext) -> Evaluation {
    let (Some(op), Some(compare)) = (cond.operator, cond.value.as_deref()) else {
        return Evaluation::no_match();
    };

    let is_completion = |e: &Event| match cond.event_type.as_deref() {
        Some(t) => e.type_matches(t),
        None => e.type_matches(APP_INSTALL_COMPLETED) || e.type_matches(APP_INSTALL_FAILED),
    };

    for completion in ctx.events.iter().filter(|e| is_completion(e)) {
        let Some(app_key) = completion.app_key() else {
            continue;
        };
        // Latest start at or before the completion, same app
        let start = ctx
            .events
            .iter()
            .filter(|e| {
                e.type_matches(APP_INSTALL_STARTED)
                    && e.timestamp <= completion.timestamp
                    && e.app_key()
                        .is_some_and(|k| k.eq_ignore_ascii_case(&app_key))
            })
            .last();
        let Some(start) = start else {
            continue;
        };
        let duration_seconds = (completion.timestamp - start.timestamp).num_seconds().max(0);
        if matches_operator(&duration_seconds.to_string(), op, compare) {
            return Evaluation::matched(Evidence::Duration {
                label: app_key,
                start_event_id: start.id,
                end_event_id: Some(completion.id),
                duration_seconds,
            });
        }
    }
    Evaluation::no_match()
}

fn eval_event_correlation(cond: &Condition, ctx: &EvalContext) -> Evaluation {
    let (Some(a_type), Some(b_type), Some(join_field)) = (
        cond.event_type.as_deref(),
        cond.correlate_event_type.as_deref(),
        cond.join_field.as_deref(),
    ) else {
        return Evaluation::no_match();
    };

    let a_passes_filter = |event: &Event| -> bool {
        let Some(field) = cond.event_a_filter_field.as_deref() else {
            return true;
        };
        let Some(value) = event.data.get(field) else {
            return false;
        };
        let op = cond
            .event_a_filter_operator
            .unwrap_or(ConditionOperator::Exists);
        let compare = cond.event_a_filter_value.as_deref().unwrap_or("");
        matches_operator(&value.render(), op, compare)
    };

    // Nested join; runs once per session over a bounded event list
    for a in ctx
        .events
        .iter()
        .filter(|e| e.type_matches(a_type) && a_passes_filter(e))
    {
        let Some(join_a) = a.data.get(join_field).map(|v| v.render()) else {
            continue;
        };
        for b in ctx.events.iter().filter(|e| e.type_matches(b_type)) {
            if b.id == a.id {
                continue;
            }
            let Some(join_b) = b.data.get(join_field).map(|v| v.render()) else {
                continue;
            };
            if !join_a.eq_ignore_ascii_case(&join_b) {
                continue;
            }
            if let Some(field) = cond.data_field.as_deref() {
                if field_satisfies(b, field, cond).is_none() {
                    continue;
                }
            }
            let gap_seconds = (b.timestamp - a.timestamp).num_seconds();
            if cond.time_window_seconds > 0 && gap_seconds.abs() > cond.time_window_seconds {
                continue;
            }
            return Evaluation::matched(Evidence::Correlation {
                event_a_id: a.id,
                event_a_type: a.event_type.clone(),
                event_b_id: b.id,
                event_b_type: b.event_type.clone(),
                join_field: join_field.to_string(),
                join_value: join_a,
                gap_seconds,
            });
        }
    }
    Evaluation::no_match()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use esper_shared::rule::ConditionSource;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn ctx_at(events: &[Event], now_secs: i64) -> EvalContext<'_> {
        EvalContext {
            events,
            now: ts(now_secs),
        }
    }

    fn phase_event(secs: i64, seq: u64, phase: &str) -> Event {
        Event::new(PHASE_CHANGE_EVENT_TYPE, ts(secs), seq).with_data(PHASE_FIELD, phase)
    }

    #[test]
    fn test_event_type_existence_returns_first_with_count() {
        let events = vec![
            Event::new("app_install_failed", ts(10), 1).with_data("appId", "a"),
            Event::new("app_install_failed", ts(20), 2).with_data("appId", "b"),
        ];
        let cond = Condition {
            signal: "failure".to_string(),
            source: ConditionSource::EventType,
            event_type: Some("APP_INSTALL_FAILED".to_string()),
            ..Condition::default()
        };
        let eval = evaluate_condition(&cond, &ctx_at(&events, 100));
        assert!(eval.matched);
        match eval.evidence.unwrap() {
            Evidence::Event {
                event_id,
                match_count,
                ..
            } => {
                assert_eq!(event_id, events[0].id);
                assert_eq!(match_count, 2);
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_event_type_with_field_scans_in_document_order() {
        let events = vec![
            Event::new("enrollment_error", ts(10), 1).with_data("errorCode", "0x0"),
            Event::new("enrollment_error", ts(20), 2).with_data("errorCode", "0x80180014"),
        ];
        let cond = Condition {
            signal: "policy".to_string(),
            source: ConditionSource::EventType,
            event_type: Some("enrollment_error".to_string()),
            data_field: Some("errorCode".to_string()),
            operator: Some(ConditionOperator::Equals),
            value: Some("0x80180014".to_string()),
            ..Condition::default()
        };
        let eval = evaluate_condition(&cond, &ctx_at(&events, 100));
        assert!(eval.matched);
        match eval.evidence.unwrap() {
            Evidence::Event { event_id, value, .. } => {
                assert_eq!(event_id, events[1].id);
                assert_eq!(value.as_deref(), Some("0x80180014"));
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_event_count_returns_evidence_on_non_match() {
        let events = vec![
            Event::new("network_disconnected", ts(1), 1),
            Event::new("network_disconnected", ts(2), 2),
        ];
        let cond = Condition {
            signal: "disconnects".to_string(),
            source: ConditionSource::EventCount,
            event_type: Some("network_disconnected".to_string()),
            operator: Some(ConditionOperator::CountGte),
            value: Some("3".to_string()),
            ..Condition::default()
        };
        let eval = evaluate_condition(&cond, &ctx_at(&events, 100));
        assert!(!eval.matched);
        match eval.evidence.unwrap() {
            Evidence::Count {
                count,
                first_event_id,
                ..
            } => {
                assert_eq!(count, 2);
                assert!(first_event_id.is_none());
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_event_count_match_references_first_event() {
        let events = vec![
            Event::new("network_disconnected", ts(1), 1),
            Event::new("network_disconnected", ts(2), 2),
        ];
        let cond = Condition {
            signal: "disconnects".to_string(),
            source: ConditionSource::EventCount,
            event_type: Some("network_disconnected".to_string()),
            operator: Some(ConditionOperator::CountGte),
            value: Some("2".to_string()),
            ..Condition::default()
        };
        let eval = evaluate_condition(&cond, &ctx_at(&events, 100));
        assert!(eval.matched);
        match eval.evidence.unwrap() {
            Evidence::Count { first_event_id, .. } => {
                assert_eq!(first_event_id, Some(events[0].id));
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_event_count_rejects_other_operators() {
        let events = vec![Event::new("x", ts(1), 1)];
        let cond = Condition {
            signal: "n".to_string(),
            source: ConditionSource::EventCount,
            event_type: Some("x".to_string()),
            operator: Some(ConditionOperator::Gte),
            value: Some("1".to_string()),
            ..Condition::default()
        };
        assert!(!evaluate_condition(&cond, &ctx_at(&events, 100)).matched);
    }

    #[test]
    fn test_phase_duration_closed_by_next_phase_event() {
        let events = vec![
            phase_event(0, 1, "DevicePreparation"),
            phase_event(100, 2, "DeviceSetup"),
            phase_event(700, 3, "AccountSetup"),
        ];
        let cond = Condition {
            signal: "setup".to_string(),
            source: ConditionSource::PhaseDuration,
            value: Some("DeviceSetup".to_string()),
            ..Condition::default()
        };
        let eval = evaluate_condition(&cond, &ctx_at(&events, 10_000));
        assert!(eval.matched);
        match eval.evidence.unwrap() {
            Evidence::Duration {
                duration_seconds,
                end_event_id,
                ..
            } => {
                assert_eq!(duration_seconds, 600);
                assert_eq!(end_event_id, Some(events[2].id));
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_phase_duration_open_phase_measured_to_now() {
        let events = vec![phase_event(0, 1, "DeviceSetup")];
        let cond = Condition {
            signal: "setup".to_string(),
            source: ConditionSource::PhaseDuration,
            value: Some("DeviceSetup".to_string()),
            ..Condition::default()
        };
        let eval = evaluate_condition(&cond, &ctx_at(&events, 2000));
        assert!(eval.matched);
        let duration = eval.evidence.unwrap().duration_seconds().unwrap();
        assert_eq!(duration, 2000);
    }

    #[test]
    fn test_phase_duration_unobserved_phase_is_no_match() {
        let events = vec![phase_event(0, 1, "DevicePreparation")];
        let cond = Condition {
            signal: "setup".to_string(),
            source: ConditionSource::PhaseDuration,
            value: Some("DeviceSetup".to_string()),
            ..Condition::default()
        };
        assert!(!evaluate_condition(&cond, &ctx_at(&events, 2000)).matched);
    }

    #[test]
    fn test_app_install_duration_pairs_latest_start() {
        let events = vec![
            Event::new(APP_INSTALL_STARTED, ts(0), 1).with_data("appId", "vpn"),
            // retry of the same app: this is the start that counts
            Event::new(APP_INSTALL_STARTED, ts(300), 2).with_data("appId", "vpn"),
            Event::new(APP_INSTALL_COMPLETED, ts(400), 3).with_data("appId", "vpn"),
        ];
        let cond = Condition {
            signal: "slow_install".to_string(),
            source: ConditionSource::AppInstallDuration,
            operator: Some(ConditionOperator::Gte),
            value: Some("60".to_string()),
            ..Condition::default()
        };
        let eval = evaluate_condition(&cond, &ctx_at(&events, 1000));
        assert!(eval.matched);
        match eval.evidence.unwrap() {
            Evidence::Duration {
                duration_seconds,
                start_event_id,
                end_event_id,
                label,
            } => {
                assert_eq!(duration_seconds, 100);
                assert_eq!(start_event_id, events[1].id);
                assert_eq!(end_event_id, Some(events[2].id));
                assert_eq!(label, "vpn");
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_app_install_duration_ignores_other_apps_starts() {
        let events = vec![
            Event::new(APP_INSTALL_STARTED, ts(0), 1).with_data("appId", "other"),
            Event::new(APP_INSTALL_FAILED, ts(50), 2).with_data("appId", "vpn"),
        ];
        let cond = Condition {
            signal: "slow_install".to_string(),
            source: ConditionSource::AppInstallDuration,
            operator: Some(ConditionOperator::Gte),
            value: Some("0".to_string()),
            ..Condition::default()
        };
        // no start for "vpn" at all -> completion is skipped
        assert!(!evaluate_condition(&cond, &ctx_at(&events, 1000)).matched);
    }

    #[test]
    fn test_correlation_join_field_must_match() {
        let events = vec![
            Event::new("app_install_failed", ts(0), 1).with_data("appId", "vpn"),
            Event::new("performance_snapshot", ts(60), 2)
                .with_data("appId", "browser")
                .with_data("disk_free_gb", 2.0),
        ];
        let cond = Condition {
            signal: "pair".to_string(),
            source: ConditionSource::EventCorrelation,
            event_type: Some("app_install_failed".to_string()),
            correlate_event_type: Some("performance_snapshot".to_string()),
            join_field: Some("appId".to_string()),
            time_window_seconds: 300,
            ..Condition::default()
        };
        assert!(!evaluate_condition(&cond, &ctx_at(&events, 1000)).matched);
    }

    #[test]
    fn test_correlation_window_is_bidirectional() {
        let make = |gap: i64| {
            vec![
                Event::new("a", ts(1000), 1).with_data("k", "x"),
                Event::new("b", ts(1000 + gap), 2).with_data("k", "x"),
            ]
        };
        let cond = Condition {
            signal: "pair".to_string(),
            source: ConditionSource::EventCorrelation,
            event_type: Some("a".to_string()),
            correlate_event_type: Some("b".to_string()),
            join_field: Some("k".to_string()),
            time_window_seconds: 120,
            ..Condition::default()
        };

        let before = make(-60);
        assert!(evaluate_condition(&cond, &ctx_at(&before, 9000)).matched);
        let after = make(60);
        assert!(evaluate_condition(&cond, &ctx_at(&after, 9000)).matched);
        let outside = make(200);
        assert!(!evaluate_condition(&cond, &ctx_at(&outside, 9000)).matched);
    }

    #[test]
    fn test_correlation_zero_window_is_unbounded() {
        let events = vec![
            Event::new("a", ts(0), 1).with_data("k", "x"),
            Event::new("b", ts(86_400), 2).with_data("k", "x"),
        ];
        let cond = Condition {
            signal: "pair".to_string(),
            source: ConditionSource::EventCorrelation,
            event_type: Some("a".to_string()),
            correlate_event_type: Some("b".to_string()),
            join_field: Some("k".to_string()),
            time_window_seconds: 0,
            ..Condition::default()
        };
        assert!(evaluate_condition(&cond, &ctx_at(&events, 100_000)).matched);
    }

    #[test]
    fn test_correlation_event_a_filter_is_independent() {
        let events = vec![
            Event::new("a", ts(0), 1)
                .with_data("k", "x")
                .with_data("fatal", "false"),
            Event::new("a", ts(10), 2)
                .with_data("k", "y")
                .with_data("fatal", "true"),
            Event::new("b", ts(20), 3).with_data("k", "y"),
            Event::new("b", ts(30), 4).with_data("k", "x"),
        ];
        let cond = Condition {
            signal: "pair".to_string(),
            source: ConditionSource::EventCorrelation,
            event_type: Some("a".to_string()),
            correlate_event_type: Some("b".to_string()),
            join_field: Some("k".to_string()),
            event_a_filter_field: Some("fatal".to_string()),
            event_a_filter_operator: Some(ConditionOperator::Equals),
            event_a_filter_value: Some("true".to_string()),
            ..Condition::default()
        };
        let eval = evaluate_condition(&cond, &ctx_at(&events, 1000));
        assert!(eval.matched);
        match eval.evidence.unwrap() {
            Evidence::Correlation {
                event_a_id,
                event_b_id,
                join_value,
                ..
            } => {
                assert_eq!(event_a_id, events[1].id);
                assert_eq!(event_b_id, events[2].id);
                assert_eq!(join_value, "y");
            }
            other => panic!("unexpected evidence {:?}", other),
        }
    }

    #[test]
    fn test_correlation_never_pairs_event_with_itself() {
        let events = vec![Event::new("a", ts(0), 1).with_data("k", "x")];
        let cond = Condition {
            signal: "pair".to_string(),
            source: ConditionSource::EventCorrelation,
            event_type: Some("a".to_string()),
            correlate_event_type: Some("a".to_string()),
            join_field: Some("k".to_string()),
            ..Condition::default()
        };
        assert!(!evaluate_condition(&cond, &ctx_at(&events, 1000)).matched);
    }

    #[test]
    fn test_malformed_condition_is_no_match() {
        let events = vec![Event::new("a", ts(0), 1)];
        // event_type source without an eventType
        let cond = Condition {
            signal: "broken".to_string(),
            source: ConditionSource::EventType,
            ..Condition::default()
        };
        let eval = evaluate_condition(&cond, &ctx_at(&events, 1000));
        assert!(!eval.matched);
        assert!(eval.evidence.is_none());
    }

    #[test]
    fn test_determinism_same_inputs_same_evidence() {
        let events = vec![
            Event::new("app_install_failed", ts(5), 1).with_data("appId", "a"),
            Event::new("app_install_failed", ts(9), 2).with_data("appId", "b"),
        ];
        let cond = Condition {
            signal: "failure".to_string(),
            source: ConditionSource::EventType,
            event_type: Some("app_install_failed".to_string()),
            ..Condition::default()
        };
        let ctx = ctx_at(&events, 100);
        let first = evaluate_condition(&cond, &ctx);
        let second = evaluate_condition(&cond, &ctx);
        assert_eq!(
            serde_json::to_string(&first.evidence).unwrap(),
            serde_json::to_string(&second.evidence).unwrap()
        );
    }
}
