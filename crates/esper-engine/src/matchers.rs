//! Operator matching primitives.
//!
//! All comparisons are string-in, verdict-out: payload values are rendered
//! to strings before they get here, and a malformed operand is a non-match,
//! never an error.

use esper_shared::rule::ConditionOperator;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Wall-clock budget for compiling one user-supplied pattern. Matching with
/// the compiled program is linear-time, so compilation is the only step that
/// needs a kill-switch.
const REGEX_COMPILE_BUDGET: Duration = Duration::from_secs(1);

/// Cap on the compiled program size
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Process-wide pattern cache. Patterns that failed to compile (or blew the
/// budget) are cached as `None` so they are rejected once, not per event.
static REGEX_CACHE: Lazy<Mutex<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// `MatchesOperator(fieldValue, op, compareValue)`
pub fn matches_operator(field_value: &str, op: ConditionOperator, compare: &str) -> bool {
    match op {
        ConditionOperator::Equals => field_value.to_lowercase() == compare.to_lowercase(),
        ConditionOperator::Contains => field_value
            .to_lowercase()
            .contains(&compare.to_lowercase()),
        ConditionOperator::Regex => regex_is_match(compare, field_value),
        ConditionOperator::Gt => numeric_cmp(field_value, compare, |a, b| a > b),
        ConditionOperator::Lt => numeric_cmp(field_value, compare, |a, b| a < b),
        ConditionOperator::Gte => numeric_cmp(field_value, compare, |a, b| a >= b),
        ConditionOperator::Lte => numeric_cmp(field_value, compare, |a, b| a <= b),
        ConditionOperator::Exists => !field_value.is_empty(),
        // count_gte is evaluated by the event_count source, not per-field
        ConditionOperator::CountGte => false,
    }
}

/// Numeric comparison; non-numeric operands never match
fn numeric_cmp(field_value: &str, compare: &str, cmp: fn(f64, f64) -> bool) -> bool {
    match (parse_number(field_value), parse_number(compare)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Case-insensitive regex search, bounded so a pathological pattern can
/// never stall the calling thread. A pattern that fails to compile is a
/// permanent non-matcher.
pub fn regex_is_match(pattern: &str, haystack: &str) -> bool {
    let mut cache = REGEX_CACHE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let compiled = cache
        .entry(pattern.to_string())
        .or_insert_with(|| compile_bounded(pattern));
    match compiled {
        Some(re) => re.is_match(haystack),
        None => false,
    }
}

fn compile_bounded(pattern: &str) -> Option<Regex> {
    let (tx, rx) = mpsc::channel();
    let owned = pattern.to_string();
    thread::spawn(move || {
        let compiled = RegexBuilder::new(&owned)
            .case_insensitive(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .build();
        let _ = tx.send(compiled);
    });

    match rx.recv_timeout(REGEX_COMPILE_BUDGET) {
        Ok(Ok(re)) => Some(re),
        Ok(Err(err)) => {
            warn!(pattern, %err, "rejecting condition regex");
            None
        }
        Err(_) => {
            warn!(pattern, "condition regex exceeded compile budget");
            None
        }
    }
}
