//! Confidence factor expressions.
//!
//! Rule documents carry factors as small expression strings
//! (`"exists"`, `"count >= 2"`, `"phase_duration > 1800"`). They are parsed
//! once at rule load into a typed expression; evaluation never touches the
//! raw string again. Unknown expressions parse to `Unsupported`, which is
//! never satisfied — a malformed factor withholds its weight, it does not
//! fail the rule.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorExpr {
    /// Satisfied when the factor's signal has matched evidence
    Exists,
    /// Satisfied when at least N events of the signal's type were seen
    CountGte(u64),
    /// Satisfied when any matched evidence carries a duration above N seconds
    PhaseDurationGt(i64),
    /// Unrecognized expression text; never satisfied
    Unsupported(String),
}

impl FactorExpr {
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim();
        if text.eq_ignore_ascii_case("exists") {
            return FactorExpr::Exists;
        }
        if let Some(rest) = strip_prefix_ci(text, "count") {
            if let Some(n) = parse_operand(rest, ">=") {
                return FactorExpr::CountGte(n as u64);
            }
        }
        if let Some(rest) = strip_prefix_ci(text, "phase_duration") {
            if let Some(n) = parse_operand(rest, ">") {
                return FactorExpr::PhaseDurationGt(n);
            }
        }
        FactorExpr::Unsupported(raw.to_string())
    }
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Parse `" >= 123"`-style remainders: the expected operator, then a number
fn parse_operand(rest: &str, op: &str) -> Option<i64> {
    let rest = rest.trim_start();
    let rest = rest.strip_prefix(op)?;
    // ">=" must not be accepted where ">" is expected with the "=" glued on
    if op == ">" && rest.starts_with('=') {
        return None;
    }
    rest.trim().parse::<i64>().ok().filter(|n| *n >= 0)
}

impl fmt::Display for FactorExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorExpr::Exists => write!(f, "exists"),
            FactorExpr::CountGte(n) => write!(f, "count >= {}", n),
            FactorExpr::PhaseDurationGt(n) => write!(f, "phase_duration > {}", n),
            FactorExpr::Unsupported(raw) => write!(f, "{}", raw),
        }
    }
}

impl Serialize for FactorExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FactorExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(FactorExpr::parse(&raw))
    }
}

/// Weighted booster applied to a rule's base confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceFactor {
    /// Evidence bucket (for `exists`) or event type (for `count >= N`)
    pub signal: String,
    pub condition: FactorExpr,
    /// Added to the confidence score when the expression is satisfied
    pub weight: i8,
}
