//! Telemetry event model.
//!
//! One `Event` is a single timestamped, typed record emitted by a managed
//! device during an enrollment session. Events for a session form an
//! append-only sequence; canonical order is `(timestamp, sequence)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Event type emitted on every enrollment phase transition
pub const PHASE_CHANGE_EVENT_TYPE: &str = "esp_phase_change";

/// Payload field carrying the phase name on phase-change events
pub const PHASE_FIELD: &str = "espPhase";

/// App lifecycle event types
pub const APP_INSTALL_STARTED: &str = "app_install_started";
pub const APP_INSTALL_COMPLETED: &str = "app_install_completed";
pub const APP_INSTALL_FAILED: &str = "app_install_failed";

/// Payload keys tried, in order, to identify which app an event refers to
pub const APP_KEY_FIELDS: [&str; 3] = ["appId", "appName", "name"];

/// Named stage of the enrollment process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EnrollmentPhase {
    DevicePreparation,
    DeviceSetup,
    AccountSetup,
    Completed,
    #[serde(other)]
    #[default]
    Unknown,
}

/// Severity level of a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

/// Payload values are normalized to a closed set of scalar kinds at
/// ingestion, so condition matching never has to reflect over arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PayloadValue {
    /// Render the value as the string the operators compare against.
    /// Whole numbers render without a fractional part so `"3"` equals `3.0`.
    pub fn render(&self) -> String {
        match self {
            PayloadValue::Bool(b) => b.to_string(),
            PayloadValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.0e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            PayloadValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::Text(s.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(s: String) -> Self {
        PayloadValue::Text(s)
    }
}

impl From<f64> for PayloadValue {
    fn from(n: f64) -> Self {
        PayloadValue::Number(n)
    }
}

impl From<i64> for PayloadValue {
    fn from(n: i64) -> Self {
        PayloadValue::Number(n as f64)
    }
}

impl From<bool> for PayloadValue {
    fn from(b: bool) -> Self {
        PayloadValue::Bool(b)
    }
}

/// Free-form event payload: string keys, scalar values.
///
/// Lookup is case-insensitive. Dot-path field names are literal keys here;
/// producers flatten nested payloads before events reach the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventPayload(BTreeMap<String, PayloadValue>);

impl EventPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive field lookup. Exact match wins over folded match.
    pub fn get(&self, field: &str) -> Option<&PayloadValue> {
        if let Some(v) = self.0.get(field) {
            return Some(v);
        }
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(field))
            .map(|(_, v)| v)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<PayloadValue>) {
        self.0.insert(field.into(), value.into());
    }

    /// Builder-style insert for constructing payloads inline
    pub fn with(mut self, field: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Single telemetry record, immutable once stored
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Stable reference used in evidence
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// String identifier, e.g. `"app_install_failed"`; compared case-insensitively
    pub event_type: String,
    /// UTC instant the device recorded the event
    pub timestamp: DateTime<Utc>,
    /// Monotonically increasing per-session tiebreaker
    #[serde(default)]
    pub sequence: u64,
    /// Enrollment phase the session was in
    #[serde(default)]
    pub phase: EnrollmentPhase,
    #[serde(default)]
    pub severity: EventSeverity,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: EventPayload,
}

impl Event {
    pub fn new(event_type: &str, timestamp: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            timestamp,
            sequence,
            phase: EnrollmentPhase::Unknown,
            severity: EventSeverity::Info,
            message: String::new(),
            data: EventPayload::new(),
        }
    }

    pub fn with_phase(mut self, phase: EnrollmentPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    pub fn with_data(mut self, field: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.data.set(field, value);
        self
    }

    /// Case-insensitive exact type match; no partial matching
    pub fn type_matches(&self, event_type: &str) -> bool {
        self.event_type.eq_ignore_ascii_case(event_type)
    }

    /// Resolve the app key from the payload (`appId`, then `appName`, then `name`)
    pub fn app_key(&self) -> Option<String> {
        APP_KEY_FIELDS
            .iter()
            .find_map(|field| self.data.get(field))
            .map(PayloadValue::render)
    }
}

/// Sort a session's events into canonical `(timestamp, sequence)` order
pub fn sort_canonical(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.sequence.cmp(&b.sequence))
    });
}
