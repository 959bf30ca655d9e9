//! Structured evidence attached to a fired rule.
//!
//! Evidence is for human diagnosis, not exhaustive reporting: each matched
//! condition contributes the first satisfying event(s), deterministically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Evidence {
    /// First event that satisfied an `event_type` / `event_data` condition
    Event {
        event_id: Uuid,
        event_type: String,
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        /// How many events matched the type filter, for transparency
        match_count: usize,
    },
    /// Running count from an `event_count` condition; kept even on non-match
    Count {
        event_type: String,
        count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        first_event_id: Option<Uuid>,
    },
    /// Observed phase or app-install duration
    Duration {
        /// Phase name or app key the duration belongs to
        label: String,
        start_event_id: Uuid,
        /// Absent when the span is still open and was measured against "now"
        #[serde(skip_serializing_if = "Option::is_none")]
        end_event_id: Option<Uuid>,
        duration_seconds: i64,
    },
    /// Satisfying A/B pair from an `event_correlation` condition
    Correlation {
        event_a_id: Uuid,
        event_a_type: String,
        event_b_id: Uuid,
        event_b_type: String,
        join_field: String,
        join_value: String,
        /// Signed gap B − A; negative when B precedes A
        gap_seconds: i64,
    },
    /// Confidence factor that contributed weight
    Factor { expression: String, weight: i8 },
}

impl Evidence {
    /// Duration carried by this evidence, if any; used by
    /// `phase_duration > N` confidence factors.
    pub fn duration_seconds(&self) -> Option<i64> {
        match self {
            Evidence::Duration {
                duration_seconds, ..
            } => Some(*duration_seconds),
            _ => None,
        }
    }
}
