//! Shared types for Esper components.
//!
//! Everything that crosses a component boundary lives here: the telemetry
//! event model, the declarative rule model, evidence and diagnosis types,
//! and the built-in rule catalog.

pub mod catalog;
pub mod error;
pub mod event;
pub mod evidence;
pub mod factor;
pub mod result;
pub mod rule;

pub use error::EsperError;
pub use event::{EnrollmentPhase, Event, EventPayload, EventSeverity, PayloadValue};
pub use evidence::Evidence;
pub use factor::{ConfidenceFactor, FactorExpr};
pub use result::RuleResult;
pub use rule::{
    Condition, ConditionOperator, ConditionSource, RuleDefinition, RuleSeverity, TriggerKind,
};

/// State directory when running as a system service
pub const STATE_DIR: &str = "/var/lib/esper";

/// Result database file name inside the state directory
pub const RESULTS_DB_FILE: &str = "results.db";

/// Tenant used when no tenant is specified
pub const DEFAULT_TENANT: &str = "default";
