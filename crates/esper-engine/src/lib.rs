//! Rule evaluation engine for enrollment session diagnostics.
//!
//! Given a session's ordered event history and the tenant's active rule set,
//! the engine decides which known failure patterns are present and with what
//! confidence. Evaluation is synchronous, deterministic, and idempotent per
//! `(session, rule)`; the surrounding service decides when to invoke it
//! (at terminal session state) and how to display the results.

pub mod conditions;
pub mod engine;
pub mod files;
pub mod matchers;
pub mod repo;
pub mod score;
pub mod store;

pub use conditions::{evaluate_condition, EvalContext, Evaluation};
pub use engine::{EngineError, RuleEngine};
pub use files::{FileEventRepository, FileRuleRepository};
pub use repo::{
    EventRepository, InMemoryEventRepository, InMemoryResultStore, InMemoryRuleRepository,
    ResultStore, RuleRepository,
};
pub use score::{score_rule, FactorOutcome, ScoreOutcome};
pub use store::SqliteResultStore;
