//! Collaborator interfaces the engine evaluates against.
//!
//! The engine consumes a rule repository and an event repository, and
//! produces to a result store. The store also answers the "already
//! evaluated" query that makes re-analysis idempotent. In-memory
//! implementations live here; file- and SQLite-backed ones in
//! [`crate::files`] and [`crate::store`].

use esper_shared::error::EsperError;
use esper_shared::event::{self, Event};
use esper_shared::result::RuleResult;
use esper_shared::rule::RuleDefinition;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Supplies the tenant's effective rule set (global rules with tenant
/// overrides applied; the merge lives in the implementation, not the engine).
pub trait RuleRepository: Send + Sync {
    fn active_rules(&self, tenant: &str) -> Result<Vec<RuleDefinition>, EsperError>;
}

/// Supplies a session's event history in canonical `(timestamp, sequence)`
/// order.
pub trait EventRepository: Send + Sync {
    fn session_events(&self, tenant: &str, session: &str) -> Result<Vec<Event>, EsperError>;
}

/// Durable sink for fired diagnoses, keyed `(tenant, session, ruleId)`.
pub trait ResultStore: Send + Sync {
    /// Rule ids that already have a stored result for this session
    fn evaluated_rule_ids(&self, tenant: &str, session: &str)
        -> Result<HashSet<String>, EsperError>;

    /// Record a fired result. Recording the same `(tenant, session, ruleId)`
    /// again must neither duplicate nor mutate the stored diagnosis.
    fn record(&self, result: &RuleResult) -> Result<(), EsperError>;

    /// Stored diagnoses for a session, highest confidence first
    fn session_results(&self, tenant: &str, session: &str)
        -> Result<Vec<RuleResult>, EsperError>;
}

/// Fixed rule set, same for every tenant
pub struct InMemoryRuleRepository {
    rules: Vec<RuleDefinition>,
}

impl InMemoryRuleRepository {
    pub fn new(rules: Vec<RuleDefinition>) -> Self {
        Self { rules }
    }
}

impl RuleRepository for InMemoryRuleRepository {
    fn active_rules(&self, _tenant: &str) -> Result<Vec<RuleDefinition>, EsperError> {
        Ok(self.rules.clone())
    }
}

/// Event histories keyed by `(tenant, session)`
#[derive(Default)]
pub struct InMemoryEventRepository {
    sessions: Mutex<HashMap<(String, String), Vec<Event>>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: &str, session: &str, mut events: Vec<Event>) {
        event::sort_canonical(&mut events);
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((tenant.to_string(), session.to_string()), events);
    }
}

impl EventRepository for InMemoryEventRepository {
    fn session_events(&self, tenant: &str, session: &str) -> Result<Vec<Event>, EsperError> {
        let sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .get(&(tenant.to_string(), session.to_string()))
            .cloned()
            .ok_or_else(|| EsperError::Event(format!("unknown session {}/{}", tenant, session)))
    }
}

/// Result store for tests and `--dry-run` analysis
#[derive(Default)]
pub struct InMemoryResultStore {
    results: Mutex<Vec<RuleResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for InMemoryResultStore {
    fn evaluated_rule_ids(
        &self,
        tenant: &str,
        session: &str,
    ) -> Result<HashSet<String>, EsperError> {
        let results = self
            .results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(results
            .iter()
            .filter(|r| r.tenant_id == tenant && r.session_id == session)
            .map(|r| r.rule_id.clone())
            .collect())
    }

    fn record(&self, result: &RuleResult) -> Result<(), EsperError> {
        let mut results = self
            .results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let exists = results.iter().any(|r| {
            r.tenant_id == result.tenant_id
                && r.session_id == result.session_id
                && r.rule_id == result.rule_id
        });
        if !exists {
            results.push(result.clone());
        }
        Ok(())
    }

    fn session_results(
        &self,
        tenant: &str,
        session: &str,
    ) -> Result<Vec<RuleResult>, EsperError> {
        let results = self
            .results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut matching: Vec<RuleResult> = results
            .iter()
            .filter(|r| r.tenant_id == tenant && r.session_id == session)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.confidence_score.cmp(&a.confidence_score));
        Ok(matching)
    }
}
