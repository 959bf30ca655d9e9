//! File-backed repositories.
//!
//! Rule documents are one JSON file per rule: `<dir>/*.json` for the global
//! set, `<dir>/tenants/<tenant>/*.json` for tenant overrides. A tenant
//! document with a known rule id replaces the global rule in place; the rest
//! are appended. With no directory configured, the built-in catalog is the
//! effective rule set.
//!
//! Session events are JSONL, one event per line, `<dir>/<session>.jsonl`
//! (or a single file handed to [`FileEventRepository::for_file`]).

use crate::repo::{EventRepository, RuleRepository};
use esper_shared::catalog::builtin_rules;
use esper_shared::error::EsperError;
use esper_shared::event::{self, Event};
use esper_shared::rule::RuleDefinition;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileRuleRepository {
    rules_dir: Option<PathBuf>,
}

impl FileRuleRepository {
    /// `None` means the built-in catalog only
    pub fn new(rules_dir: Option<PathBuf>) -> Self {
        Self { rules_dir }
    }

    fn load_dir(dir: &Path) -> Result<Vec<RuleDefinition>, EsperError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        // read_dir order is platform-defined; sort for a stable rule order
        paths.sort();

        let mut rules = Vec::with_capacity(paths.len());
        for path in paths {
            let content = fs::read_to_string(&path)?;
            let rule: RuleDefinition = serde_json::from_str(&content).map_err(|err| {
                EsperError::Rule(format!("{}: {}", path.display(), err))
            })?;
            rules.push(rule);
        }
        Ok(rules)
    }
}

impl RuleRepository for FileRuleRepository {
    fn active_rules(&self, tenant: &str) -> Result<Vec<RuleDefinition>, EsperError> {
        let Some(dir) = &self.rules_dir else {
            return Ok(builtin_rules());
        };

        let mut effective = Self::load_dir(dir)?;

        let tenant_dir = dir.join("tenants").join(tenant);
        if tenant_dir.is_dir() {
            for rule in Self::load_dir(&tenant_dir)? {
                match effective.iter_mut().find(|r| r.rule_id == rule.rule_id) {
                    Some(slot) => {
                        debug!(tenant, rule_id = %rule.rule_id, "tenant override");
                        *slot = rule;
                    }
                    None => effective.push(rule),
                }
            }
        }
        Ok(effective)
    }
}

pub struct FileEventRepository {
    /// A directory of `<session>.jsonl` files, or one fixed file
    source: EventSource,
}

enum EventSource {
    Dir(PathBuf),
    File(PathBuf),
}

impl FileEventRepository {
    pub fn for_dir(dir: PathBuf) -> Self {
        Self {
            source: EventSource::Dir(dir),
        }
    }

    /// Serve one session from a single JSONL file, whatever its name
    pub fn for_file(path: PathBuf) -> Self {
        Self {
            source: EventSource::File(path),
        }
    }
}

impl EventRepository for FileEventRepository {
    fn session_events(&self, _tenant: &str, session: &str) -> Result<Vec<Event>, EsperError> {
        let path = match &self.source {
            EventSource::Dir(dir) => dir.join(format!("{}.jsonl", session)),
            EventSource::File(path) => path.clone(),
        };
        let content = fs::read_to_string(&path).map_err(|err| {
            EsperError::Event(format!("{}: {}", path.display(), err))
        })?;

        let mut events = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(line).map_err(|err| {
                EsperError::Event(format!("{}:{}: {}", path.display(), lineno + 1, err))
            })?;
            events.push(event);
        }
        event::sort_canonical(&mut events);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_catalog_without_rules_dir() {
        let repo = FileRuleRepository::new(None);
        let rules = repo.active_rules("any").unwrap();
        assert!(!rules.is_empty());
    }

    #[test]
    fn test_tenant_rules_override_global_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let global = r#"{
            "ruleId": "shared-rule", "title": "Global", "severity": "low",
            "category": "test",
            "conditions": [{"signal": "s", "source": "event_type", "eventType": "x"}],
            "baseConfidence": 50, "explanation": "global"
        }"#;
        fs::write(dir.path().join("shared-rule.json"), global).unwrap();

        let tenant_dir = dir.path().join("tenants").join("contoso");
        fs::create_dir_all(&tenant_dir).unwrap();
        let tenant_override = r#"{
            "ruleId": "shared-rule", "title": "Tenant", "severity": "high",
            "category": "test",
            "conditions": [{"signal": "s", "source": "event_type", "eventType": "x"}],
            "baseConfidence": 90, "explanation": "tenant"
        }"#;
        fs::write(tenant_dir.join("shared-rule.json"), tenant_override).unwrap();
        let custom = r#"{
            "ruleId": "tenant-only", "title": "Custom", "severity": "low",
            "category": "test",
            "conditions": [{"signal": "s", "source": "event_type", "eventType": "y"}],
            "baseConfidence": 40, "explanation": "custom"
        }"#;
        fs::write(tenant_dir.join("tenant-only.json"), custom).unwrap();

        let repo = FileRuleRepository::new(Some(dir.path().to_path_buf()));

        let merged = repo.active_rules("contoso").unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].rule_id, "shared-rule");
        assert_eq!(merged[0].title, "Tenant");
        assert_eq!(merged[1].rule_id, "tenant-only");

        let other = repo.active_rules("fabrikam").unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].title, "Global");
    }

    #[test]
    fn test_unreadable_rule_document_is_hard_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let repo = FileRuleRepository::new(Some(dir.path().to_path_buf()));
        assert!(repo.active_rules("t").is_err());
    }

    #[test]
    fn test_events_parsed_and_sorted_canonically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-1.jsonl");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"{{"eventType": "late", "timestamp": "2024-03-01T10:05:00Z", "sequence": 2}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"eventType": "early", "timestamp": "2024-03-01T10:00:00Z", "sequence": 1}}"#
        )
        .unwrap();

        let repo = FileEventRepository::for_dir(dir.path().to_path_buf());
        let events = repo.session_events("t", "session-1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "early");
    }

    #[test]
    fn test_missing_session_file_is_hard_failure() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileEventRepository::for_dir(dir.path().to_path_buf());
        assert!(repo.session_events("t", "nope").is_err());
    }
}
