//! Subcommand implementations.

use crate::render;
use anyhow::{bail, Context, Result};
use esper_engine::{
    EventRepository, FileEventRepository, FileRuleRepository, InMemoryResultStore, ResultStore,
    RuleEngine, RuleRepository, SqliteResultStore,
};
use esper_shared::{RESULTS_DB_FILE, STATE_DIR};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result database location: explicit flag, the service state directory when
/// present, else the per-user state directory.
fn db_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    let state = Path::new(STATE_DIR);
    if state.is_dir() {
        return state.join(RESULTS_DB_FILE);
    }
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("esper")
        .join(RESULTS_DB_FILE)
}

pub fn analyze(
    session: &str,
    tenant: &str,
    events: PathBuf,
    rules: Option<PathBuf>,
    db: Option<PathBuf>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let event_repo: Arc<dyn EventRepository> = if events.is_dir() {
        Arc::new(FileEventRepository::for_dir(events))
    } else {
        Arc::new(FileEventRepository::for_file(events))
    };
    let rule_repo = Arc::new(FileRuleRepository::new(rules));
    let result_store: Arc<dyn ResultStore> = if dry_run {
        Arc::new(InMemoryResultStore::new())
    } else {
        Arc::new(SqliteResultStore::open_at(db_path(db)).context("opening result store")?)
    };

    let engine = RuleEngine::new(rule_repo, event_repo, result_store);
    let fired = engine.analyze_session(tenant, session)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&fired)?);
    } else {
        render::print_results(session, &fired, dry_run);
    }
    Ok(())
}

pub fn rules_list(tenant: &str, rules: Option<PathBuf>, json: bool) -> Result<()> {
    let repo = FileRuleRepository::new(rules);
    let rules = repo.active_rules(tenant).context("loading rules")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
    } else {
        render::print_rules_table(tenant, &rules);
    }
    Ok(())
}

pub fn rules_lint(tenant: &str, rules: Option<PathBuf>) -> Result<()> {
    let repo = FileRuleRepository::new(rules);
    let rules = repo.active_rules(tenant).context("loading rules")?;

    let mut total = 0;
    for rule in &rules {
        let problems = rule.lint();
        if !problems.is_empty() {
            render::print_lint_problems(&rule.rule_id, &problems);
            total += problems.len();
        }
    }

    if total > 0 {
        bail!("{} problem(s) across {} rule(s)", total, rules.len());
    }
    println!("{} rule(s) ok", rules.len());
    Ok(())
}

pub fn results(session: &str, tenant: &str, db: Option<PathBuf>, json: bool) -> Result<()> {
    let store = SqliteResultStore::open_at(db_path(db)).context("opening result store")?;
    let stored = store.session_results(tenant, session)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    } else {
        render::print_results(session, &stored, false);
    }
    Ok(())
}
