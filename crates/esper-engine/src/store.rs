//! SQLite-backed result store.
//!
//! One row per fired diagnosis, keyed `(tenant_id, session_id, rule_id)`.
//! Replayed analyses insert with OR IGNORE, so a stored diagnosis is never
//! duplicated or mutated. The full result is kept as a JSON payload next to
//! the queryable key columns.

use crate::repo::ResultStore;
use esper_shared::error::EsperError;
use esper_shared::result::RuleResult;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    /// Open or create the store at `path`
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self, EsperError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref()).map_err(sql_err)?;
        Self::init(conn)
    }

    /// Private store, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self, EsperError> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, EsperError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(sql_err)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS rule_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                rule_id TEXT NOT NULL,
                confidence INTEGER NOT NULL,
                detected_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                UNIQUE(tenant_id, session_id, rule_id)
            );

            CREATE INDEX IF NOT EXISTS idx_results_session
                ON rule_results(tenant_id, session_id);
            "#,
        )
        .map_err(sql_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn sql_err(err: rusqlite::Error) -> EsperError {
    EsperError::Store(err.to_string())
}

impl ResultStore for SqliteResultStore {
    fn evaluated_rule_ids(
        &self,
        tenant: &str,
        session: &str,
    ) -> Result<HashSet<String>, EsperError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stmt = conn
            .prepare(
                "SELECT rule_id FROM rule_results WHERE tenant_id = ?1 AND session_id = ?2",
            )
            .map_err(sql_err)?;
        let ids = stmt
            .query_map(params![tenant, session], |row| row.get::<_, String>(0))
            .map_err(sql_err)?
            .collect::<Result<HashSet<String>, _>>()
            .map_err(sql_err)?;
        Ok(ids)
    }

    fn record(&self, result: &RuleResult) -> Result<(), EsperError> {
        let payload = serde_json::to_string(result)?;
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO rule_results
                 (tenant_id, session_id, rule_id, confidence, detected_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    result.tenant_id,
                    result.session_id,
                    result.rule_id,
                    result.confidence_score,
                    result.detected_at.to_rfc3339(),
                    payload,
                ],
            )
            .map_err(sql_err)?;
        if inserted == 0 {
            debug!(
                tenant = %result.tenant_id,
                session = %result.session_id,
                rule_id = %result.rule_id,
                "result already stored; left untouched"
            );
        }
        Ok(())
    }

    fn session_results(
        &self,
        tenant: &str,
        session: &str,
    ) -> Result<Vec<RuleResult>, EsperError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut stmt = conn
            .prepare(
                "SELECT payload FROM rule_results
                 WHERE tenant_id = ?1 AND session_id = ?2
                 ORDER BY confidence DESC, id ASC",
            )
            .map_err(sql_err)?;
        let payloads = stmt
            .query_map(params![tenant, session], |row| row.get::<_, String>(0))
            .map_err(sql_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(sql_err)?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(EsperError::from))
            .collect()
    }
}
