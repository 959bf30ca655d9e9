//! Error types for Esper.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EsperError {
    #[error("Rule repository error: {0}")]
    Rule(String),

    #[error("Event repository error: {0}")]
    Event(String),

    #[error("Result store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
