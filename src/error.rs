//! Error types shared across the frontier engine.

use thiserror::Error;

/// All failure modes surfaced by the engine.
///
/// Per-item problems on an ingest stream (validation, capacity, transient
/// store trouble) are reported as `FAIL` acks and never reach the caller as
/// an `Err`; the variants here cover the paths where an operation as a whole
/// cannot proceed.
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("invalid url item: {0}")]
    Validation(String),

    #[error("queue {crawl_id}/{queue_key} not found")]
    UnknownQueue { crawl_id: String, queue_key: String },

    #[error("engine at capacity: {0}")]
    Capacity(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("store failed fatally: {0}")]
    StoreFatal(String),

    #[error("engine is in read-only mode")]
    ReadOnly,

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("channel closed: {0}")]
    Channel(String),
}

impl FrontierError {
    /// Whether the error leaves the engine unable to accept further writes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrontierError::StoreFatal(_))
    }
}

impl From<serde_json::Error> for FrontierError {
    fn from(e: serde_json::Error) -> Self {
        FrontierError::Validation(e.to_string())
    }
}
