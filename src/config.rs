//! Engine configuration.
//!
//! `FrontierConfig` carries the recognized options; a transport adapter
//! deserializes it from whatever config source it uses and hands it to the
//! builder. `CrawlLimits` holds the per-crawl knobs settable at runtime
//! through the control surface.

use serde::{Deserialize, Serialize};

use crate::error::FrontierError;
use crate::types::EpochMillis;

/// Static engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {
    /// Bind address for the transport adapter.
    pub host: String,
    pub port: u16,
    /// Minimum interval between two serves from the same queue, unless a
    /// crawl overrides it.
    pub default_min_delay_ms: EpochMillis,
    /// How long a served URL stays reserved when the fetch request does not
    /// say otherwise.
    pub default_delay_requestable_ms: EpochMillis,
    /// Cap on simultaneously open ingest + fetch streams.
    pub max_concurrent_streams: usize,
    /// Cap on outstanding store writes per ingest stream; the stream is not
    /// read past this many unacked items.
    pub ingest_outstanding_limit: usize,
    /// Server-side deadline for one fetch request.
    pub fetch_deadline_ms: u64,
    /// Identifier of the queue store backend.
    pub store_backend: String,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        FrontierConfig {
            host: "127.0.0.1".to_string(),
            port: 7071,
            default_min_delay_ms: 1_000,
            default_delay_requestable_ms: 30_000,
            max_concurrent_streams: num_cpus::get() * 32,
            ingest_outstanding_limit: 10_000,
            fetch_deadline_ms: 1_000,
            store_backend: "memory".to_string(),
        }
    }
}

impl FrontierConfig {
    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), FrontierError> {
        if self.ingest_outstanding_limit == 0 {
            return Err(FrontierError::Configuration(
                "ingest_outstanding_limit must be greater than 0".to_string(),
            ));
        }
        if self.fetch_deadline_ms == 0 {
            return Err(FrontierError::Configuration(
                "fetch_deadline_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_streams == 0 {
            return Err(FrontierError::Configuration(
                "max_concurrent_streams must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-crawl scheduling limits, adjustable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlLimits {
    pub min_delay_ms: EpochMillis,
    /// Queues over this many active URLs reject further discovered items.
    pub max_queue_size: Option<u64>,
}

impl CrawlLimits {
    pub fn new(min_delay_ms: EpochMillis) -> Self {
        CrawlLimits {
            min_delay_ms,
            max_queue_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = FrontierConfig::default();
        assert_eq!(cfg.default_min_delay_ms, 1_000);
        assert_eq!(cfg.default_delay_requestable_ms, 30_000);
        assert_eq!(cfg.ingest_outstanding_limit, 10_000);
        assert_eq!(cfg.fetch_deadline_ms, 1_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let cfg = FrontierConfig {
            ingest_outstanding_limit: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let cfg: FrontierConfig = serde_json::from_str(r#"{"port": 9090}"#).unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.store_backend, "memory");
    }
}
