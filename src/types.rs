//! # Types Module
//!
//! Wire-shaped data model of the frontier engine.
//!
//! ## Overview
//!
//! These are the messages a transport adapter (gRPC or otherwise) maps its
//! generated stubs onto: the unit of scheduling (`UrlInfo`), the tagged
//! ingest item (`UrlItem`), the per-item acknowledgement (`AckMessage`),
//! the fetch request (`GetParams`) and the control-surface reply rows.
//!
//! All timestamps are milliseconds since the Unix epoch (`EpochMillis`).
//! A `refetchable_from` of zero on a known item means "never refetch": the
//! URL is recorded as known and any live entry for it is completed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = u64;

/// Opaque per-URL metadata: string keys to lists of string values.
pub type Metadata = HashMap<String, Vec<String>>;

/// Sentinel `refetchable_from` meaning the URL must never be served again.
pub const NEVER_REFETCH: EpochMillis = 0;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The unit of scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlInfo {
    pub url: String,
    #[serde(default)]
    pub crawl_id: String,
    /// Explicit queue key; derived from the URL host when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl UrlInfo {
    pub fn new(url: impl Into<String>, crawl_id: impl Into<String>) -> Self {
        UrlInfo {
            url: url.into(),
            crawl_id: crawl_id.into(),
            key: None,
            metadata: Metadata::new(),
        }
    }
}

/// The two ways a URL enters the frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlItemKind {
    /// Freshly discovered by a crawler; must be deduplicated.
    Discovered { info: UrlInfo },
    /// Asserted already known (e.g. replayed from a prior crawl); scheduled
    /// at `refetchable_from`, or completed when it is [`NEVER_REFETCH`].
    Known {
        info: UrlInfo,
        #[serde(default)]
        refetchable_from: EpochMillis,
    },
}

/// One element of an ingest stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlItem {
    /// Caller-chosen ack correlation token; synthesized when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub kind: UrlItemKind,
}

impl UrlItem {
    pub fn discovered(info: UrlInfo) -> Self {
        UrlItem {
            id: None,
            kind: UrlItemKind::Discovered { info },
        }
    }

    pub fn known(info: UrlInfo, refetchable_from: EpochMillis) -> Self {
        UrlItem {
            id: None,
            kind: UrlItemKind::Known {
                info,
                refetchable_from,
            },
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn info(&self) -> &UrlInfo {
        match &self.kind {
            UrlItemKind::Discovered { info } => info,
            UrlItemKind::Known { info, .. } => info,
        }
    }

    /// The token echoed back in the ack: the explicit id when present,
    /// otherwise `crawl_id + "_" + url`.
    pub fn ack_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => {
                let info = self.info();
                format!("{}_{}", info.crawl_id, info.url)
            }
        }
    }

    /// Parses one line of mixed-format input: a line starting with `{` is a
    /// JSON `UrlItem`, any other non-empty line is a plain URL discovered
    /// under `default_crawl`. Returns `None` for blank or malformed lines.
    pub fn from_line(line: &str, default_crawl: &str) -> Option<UrlItem> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed).ok();
        }
        let info = UrlInfo::new(trimmed, default_crawl);
        let id = format!("{}_{}", default_crawl, trimmed);
        Some(UrlItem::discovered(info).with_id(id))
    }
}

/// Outcome of ingesting one `UrlItem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckStatus {
    Ok,
    Skipped,
    Fail,
}

/// Per-item acknowledgement; one per ingested item, correlation by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckMessage {
    pub id: String,
    pub status: AckStatus,
}

/// Parameters of a fetch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetParams {
    /// Global cap on URLs in the response.
    pub max_urls: usize,
    /// Cap on distinct queues drawn from.
    pub max_queues: usize,
    /// How long a served URL stays reserved before it is re-served if the
    /// consumer never completes it.
    pub delay_requestable_ms: EpochMillis,
    /// Caller-side deadline; the effective deadline is the minimum of this
    /// and the server default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Default for GetParams {
    fn default() -> Self {
        GetParams {
            max_urls: 1,
            max_queues: 1,
            delay_requestable_ms: 30_000,
            deadline_ms: None,
            crawl_id: None,
            key: None,
        }
    }
}

impl GetParams {
    pub fn new(max_urls: usize, max_queues: usize) -> Self {
        GetParams {
            max_urls,
            max_queues: max_queues.max(1),
            ..Default::default()
        }
    }

    pub fn for_crawl(mut self, crawl_id: impl Into<String>) -> Self {
        self.crawl_id = Some(crawl_id.into());
        self
    }

    pub fn for_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn delay_requestable_ms(mut self, delay: EpochMillis) -> Self {
        self.delay_requestable_ms = delay;
        self
    }

    pub fn deadline_ms(mut self, deadline: u64) -> Self {
        self.deadline_ms = Some(deadline);
        self
    }
}

/// One row of a `list_queues` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub crawl_id: String,
    pub key: String,
    pub active_count: u64,
    pub in_flight: u64,
    pub completed_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_produced_at: Option<EpochMillis>,
}

/// Aggregate counters returned by `get_stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub queues: u64,
    pub active: u64,
    pub in_flight: u64,
    pub completed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_id_prefers_explicit_id() {
        let item = UrlItem::discovered(UrlInfo::new("http://a.com/x", "c1")).with_id("custom");
        assert_eq!(item.ack_id(), "custom");
    }

    #[test]
    fn ack_id_is_synthesized_from_crawl_and_url() {
        let item = UrlItem::discovered(UrlInfo::new("http://a.com/x", "c1"));
        assert_eq!(item.ack_id(), "c1_http://a.com/x");
    }

    #[test]
    fn plain_line_becomes_discovered_item() {
        let item = UrlItem::from_line("  http://example.com/page ", "default").unwrap();
        assert_eq!(item.info().url, "http://example.com/page");
        assert_eq!(item.info().crawl_id, "default");
        assert_eq!(item.ack_id(), "default_http://example.com/page");
        assert!(matches!(item.kind, UrlItemKind::Discovered { .. }));
    }

    #[test]
    fn json_line_is_parsed_as_item() {
        let line = r#"{"discovered": {"info": {"url": "http://t.com", "crawl_id": "c", "key": "t.com"}}}"#;
        let item = UrlItem::from_line(line, "ignored").unwrap();
        assert_eq!(item.info().url, "http://t.com");
        assert_eq!(item.info().key.as_deref(), Some("t.com"));
    }

    #[test]
    fn json_line_known_with_refetch_time() {
        let line =
            r#"{"known": {"info": {"url": "http://t.com", "crawl_id": "c"}, "refetchable_from": 1700000000000}}"#;
        let item = UrlItem::from_line(line, "ignored").unwrap();
        match item.kind {
            UrlItemKind::Known {
                refetchable_from, ..
            } => assert_eq!(refetchable_from, 1_700_000_000_000),
            _ => panic!("expected a known item"),
        }
    }

    #[test]
    fn blank_and_malformed_lines_are_rejected() {
        assert!(UrlItem::from_line("   ", "c").is_none());
        assert!(UrlItem::from_line("{not json", "c").is_none());
    }

    #[test]
    fn ack_status_uses_wire_spelling() {
        assert_eq!(serde_json::to_string(&AckStatus::Ok).unwrap(), "\"OK\"");
        assert_eq!(
            serde_json::to_string(&AckStatus::Skipped).unwrap(),
            "\"SKIPPED\""
        );
        assert_eq!(serde_json::to_string(&AckStatus::Fail).unwrap(), "\"FAIL\"");
    }

    #[test]
    fn get_params_clamps_max_queues() {
        let params = GetParams::new(10, 0);
        assert_eq!(params.max_queues, 1);
    }
}
