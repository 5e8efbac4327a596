//! # Statistics Module
//!
//! Collects and stores engine-wide metrics about the frontier's operation.
//!
//! ## Overview
//!
//! The `FrontierStats` collector tracks ingest and fetch activity across
//! every stream: items received and their ack outcomes, URLs served and
//! completed, queue churn and checkpoints. Counters are atomic, so every
//! stream task updates them without coordination; snapshots capture a
//! consistent view for reporting.
//!
//! ## Export Formats
//!
//! - `Display` for one-glance logging
//! - JSON (compact and pretty) for programmatic consumers
//! - Markdown for operator reports

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use crate::error::FrontierError;

// A consistent view of the counters, used by all presentation paths.
struct StatsSnapshot {
    items_received: usize,
    acked_ok: usize,
    acked_skipped: usize,
    acked_failed: usize,
    urls_served: usize,
    urls_completed: usize,
    fetch_requests: usize,
    empty_fetches: usize,
    queues_created: usize,
    queues_deleted: usize,
    crawls_deleted: usize,
    checkpoints_saved: usize,
    served_per_crawl: HashMap<String, usize>,
    elapsed: Duration,
}

impl StatsSnapshot {
    fn formatted_duration(&self) -> String {
        format!("{:?}", self.elapsed)
    }

    fn items_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs();
        if secs > 0 {
            self.items_received as f64 / secs as f64
        } else {
            0.0
        }
    }

    fn served_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs();
        if secs > 0 {
            self.urls_served as f64 / secs as f64
        } else {
            0.0
        }
    }
}

/// Atomic metric collector shared by every stream task.
#[derive(Debug, serde::Serialize)]
pub struct FrontierStats {
    #[serde(skip)]
    pub start_time: Instant,

    // Ingest metrics
    pub items_received: AtomicUsize,
    pub acked_ok: AtomicUsize,
    pub acked_skipped: AtomicUsize,
    pub acked_failed: AtomicUsize,

    // Fetch metrics
    pub urls_served: AtomicUsize,
    pub urls_completed: AtomicUsize,
    pub fetch_requests: AtomicUsize,
    pub empty_fetches: AtomicUsize,
    pub served_per_crawl: Arc<dashmap::DashMap<String, usize>>,

    // Lifecycle metrics
    pub queues_created: AtomicUsize,
    pub queues_deleted: AtomicUsize,
    pub crawls_deleted: AtomicUsize,
    pub checkpoints_saved: AtomicUsize,
}

impl FrontierStats {
    pub(crate) fn new() -> Self {
        FrontierStats {
            start_time: Instant::now(),
            items_received: AtomicUsize::new(0),
            acked_ok: AtomicUsize::new(0),
            acked_skipped: AtomicUsize::new(0),
            acked_failed: AtomicUsize::new(0),
            urls_served: AtomicUsize::new(0),
            urls_completed: AtomicUsize::new(0),
            fetch_requests: AtomicUsize::new(0),
            empty_fetches: AtomicUsize::new(0),
            served_per_crawl: Arc::new(dashmap::DashMap::new()),
            queues_created: AtomicUsize::new(0),
            queues_deleted: AtomicUsize::new(0),
            crawls_deleted: AtomicUsize::new(0),
            checkpoints_saved: AtomicUsize::new(0),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let mut served: HashMap<String, usize> = HashMap::new();
        for entry in self.served_per_crawl.iter() {
            let (crawl, count) = entry.pair();
            served.insert(crawl.clone(), *count);
        }

        StatsSnapshot {
            items_received: self.items_received.load(Ordering::SeqCst),
            acked_ok: self.acked_ok.load(Ordering::SeqCst),
            acked_skipped: self.acked_skipped.load(Ordering::SeqCst),
            acked_failed: self.acked_failed.load(Ordering::SeqCst),
            urls_served: self.urls_served.load(Ordering::SeqCst),
            urls_completed: self.urls_completed.load(Ordering::SeqCst),
            fetch_requests: self.fetch_requests.load(Ordering::SeqCst),
            empty_fetches: self.empty_fetches.load(Ordering::SeqCst),
            queues_created: self.queues_created.load(Ordering::SeqCst),
            queues_deleted: self.queues_deleted.load(Ordering::SeqCst),
            crawls_deleted: self.crawls_deleted.load(Ordering::SeqCst),
            checkpoints_saved: self.checkpoints_saved.load(Ordering::SeqCst),
            served_per_crawl: served,
            elapsed: self.start_time.elapsed(),
        }
    }

    pub(crate) fn increment_items_received(&self) {
        self.items_received.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_acked_ok(&self) {
        self.acked_ok.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_acked_skipped(&self) {
        self.acked_skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_acked_failed(&self) {
        self.acked_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_served(&self, crawl_id: &str) {
        self.urls_served.fetch_add(1, Ordering::SeqCst);
        *self
            .served_per_crawl
            .entry(crawl_id.to_string())
            .or_insert(0) += 1;
    }

    pub(crate) fn increment_urls_completed(&self) {
        self.urls_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_fetch_requests(&self) {
        self.fetch_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_empty_fetches(&self) {
        self.empty_fetches.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_queues_created(&self) {
        self.queues_created.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn add_queues_deleted(&self, count: usize) {
        self.queues_deleted.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn increment_crawls_deleted(&self) {
        self.crawls_deleted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_checkpoints_saved(&self) {
        self.checkpoints_saved.fetch_add(1, Ordering::SeqCst);
    }

    /// Converts the counters into a JSON string.
    pub fn to_json_string(&self) -> Result<String, FrontierError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Converts the counters into a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String, FrontierError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Exports the current statistics to a Markdown formatted string.
    pub fn to_markdown_string(&self) -> String {
        let snapshot = self.snapshot();

        let per_crawl_list: String = {
            let mut rows: Vec<(&String, &usize)> = snapshot.served_per_crawl.iter().collect();
            rows.sort();
            rows.iter()
                .map(|(crawl, count)| format!("- **{}**: {}", crawl, count))
                .collect::<Vec<String>>()
                .join("\n")
        };
        let per_crawl_output = if per_crawl_list.is_empty() {
            "N/A".to_string()
        } else {
            per_crawl_list
        };

        format!(
            r#"# Frontier Statistics Report

- **Duration**: {}
- **Average Speed**: {:.2} item/s in, {:.2} url/s out

## Ingest
| Metric   | Count |
|----------|-------|
| Received | {}     |
| OK       | {}     |
| Skipped  | {}     |
| Failed   | {}     |

## Fetch
| Metric    | Count |
|-----------|-------|
| Requests  | {}     |
| Served    | {}     |
| Empty     | {}     |
| Completed | {}     |

## Lifecycle
| Metric      | Count |
|-------------|-------|
| Queues new  | {}     |
| Queues gone | {}     |
| Crawls gone | {}     |
| Checkpoints | {}     |

## Served per crawl
{}
"#,
            snapshot.formatted_duration(),
            snapshot.items_per_second(),
            snapshot.served_per_second(),
            snapshot.items_received,
            snapshot.acked_ok,
            snapshot.acked_skipped,
            snapshot.acked_failed,
            snapshot.fetch_requests,
            snapshot.urls_served,
            snapshot.empty_fetches,
            snapshot.urls_completed,
            snapshot.queues_created,
            snapshot.queues_deleted,
            snapshot.crawls_deleted,
            snapshot.checkpoints_saved,
            per_crawl_output
        )
    }
}

impl Default for FrontierStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FrontierStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nFrontier Statistics")?;
        writeln!(f, "-------------------")?;
        writeln!(f, "  duration : {}", snapshot.formatted_duration())?;
        writeln!(
            f,
            "  speed    : in: {:.2} item/s, out: {:.2} url/s",
            snapshot.items_per_second(),
            snapshot.served_per_second()
        )?;
        writeln!(
            f,
            "  ingest   : received: {}, ok: {}, skipped: {}, failed: {}",
            snapshot.items_received,
            snapshot.acked_ok,
            snapshot.acked_skipped,
            snapshot.acked_failed
        )?;
        writeln!(
            f,
            "  fetch    : requests: {}, served: {}, empty: {}, completed: {}",
            snapshot.fetch_requests,
            snapshot.urls_served,
            snapshot.empty_fetches,
            snapshot.urls_completed
        )?;
        writeln!(
            f,
            "  queues   : created: {}, deleted: {}, crawls deleted: {}, checkpoints: {}",
            snapshot.queues_created,
            snapshot.queues_deleted,
            snapshot.crawls_deleted,
            snapshot.checkpoints_saved
        )
    }
}
