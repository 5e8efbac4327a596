//! # Queue Directory Module
//!
//! In-memory index of all active queues and their scheduling metadata.
//!
//! ## Overview
//!
//! The directory answers the scheduler's question "which queue next?" and
//! the control surface's questions about queue state, without touching the
//! store. Structural changes (queue creation, deletion) take the
//! directory-wide write lock; everything else goes through the per-queue
//! mutex inside each [`QueueHandle`]. Those mutexes are never held across
//! store I/O.
//!
//! ## Fairness cursor
//!
//! The directory owns the round-robin cursor: candidate snapshots are
//! rotated to start strictly after the last-served queue, and serving a
//! queue advances the cursor to it. Queue ids are ordered, so a queue
//! created mid-scan slots into the rotation right where its id sorts.

use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use dashmap::DashMap;

use crate::config::CrawlLimits;
use crate::store::QueueCounts;
use crate::types::{EpochMillis, QueueStats, StatsSummary};

/// Identity of a queue: `(crawl_id, queue_key)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId {
    pub crawl_id: String,
    pub key: String,
}

impl QueueId {
    pub fn new(crawl_id: impl Into<String>, key: impl Into<String>) -> Self {
        QueueId {
            crawl_id: crawl_id.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.crawl_id, self.key)
    }
}

/// Scheduling eligibility of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// Eligible for scheduling.
    Active,
    /// Excluded from scheduling until resumed, manually or by the clock
    /// reaching `blocked_until`.
    Paused,
    /// Accepts no new URLs; scheduled entries still serve. Deleted once
    /// drained.
    Draining,
}

/// Mutable scheduling metadata of one queue.
#[derive(Debug, Clone)]
pub struct QueueMeta {
    pub status: QueueStatus,
    /// Earliest time a URL from this queue may be served (politeness).
    pub next_eligible_at: EpochMillis,
    pub blocked_until: Option<EpochMillis>,
    pub last_produced_at: Option<EpochMillis>,
    pub counts: QueueCounts,
}

impl QueueMeta {
    fn new() -> Self {
        QueueMeta {
            status: QueueStatus::Active,
            next_eligible_at: 0,
            blocked_until: None,
            last_produced_at: None,
            counts: QueueCounts::default(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.counts.active()
    }

    /// Clock-driven `Paused -> Active` transition.
    pub fn refresh_block(&mut self, now: EpochMillis) {
        if self.status == QueueStatus::Paused {
            if let Some(until) = self.blocked_until {
                if until <= now {
                    self.status = QueueStatus::Active;
                    self.blocked_until = None;
                }
            }
        }
    }

    /// Whether the scheduler may draw from this queue at `now`. Draining
    /// queues keep serving their remainder.
    pub fn eligible(&mut self, now: EpochMillis) -> bool {
        self.refresh_block(now);
        let serving = matches!(self.status, QueueStatus::Active | QueueStatus::Draining);
        serving
            && self.blocked_until.map(|t| t <= now).unwrap_or(true)
            && self.next_eligible_at <= now
            && self.counts.active() > 0
    }
}

/// A queue's metadata behind its own lock.
pub struct QueueHandle {
    meta: Mutex<QueueMeta>,
}

impl QueueHandle {
    fn new() -> Self {
        QueueHandle {
            meta: Mutex::new(QueueMeta::new()),
        }
    }

    pub fn meta(&self) -> MutexGuard<'_, QueueMeta> {
        self.meta.lock()
    }

    pub fn snapshot(&self) -> QueueMeta {
        self.meta.lock().clone()
    }
}

/// The queue index plus the fairness cursor and per-crawl limits.
pub struct QueueDirectory {
    queues: RwLock<BTreeMap<QueueId, Arc<QueueHandle>>>,
    cursor: Mutex<Option<QueueId>>,
    limits: DashMap<String, CrawlLimits>,
    defaults: CrawlLimits,
}

impl QueueDirectory {
    pub fn new(defaults: CrawlLimits) -> Self {
        QueueDirectory {
            queues: RwLock::new(BTreeMap::new()),
            cursor: Mutex::new(None),
            limits: DashMap::new(),
            defaults,
        }
    }

    /// Looks up a queue, creating it as `Active` when absent.
    pub fn ensure(&self, id: &QueueId) -> Arc<QueueHandle> {
        if let Some(handle) = self.queues.read().get(id) {
            return Arc::clone(handle);
        }
        let mut queues = self.queues.write();
        Arc::clone(
            queues
                .entry(id.clone())
                .or_insert_with(|| {
                    debug!("Created queue {}", id);
                    Arc::new(QueueHandle::new())
                }),
        )
    }

    pub fn get(&self, id: &QueueId) -> Option<Arc<QueueHandle>> {
        self.queues.read().get(id).map(Arc::clone)
    }

    pub fn remove(&self, id: &QueueId) -> Option<Arc<QueueHandle>> {
        self.queues.write().remove(id)
    }

    /// Removes every queue of a crawl and its limit override. Returns the
    /// removed ids.
    pub fn remove_crawl(&self, crawl_id: &str) -> Vec<QueueId> {
        let mut queues = self.queues.write();
        let ids: Vec<QueueId> = queues
            .keys()
            .filter(|id| id.crawl_id == crawl_id)
            .cloned()
            .collect();
        for id in &ids {
            queues.remove(id);
        }
        drop(queues);
        self.limits.remove(crawl_id);
        ids
    }

    pub fn len(&self) -> usize {
        self.queues.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.read().is_empty()
    }

    pub fn crawl_ids(&self) -> Vec<String> {
        let queues = self.queues.read();
        let set: BTreeSet<&str> = queues.keys().map(|id| id.crawl_id.as_str()).collect();
        set.into_iter().map(|s| s.to_string()).collect()
    }

    /// Snapshot of queues matching the filters, rotated so iteration starts
    /// strictly after the fairness cursor.
    pub fn candidates(
        &self,
        crawl_id: Option<&str>,
        key: Option<&str>,
    ) -> Vec<(QueueId, Arc<QueueHandle>)> {
        let cursor = self.cursor.lock().clone();
        let queues = self.queues.read();

        let matching: Vec<(QueueId, Arc<QueueHandle>)> = queues
            .iter()
            .filter(|(id, _)| {
                crawl_id.map(|c| id.crawl_id == c).unwrap_or(true)
                    && key.map(|k| id.key == k).unwrap_or(true)
            })
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();
        drop(queues);

        match cursor {
            Some(cursor) => {
                let split = matching
                    .iter()
                    .position(|(id, _)| *id > cursor)
                    .unwrap_or(matching.len());
                let mut rotated = Vec::with_capacity(matching.len());
                rotated.extend_from_slice(&matching[split..]);
                rotated.extend_from_slice(&matching[..split]);
                rotated
            }
            None => matching,
        }
    }

    /// Marks a queue as the most recently served one.
    pub fn advance_cursor(&self, id: &QueueId) {
        *self.cursor.lock() = Some(id.clone());
    }

    pub fn limits_for(&self, crawl_id: &str) -> CrawlLimits {
        self.limits
            .get(crawl_id)
            .map(|l| *l.value())
            .unwrap_or(self.defaults)
    }

    pub fn set_limits(&self, crawl_id: &str, limits: CrawlLimits) {
        self.limits.insert(crawl_id.to_string(), limits);
    }

    /// Aggregate counters, optionally restricted to one crawl.
    pub fn stats_summary(&self, crawl_id: Option<&str>) -> StatsSummary {
        let queues = self.queues.read();
        let mut summary = StatsSummary::default();
        for (id, handle) in queues.iter() {
            if crawl_id.map(|c| id.crawl_id == c).unwrap_or(true) {
                let meta = handle.snapshot();
                summary.queues += 1;
                summary.active += meta.counts.active();
                summary.in_flight += meta.counts.in_flight;
                summary.completed += meta.counts.completed;
            }
        }
        summary
    }

    /// Per-queue stats rows for one crawl. Queues with no live URLs are
    /// omitted unless `include_inactive` is set.
    pub fn queue_stats(&self, crawl_id: &str, include_inactive: bool) -> Vec<QueueStats> {
        let queues = self.queues.read();
        queues
            .iter()
            .filter(|(id, _)| id.crawl_id == crawl_id)
            .filter_map(|(id, handle)| {
                let meta = handle.snapshot();
                if meta.counts.active() == 0 && !include_inactive {
                    return None;
                }
                Some(QueueStats {
                    crawl_id: id.crawl_id.clone(),
                    key: id.key.clone(),
                    active_count: meta.counts.active(),
                    in_flight: meta.counts.in_flight,
                    completed_count: meta.counts.completed,
                    last_produced_at: meta.last_produced_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> QueueDirectory {
        QueueDirectory::new(CrawlLimits::new(1_000))
    }

    fn seeded(ids: &[(&str, &str)]) -> QueueDirectory {
        let dir = directory();
        for (crawl, key) in ids {
            dir.ensure(&QueueId::new(*crawl, *key));
        }
        dir
    }

    #[test]
    fn ensure_creates_once() {
        let dir = directory();
        let id = QueueId::new("c", "a.com");
        let first = dir.ensure(&id);
        let second = dir.ensure(&id);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn candidates_rotate_from_cursor() {
        let dir = seeded(&[("c", "a.com"), ("c", "b.com"), ("c", "d.com")]);

        let order: Vec<String> = dir
            .candidates(None, None)
            .into_iter()
            .map(|(id, _)| id.key)
            .collect();
        assert_eq!(order, vec!["a.com", "b.com", "d.com"]);

        dir.advance_cursor(&QueueId::new("c", "b.com"));
        let order: Vec<String> = dir
            .candidates(None, None)
            .into_iter()
            .map(|(id, _)| id.key)
            .collect();
        assert_eq!(order, vec!["d.com", "a.com", "b.com"]);
    }

    #[test]
    fn cursor_on_deleted_queue_still_rotates() {
        let dir = seeded(&[("c", "a.com"), ("c", "b.com"), ("c", "d.com")]);
        dir.advance_cursor(&QueueId::new("c", "b.com"));
        dir.remove(&QueueId::new("c", "b.com"));

        let order: Vec<String> = dir
            .candidates(None, None)
            .into_iter()
            .map(|(id, _)| id.key)
            .collect();
        assert_eq!(order, vec!["d.com", "a.com"]);
    }

    #[test]
    fn candidates_respect_filters() {
        let dir = seeded(&[("a", "x.com"), ("b", "x.com"), ("b", "y.com")]);
        assert_eq!(dir.candidates(Some("b"), None).len(), 2);
        assert_eq!(dir.candidates(Some("b"), Some("y.com")).len(), 1);
        assert_eq!(dir.candidates(Some("missing"), None).len(), 0);
    }

    #[test]
    fn eligibility_requires_active_urls_and_politeness() {
        let dir = directory();
        let handle = dir.ensure(&QueueId::new("c", "a.com"));
        let mut meta = handle.snapshot();

        assert!(!meta.eligible(100), "empty queue must not be eligible");

        meta.counts.scheduled = 1;
        assert!(meta.eligible(100));

        meta.next_eligible_at = 200;
        assert!(!meta.eligible(100));
        assert!(meta.eligible(200));
    }

    #[test]
    fn blocked_queue_resumes_when_clock_passes() {
        let mut meta = QueueMeta::new();
        meta.counts.scheduled = 1;
        meta.status = QueueStatus::Paused;
        meta.blocked_until = Some(500);

        assert!(!meta.eligible(499));
        assert!(meta.eligible(500));
        assert_eq!(meta.status, QueueStatus::Active);
        assert!(meta.blocked_until.is_none());
    }

    #[test]
    fn manually_paused_queue_stays_paused() {
        let mut meta = QueueMeta::new();
        meta.counts.scheduled = 1;
        meta.status = QueueStatus::Paused;
        assert!(!meta.eligible(u64::MAX));
    }

    #[test]
    fn draining_queue_keeps_serving() {
        let mut meta = QueueMeta::new();
        meta.counts.scheduled = 1;
        meta.status = QueueStatus::Draining;
        assert!(meta.eligible(1));
    }

    #[test]
    fn limits_fall_back_to_defaults() {
        let dir = directory();
        assert_eq!(dir.limits_for("c").min_delay_ms, 1_000);
        dir.set_limits(
            "c",
            CrawlLimits {
                min_delay_ms: 250,
                max_queue_size: Some(10),
            },
        );
        assert_eq!(dir.limits_for("c").min_delay_ms, 250);
        dir.remove_crawl("c");
        assert_eq!(dir.limits_for("c").min_delay_ms, 1_000);
    }

    #[test]
    fn stats_aggregate_per_crawl() {
        let dir = seeded(&[("a", "x.com"), ("a", "y.com"), ("b", "z.com")]);
        {
            let handle = dir.get(&QueueId::new("a", "x.com")).unwrap();
            let mut meta = handle.meta();
            meta.counts.scheduled = 3;
            meta.counts.in_flight = 1;
            meta.counts.completed = 2;
        }

        let all = dir.stats_summary(None);
        assert_eq!(all.queues, 3);
        assert_eq!(all.active, 4);

        let a = dir.stats_summary(Some("a"));
        assert_eq!(a.queues, 2);
        assert_eq!(a.in_flight, 1);
        assert_eq!(a.completed, 2);

        let rows = dir.queue_stats("a", false);
        assert_eq!(rows.len(), 1, "empty queues are hidden by default");
        let rows = dir.queue_stats("a", true);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn crawl_ids_are_deduplicated_and_sorted() {
        let dir = seeded(&[("b", "x.com"), ("a", "x.com"), ("a", "y.com")]);
        assert_eq!(dir.crawl_ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
