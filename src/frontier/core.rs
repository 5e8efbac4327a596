//! The core Frontier implementation.
//!
//! This module defines the `Frontier` struct, the central coordinator of
//! the engine. It ties together the queue store, the queue directory, the
//! known-URL cache and the striped write locks, exposes the two streaming
//! operations (`put_urls`, `get_urls`) and the synchronous control surface,
//! and drives periodic checkpointing.
//!
//! It utilizes a task-based asynchronous model: every ingest stream and
//! every fetch request runs as its own Tokio task against the shared engine
//! state.

use kanal::{AsyncReceiver, bounded_async};
use moka::sync::Cache;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::concurrency::StripedLocks;
use crate::config::{CrawlLimits, FrontierConfig};
use crate::directory::{QueueDirectory, QueueHandle, QueueId, QueueStatus};
use crate::error::FrontierError;
use crate::key;
use crate::state::EngineState;
use crate::stats::FrontierStats;
use crate::store::QueueStore;
use crate::types::{
    AckMessage, EpochMillis, GetParams, QueueStats, StatsSummary, UrlInfo, UrlItem, now_millis,
};

const KNOWN_CACHE_CAPACITY: u64 = 100_000;
const ACK_CHANNEL_CAPACITY: usize = 256;

/// Engine internals shared by every stream task.
pub(crate) struct EngineShared {
    pub(crate) store: Arc<dyn QueueStore>,
    pub(crate) directory: Arc<QueueDirectory>,
    pub(crate) state: Arc<EngineState>,
    pub(crate) stats: Arc<FrontierStats>,
    pub(crate) url_locks: StripedLocks,
    pub(crate) config: FrontierConfig,
    /// Hot positive-only cache in front of the store's exact known-set.
    known_cache: Cache<String, bool>,
}

impl EngineShared {
    fn known_key(crawl_id: &str, url: &str) -> String {
        format!("{}\u{0}{}", crawl_id, url)
    }

    /// Known-set lookup through the cache. Only positive answers are
    /// cached, so a miss always consults the store.
    pub(crate) async fn is_known_cached(
        &self,
        crawl_id: &str,
        url: &str,
    ) -> Result<bool, FrontierError> {
        let cache_key = Self::known_key(crawl_id, url);
        if self.known_cache.contains_key(&cache_key) {
            return Ok(true);
        }
        let known = self.store.is_known(crawl_id, url).await?;
        if known {
            self.known_cache.insert(cache_key, true);
        }
        Ok(known)
    }

    pub(crate) fn remember_known(&self, crawl_id: &str, url: &str) {
        self.known_cache.insert(Self::known_key(crawl_id, url), true);
    }

    /// Looks up or creates a queue, counting creations.
    pub(crate) fn ensure_queue(&self, queue_id: &QueueId) -> Arc<QueueHandle> {
        if let Some(handle) = self.directory.get(queue_id) {
            return handle;
        }
        let handle = self.directory.ensure(queue_id);
        self.stats.increment_queues_created();
        handle
    }

    /// Re-reads a queue's authoritative counts from the store.
    pub(crate) async fn sync_queue_counts(&self, queue_id: &QueueId) -> Result<(), FrontierError> {
        let counts = self
            .store
            .queue_counts(&queue_id.crawl_id, &queue_id.key)
            .await?;
        if let Some(handle) = self.directory.get(queue_id) {
            handle.meta().counts = counts;
        }
        Ok(())
    }

    /// Removes a URL from its queue; drops the queue when it was draining
    /// and this was its last live entry.
    pub(crate) async fn complete_url(
        &self,
        queue_id: &QueueId,
        url: &str,
    ) -> Result<bool, FrontierError> {
        let removed = self
            .store
            .mark_completed(&queue_id.crawl_id, &queue_id.key, url)
            .await?;
        if removed {
            self.sync_queue_counts(queue_id).await?;
            self.stats.increment_urls_completed();
            self.drop_if_drained(queue_id).await?;
        }
        Ok(removed)
    }

    async fn drop_if_drained(&self, queue_id: &QueueId) -> Result<(), FrontierError> {
        let Some(handle) = self.directory.get(queue_id) else {
            return Ok(());
        };
        let drained = {
            let meta = handle.meta();
            meta.status == QueueStatus::Draining && meta.counts.active() == 0
        };
        if drained {
            self.directory.remove(queue_id);
            self.store
                .delete_queue(&queue_id.crawl_id, &queue_id.key)
                .await?;
            self.stats.add_queues_deleted(1);
            debug!("Dropped drained queue {}", queue_id);
        }
        Ok(())
    }
}

/// The frontier engine: accepts URL streams, deduplicates and persists
/// them, and serves ready URLs under politeness and fairness constraints.
pub struct Frontier {
    shared: Arc<EngineShared>,
    checkpoint_task: Mutex<Option<JoinHandle<()>>>,
}

impl Frontier {
    pub(crate) fn new(
        store: Arc<dyn QueueStore>,
        directory: Arc<QueueDirectory>,
        config: FrontierConfig,
    ) -> Self {
        Frontier {
            shared: Arc::new(EngineShared {
                store,
                directory,
                state: EngineState::new(),
                stats: Arc::new(FrontierStats::new()),
                url_locks: StripedLocks::default(),
                known_cache: Cache::builder().max_capacity(KNOWN_CACHE_CAPACITY).build(),
                config,
            }),
            checkpoint_task: Mutex::new(None),
        }
    }

    /// Opens an ingest stream: items read from `items` are deduplicated,
    /// persisted and acked exactly once each on the returned channel. The
    /// ack channel closes after the caller half-closes `items` and all
    /// in-flight writes have drained.
    pub fn put_urls(
        &self,
        items: AsyncReceiver<UrlItem>,
    ) -> Result<AsyncReceiver<AckMessage>, FrontierError> {
        if self.shared.state.is_read_only() {
            return Err(FrontierError::ReadOnly);
        }
        self.admit_stream()?;
        self.shared.state.ingest_streams.fetch_add(1, Ordering::SeqCst);

        let (ack_tx, ack_rx) = bounded_async(ACK_CHANNEL_CAPACITY);
        super::spawn_ingest_task(Arc::clone(&self.shared), items, ack_tx);
        Ok(ack_rx)
    }

    /// Requests ready URLs; the stream closes when the caps are reached,
    /// no more eligible URLs exist, or the deadline expires.
    pub fn get_urls(&self, params: GetParams) -> Result<AsyncReceiver<UrlInfo>, FrontierError> {
        self.get_urls_at(params, now_millis())
    }

    /// Deterministic variant of [`get_urls`](Self::get_urls): evaluates the
    /// request as of the supplied wall-clock time. Used for replay and in
    /// tests; production callers use `get_urls`.
    pub fn get_urls_at(
        &self,
        params: GetParams,
        now: EpochMillis,
    ) -> Result<AsyncReceiver<UrlInfo>, FrontierError> {
        if self.shared.state.is_read_only() {
            return Err(FrontierError::ReadOnly);
        }
        self.admit_stream()?;
        self.shared.state.fetch_streams.fetch_add(1, Ordering::SeqCst);

        let (out_tx, out_rx) = bounded_async(params.max_urls.clamp(1, 1_024));
        super::spawn_fetch_task(Arc::clone(&self.shared), params, now, out_tx);
        Ok(out_rx)
    }

    fn admit_stream(&self) -> Result<(), FrontierError> {
        let open = self.shared.state.open_streams();
        if open >= self.shared.config.max_concurrent_streams {
            warn!("Rejecting stream, {} already open", open);
            return Err(FrontierError::Capacity(format!(
                "{} streams already open",
                open
            )));
        }
        Ok(())
    }

    /// Signals that a served URL was successfully processed, removing it
    /// from its queue. The queue key is derived from the URL when not
    /// given.
    pub async fn mark_completed(
        &self,
        crawl_id: &str,
        queue_key: Option<&str>,
        url: &str,
    ) -> Result<bool, FrontierError> {
        let key = match queue_key {
            Some(key) => key.to_string(),
            None => {
                let parsed = Url::parse(url)
                    .map_err(|e| FrontierError::Validation(format!("malformed URL {}: {}", url, e)))?;
                key::queue_key(&parsed).ok_or_else(|| {
                    FrontierError::Validation(format!("no queue key derivable from {}", url))
                })?
            }
        };
        let queue_id = QueueId::new(crawl_id, key);
        let _guard = self.shared.url_locks.lock(crawl_id, url).await;
        self.shared.complete_url(&queue_id, url).await
    }

    // --- control surface -------------------------------------------------

    /// All crawl ids with at least one queue.
    pub fn list_crawls(&self) -> Vec<String> {
        self.shared.directory.crawl_ids()
    }

    /// Addresses of the frontier nodes backing this service. A single
    /// engine reports itself.
    pub fn list_nodes(&self) -> Vec<String> {
        vec![format!(
            "{}:{}",
            self.shared.config.host, self.shared.config.port
        )]
    }

    /// Streams per-queue stats for one crawl.
    pub fn list_queues(
        &self,
        crawl_id: &str,
        include_inactive: bool,
    ) -> AsyncReceiver<QueueStats> {
        let rows = self.shared.directory.queue_stats(crawl_id, include_inactive);
        let (tx, rx) = bounded_async(rows.len().max(1));
        tokio::spawn(async move {
            for row in rows {
                if tx.send(row).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    /// Aggregate counters, engine-wide or for one crawl.
    pub fn get_stats(&self, crawl_id: Option<&str>) -> StatsSummary {
        self.shared.directory.stats_summary(crawl_id)
    }

    /// Pauses a queue until the given time; the clock resumes it.
    pub fn block_queue_until(
        &self,
        crawl_id: &str,
        queue_key: &str,
        until: EpochMillis,
    ) -> Result<(), FrontierError> {
        let queue_id = QueueId::new(crawl_id, queue_key);
        let handle = self.queue_handle(&queue_id)?;
        let mut meta = handle.meta();
        meta.blocked_until = Some(until);
        if meta.status == QueueStatus::Active && until > now_millis() {
            meta.status = QueueStatus::Paused;
        }
        info!("Blocked queue {} until {}", queue_id, until);
        Ok(())
    }

    /// Pauses a queue until explicitly resumed.
    pub fn pause_queue(&self, crawl_id: &str, queue_key: &str) -> Result<(), FrontierError> {
        let queue_id = QueueId::new(crawl_id, queue_key);
        let handle = self.queue_handle(&queue_id)?;
        let mut meta = handle.meta();
        meta.status = QueueStatus::Paused;
        meta.blocked_until = None;
        info!("Paused queue {}", queue_id);
        Ok(())
    }

    pub fn resume_queue(&self, crawl_id: &str, queue_key: &str) -> Result<(), FrontierError> {
        let queue_id = QueueId::new(crawl_id, queue_key);
        let handle = self.queue_handle(&queue_id)?;
        let mut meta = handle.meta();
        meta.status = QueueStatus::Active;
        meta.blocked_until = None;
        info!("Resumed queue {}", queue_id);
        Ok(())
    }

    /// Stops a queue from accepting new URLs; its remainder keeps serving
    /// and the queue is deleted once empty.
    pub fn drain_queue(&self, crawl_id: &str, queue_key: &str) -> Result<(), FrontierError> {
        let queue_id = QueueId::new(crawl_id, queue_key);
        let handle = self.queue_handle(&queue_id)?;
        handle.meta().status = QueueStatus::Draining;
        info!("Draining queue {}", queue_id);
        Ok(())
    }

    /// Sets the politeness delay and optional queue size cap for a crawl.
    pub fn set_crawl_limits(
        &self,
        crawl_id: &str,
        min_delay_ms: EpochMillis,
        max_queue_size: Option<u64>,
    ) {
        self.shared.directory.set_limits(
            crawl_id,
            CrawlLimits {
                min_delay_ms,
                max_queue_size,
            },
        );
        info!(
            "Crawl {} limits: min_delay={}ms, max_queue_size={:?}",
            crawl_id, min_delay_ms, max_queue_size
        );
    }

    /// Deletes one queue; returns the number of live URLs removed.
    pub async fn delete_queue(
        &self,
        crawl_id: &str,
        queue_key: &str,
    ) -> Result<u64, FrontierError> {
        let queue_id = QueueId::new(crawl_id, queue_key);
        self.shared.directory.remove(&queue_id);
        let removed = self.shared.store.delete_queue(crawl_id, queue_key).await?;
        self.shared.stats.add_queues_deleted(1);
        info!("Deleted queue {} ({} URLs)", queue_id, removed);
        Ok(removed)
    }

    /// Deletes every queue and the known-set of a crawl; returns the number
    /// of live URLs removed.
    pub async fn delete_crawl(&self, crawl_id: &str) -> Result<u64, FrontierError> {
        let removed_queues = self.shared.directory.remove_crawl(crawl_id);
        let removed = self.shared.store.delete_crawl(crawl_id).await?;
        // The cache only holds positives; wholesale invalidation is the
        // only way to forget a crawl's URLs.
        self.shared.known_cache.invalidate_all();
        self.shared.stats.add_queues_deleted(removed_queues.len());
        self.shared.stats.increment_crawls_deleted();
        info!(
            "Deleted crawl {}: {} queues, {} URLs",
            crawl_id,
            removed_queues.len(),
            removed
        );
        Ok(removed)
    }

    /// Flushes the store to its durable medium.
    pub async fn checkpoint(&self) -> Result<(), FrontierError> {
        self.shared.store.checkpoint().await?;
        self.shared.stats.increment_checkpoints_saved();
        Ok(())
    }

    /// False once a fatal store error has put the engine in read-only mode.
    pub fn is_healthy(&self) -> bool {
        !self.shared.state.is_read_only()
    }

    /// Engine-wide metric collector.
    pub fn stats(&self) -> Arc<FrontierStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Starts the background task that checkpoints every `interval`.
    pub(crate) fn start_periodic_checkpoints(&self, interval: Duration) {
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;
            loop {
                timer.tick().await;
                match shared.store.checkpoint().await {
                    Ok(()) => {
                        shared.stats.increment_checkpoints_saved();
                        debug!("Periodic checkpoint saved");
                    }
                    Err(e) => error!("Periodic checkpoint failed: {}", e),
                }
            }
        });
        *self.checkpoint_task.lock() = Some(task);
    }

    /// Stops background work and takes a final checkpoint.
    pub async fn shutdown(&self) -> Result<(), FrontierError> {
        if let Some(task) = self.checkpoint_task.lock().take() {
            task.abort();
        }
        info!("Frontier shutting down, taking final checkpoint");
        self.checkpoint().await
    }

    fn queue_handle(&self, queue_id: &QueueId) -> Result<Arc<QueueHandle>, FrontierError> {
        self.shared
            .directory
            .get(queue_id)
            .ok_or_else(|| FrontierError::UnknownQueue {
                crawl_id: queue_id.crawl_id.clone(),
                queue_key: queue_id.key.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FrontierBuilder;
    use crate::types::{AckStatus, UrlInfo, UrlItemKind};
    use std::collections::BTreeSet;

    async fn frontier() -> Frontier {
        FrontierBuilder::new().build().await.unwrap()
    }

    fn discovered(crawl: &str, url: &str) -> UrlItem {
        UrlItem::discovered(UrlInfo::new(url, crawl))
    }

    async fn ingest(frontier: &Frontier, items: Vec<UrlItem>) -> Vec<AckMessage> {
        let (tx, rx) = kanal::unbounded_async();
        let acks = frontier.put_urls(rx).unwrap();
        for item in items {
            tx.send(item).await.unwrap();
        }
        drop(tx);

        let mut out = Vec::new();
        while let Ok(ack) = acks.recv().await {
            out.push(ack);
        }
        out
    }

    async fn drain(rx: AsyncReceiver<UrlInfo>) -> Vec<UrlInfo> {
        let mut out = Vec::new();
        while let Ok(info) = rx.recv().await {
            out.push(info);
        }
        out
    }

    fn count(acks: &[AckMessage], status: AckStatus) -> usize {
        acks.iter().filter(|a| a.status == status).count()
    }

    #[tokio::test]
    async fn duplicate_discoveries_are_skipped() {
        let engine = frontier().await;
        let acks = ingest(
            &engine,
            vec![
                discovered("default", "http://a.com/x"),
                discovered("default", "http://a.com/x"),
                discovered("default", "http://a.com/x"),
            ],
        )
        .await;

        assert_eq!(acks.len(), 3);
        assert_eq!(count(&acks, AckStatus::Ok), 1);
        assert_eq!(count(&acks, AckStatus::Skipped), 2);

        let now = now_millis() + 60_000;
        let urls = drain(engine.get_urls_at(GetParams::new(10, 10), now).unwrap()).await;
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].url, "http://a.com/x");
        assert_eq!(urls[0].key.as_deref(), Some("a.com"));
    }

    #[tokio::test]
    async fn politeness_spaces_out_serves_from_one_queue() {
        let engine = frontier().await;
        let items = (0..5)
            .map(|i| discovered("default", &format!("http://b.com/{}", i)))
            .collect();
        let acks = ingest(&engine, items).await;
        assert_eq!(count(&acks, AckStatus::Ok), 5);

        let t = now_millis() + 60_000;
        let first = drain(engine.get_urls_at(GetParams::new(5, 1), t).unwrap()).await;
        assert_eq!(first.len(), 1, "1s politeness yields one URL per visit");

        let too_soon = drain(engine.get_urls_at(GetParams::new(5, 1), t + 300).unwrap()).await;
        assert_eq!(too_soon.len(), 0);

        let later = drain(engine.get_urls_at(GetParams::new(5, 1), t + 1_001).unwrap()).await;
        assert_eq!(later.len(), 1);
        assert_ne!(later[0].url, first[0].url);
    }

    #[tokio::test]
    async fn zero_delay_crawl_drains_up_to_the_per_queue_cap() {
        let engine = frontier().await;
        engine.set_crawl_limits("bulk", 0, None);
        let items = (0..4)
            .map(|i| discovered("bulk", &format!("http://b.com/{}", i)))
            .collect();
        ingest(&engine, items).await;

        let t = now_millis() + 60_000;
        let urls = drain(engine.get_urls_at(GetParams::new(4, 1), t).unwrap()).await;
        assert_eq!(urls.len(), 4);
    }

    #[tokio::test]
    async fn fairness_spreads_across_queues() {
        let engine = frontier().await;
        let mut items = Vec::new();
        for host in 1..=5 {
            for page in 0..2 {
                items.push(discovered(
                    "default",
                    &format!("http://host{}.com/{}", host, page),
                ));
            }
        }
        let acks = ingest(&engine, items).await;
        assert_eq!(count(&acks, AckStatus::Ok), 10);

        let t = now_millis() + 60_000;
        let first = drain(engine.get_urls_at(GetParams::new(5, 5), t).unwrap()).await;
        assert_eq!(first.len(), 5);
        let hosts: BTreeSet<String> = first.iter().filter_map(|u| u.key.clone()).collect();
        assert_eq!(hosts.len(), 5, "each host contributes exactly one URL");

        let second = drain(engine.get_urls_at(GetParams::new(5, 5), t + 1_100).unwrap()).await;
        assert_eq!(second.len(), 5);
        let hosts: BTreeSet<String> = second.iter().filter_map(|u| u.key.clone()).collect();
        assert_eq!(hosts.len(), 5);

        let third = drain(engine.get_urls_at(GetParams::new(5, 5), t + 2_200).unwrap()).await;
        assert!(third.is_empty(), "everything is in flight now");
    }

    #[tokio::test]
    async fn unacked_urls_are_served_again_after_the_reservation_expires() {
        let engine = frontier().await;
        ingest(&engine, vec![discovered("default", "http://c.com/y")]).await;

        let t = now_millis() + 60_000;
        let first = drain(engine.get_urls_at(GetParams::new(1, 1), t).unwrap()).await;
        assert_eq!(first.len(), 1);

        // Reservation is 30s; nothing comes back before it expires.
        let early = drain(engine.get_urls_at(GetParams::new(1, 1), t + 29_000).unwrap()).await;
        assert!(early.is_empty());

        let again = drain(engine.get_urls_at(GetParams::new(1, 1), t + 31_000).unwrap()).await;
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].url, "http://c.com/y");
    }

    #[tokio::test]
    async fn known_replay_is_served_at_its_time() {
        let engine = frontier().await;
        let t = now_millis() + 60_000;
        let item = UrlItem::known(UrlInfo::new("http://d.com/z", "default"), t + 3_600_000);
        let acks = ingest(&engine, vec![item]).await;
        assert_eq!(count(&acks, AckStatus::Ok), 1);

        let early = drain(engine.get_urls_at(GetParams::new(10, 10), t).unwrap()).await;
        assert!(early.is_empty());

        let due = drain(
            engine
                .get_urls_at(GetParams::new(10, 10), t + 3_601_000)
                .unwrap(),
        )
        .await;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].url, "http://d.com/z");
    }

    #[tokio::test]
    async fn known_with_zero_time_completes_the_url() {
        let engine = frontier().await;
        ingest(&engine, vec![discovered("default", "http://e.com/done")]).await;
        assert_eq!(engine.get_stats(Some("default")).active, 1);

        let done = UrlItem::known(UrlInfo::new("http://e.com/done", "default"), 0);
        let acks = ingest(&engine, vec![done]).await;
        assert_eq!(count(&acks, AckStatus::Ok), 1);

        let stats = engine.get_stats(Some("default"));
        assert_eq!(stats.active, 0);
        assert_eq!(stats.completed, 1);

        // Still known: re-discovery is a no-op.
        let acks = ingest(&engine, vec![discovered("default", "http://e.com/done")]).await;
        assert_eq!(count(&acks, AckStatus::Skipped), 1);
    }

    #[tokio::test]
    async fn crawls_are_isolated() {
        let engine = frontier().await;
        let acks = ingest(
            &engine,
            vec![discovered("A", "http://e.com"), discovered("B", "http://e.com")],
        )
        .await;
        assert_eq!(count(&acks, AckStatus::Ok), 2);
        assert_eq!(engine.list_crawls(), vec!["A".to_string(), "B".to_string()]);

        let removed = engine.delete_crawl("A").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(engine.list_crawls(), vec!["B".to_string()]);
        assert_eq!(engine.get_stats(Some("B")).active, 1);

        // Crawl A's known-set is gone with it.
        let acks = ingest(&engine, vec![discovered("A", "http://e.com")]).await;
        assert_eq!(count(&acks, AckStatus::Ok), 1);
    }

    #[tokio::test]
    async fn every_item_is_acked_exactly_once() {
        let engine = frontier().await;
        let items = vec![
            discovered("c", "http://ok.com/1"),
            discovered("c", ""),
            discovered("", "http://no-crawl.com"),
            discovered("c", "not a url"),
            discovered("c", "mailto:nobody@example.com"),
            discovered("c", "http://ok.com/1"),
        ];
        let total = items.len();
        let acks = ingest(&engine, items).await;

        assert_eq!(acks.len(), total);
        assert_eq!(count(&acks, AckStatus::Ok), 1);
        assert_eq!(count(&acks, AckStatus::Skipped), 1);
        assert_eq!(count(&acks, AckStatus::Fail), 4);
    }

    #[tokio::test]
    async fn drained_urls_match_ingested_urls() {
        let engine = frontier().await;
        let mut expected = BTreeSet::new();
        let mut items = Vec::new();
        for host in 0..3 {
            for page in 0..3 {
                let url = format!("http://site{}.com/{}", host, page);
                expected.insert(url.clone());
                items.push(discovered("default", &url));
            }
        }
        ingest(&engine, items).await;

        let mut seen = BTreeSet::new();
        let mut now = now_millis() + 60_000;
        // Complete each URL as it arrives so the drain terminates.
        for _ in 0..16 {
            let urls = drain(engine.get_urls_at(GetParams::new(10, 10), now).unwrap()).await;
            for info in urls {
                assert!(seen.insert(info.url.clone()), "URL served twice: {}", info.url);
                engine
                    .mark_completed("default", info.key.as_deref(), &info.url)
                    .await
                    .unwrap();
            }
            if seen.len() == expected.len() {
                break;
            }
            now += 1_100;
        }
        assert_eq!(seen, expected);
        assert_eq!(engine.get_stats(None).active, 0);
    }

    #[tokio::test]
    async fn queue_size_limit_rejects_discovered_overflow() {
        let engine = frontier().await;
        engine.set_crawl_limits("c", 1_000, Some(2));

        let acks = ingest(
            &engine,
            vec![
                discovered("c", "http://f.com/1"),
                discovered("c", "http://f.com/2"),
                discovered("c", "http://f.com/3"),
            ],
        )
        .await;
        assert_eq!(count(&acks, AckStatus::Ok), 2);
        assert_eq!(count(&acks, AckStatus::Fail), 1);
    }

    #[tokio::test]
    async fn paused_queue_rejects_ingest_and_serves_nothing() {
        let engine = frontier().await;
        ingest(&engine, vec![discovered("c", "http://g.com/1")]).await;
        engine.pause_queue("c", "g.com").unwrap();

        let acks = ingest(&engine, vec![discovered("c", "http://g.com/2")]).await;
        assert_eq!(count(&acks, AckStatus::Fail), 1);

        let t = now_millis() + 60_000;
        assert!(drain(engine.get_urls_at(GetParams::new(5, 5), t).unwrap()).await.is_empty());

        engine.resume_queue("c", "g.com").unwrap();
        let urls = drain(engine.get_urls_at(GetParams::new(5, 5), t).unwrap()).await;
        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn blocked_queue_resumes_by_clock() {
        let engine = frontier().await;
        ingest(&engine, vec![discovered("c", "http://h.com/1")]).await;

        let t = now_millis() + 60_000;
        engine.block_queue_until("c", "h.com", t + 5_000).unwrap();

        assert!(drain(engine.get_urls_at(GetParams::new(1, 1), t).unwrap()).await.is_empty());
        let urls = drain(engine.get_urls_at(GetParams::new(1, 1), t + 5_000).unwrap()).await;
        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn draining_queue_serves_remainder_then_disappears() {
        let engine = frontier().await;
        ingest(&engine, vec![discovered("c", "http://i.com/1")]).await;
        engine.drain_queue("c", "i.com").unwrap();

        let acks = ingest(&engine, vec![discovered("c", "http://i.com/2")]).await;
        assert_eq!(count(&acks, AckStatus::Fail), 1, "draining accepts no new URLs");

        let t = now_millis() + 60_000;
        let urls = drain(engine.get_urls_at(GetParams::new(1, 1), t).unwrap()).await;
        assert_eq!(urls.len(), 1);

        engine.mark_completed("c", Some("i.com"), &urls[0].url).await.unwrap();
        assert_eq!(engine.get_stats(Some("c")).queues, 0, "drained queue is deleted");
    }

    #[tokio::test]
    async fn explicit_queue_key_overrides_derivation() {
        let engine = frontier().await;
        let mut info = UrlInfo::new("http://j.com/1", "c");
        info.key = Some("custom-key".to_string());
        ingest(&engine, vec![UrlItem::discovered(info)]).await;

        let t = now_millis() + 60_000;
        let urls = drain(engine.get_urls_at(GetParams::new(1, 1), t).unwrap()).await;
        assert_eq!(urls[0].key.as_deref(), Some("custom-key"));
    }

    #[tokio::test]
    async fn fetch_filters_restrict_crawl_and_key() {
        let engine = frontier().await;
        ingest(
            &engine,
            vec![
                discovered("A", "http://k.com/1"),
                discovered("B", "http://k.com/1"),
                discovered("B", "http://l.com/1"),
            ],
        )
        .await;

        let t = now_millis() + 60_000;
        let params = GetParams::new(10, 10).for_crawl("B").for_key("l.com");
        let urls = drain(engine.get_urls_at(params, t).unwrap()).await;
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].key.as_deref(), Some("l.com"));
        assert_eq!(urls[0].crawl_id, "B");

        // l.com's URL is now in flight; only B's other queue has work left.
        let params = GetParams::new(10, 10).for_crawl("B");
        let urls = drain(engine.get_urls_at(params, t + 2_000).unwrap()).await;
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].key.as_deref(), Some("k.com"));

        let params = GetParams::new(10, 10).for_crawl("A");
        let urls = drain(engine.get_urls_at(params, t + 2_000).unwrap()).await;
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].crawl_id, "A");
    }

    #[tokio::test]
    async fn metadata_survives_the_round_trip() {
        let engine = frontier().await;
        let mut info = UrlInfo::new("http://m.com/1", "c");
        info.metadata
            .insert("depth".to_string(), vec!["2".to_string()]);
        ingest(&engine, vec![UrlItem::discovered(info)]).await;

        let t = now_millis() + 60_000;
        let urls = drain(engine.get_urls_at(GetParams::new(1, 1), t).unwrap()).await;
        assert_eq!(urls[0].metadata["depth"], vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn stream_admission_cap_is_enforced() {
        let engine = FrontierBuilder::new()
            .max_concurrent_streams(1)
            .build()
            .await
            .unwrap();

        let (_tx, rx) = kanal::unbounded_async::<UrlItem>();
        let _acks = engine.put_urls(rx).unwrap();
        assert!(matches!(
            engine.get_urls(GetParams::default()),
            Err(FrontierError::Capacity(_))
        ));
    }

    #[tokio::test]
    async fn list_queues_streams_rows() {
        let engine = frontier().await;
        ingest(
            &engine,
            vec![
                discovered("c", "http://n.com/1"),
                discovered("c", "http://o.com/1"),
            ],
        )
        .await;

        let mut rows = Vec::new();
        let rx = engine.list_queues("c", false);
        while let Ok(row) = rx.recv().await {
            rows.push(row);
        }
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.active_count == 1));
    }

    #[tokio::test]
    async fn known_item_reorders_an_existing_entry() {
        let engine = frontier().await;
        ingest(&engine, vec![discovered("c", "http://p.com/1")]).await;

        let t = now_millis() + 60_000;
        let push_back = UrlItem::known(UrlInfo::new("http://p.com/1", "c"), t + 600_000);
        let acks = ingest(&engine, vec![push_back]).await;
        assert_eq!(count(&acks, AckStatus::Ok), 1);

        assert!(drain(engine.get_urls_at(GetParams::new(1, 1), t).unwrap()).await.is_empty());
        let urls = drain(engine.get_urls_at(GetParams::new(1, 1), t + 600_000).unwrap()).await;
        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn item_kinds_parse_from_wire_shapes() {
        // The engine sees only wire messages; make sure both tagged shapes
        // round-trip through serde the way the transport sends them.
        let engine = frontier().await;
        let item: UrlItem = serde_json::from_str(
            r#"{"id": "x", "discovered": {"info": {"url": "http://q.com/1", "crawl_id": "c"}}}"#,
        )
        .unwrap();
        assert!(matches!(item.kind, UrlItemKind::Discovered { .. }));
        let acks = ingest(&engine, vec![item]).await;
        assert_eq!(acks[0].id, "x");
        assert_eq!(acks[0].status, AckStatus::Ok);
    }
}
