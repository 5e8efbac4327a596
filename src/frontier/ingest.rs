//! Contains the ingest stream worker for the frontier engine.
//! This module consumes `UrlItem` streams, classifies and persists each
//! item, and emits exactly one acknowledgement per item.

use kanal::{AsyncReceiver, AsyncSender};
use log::{debug, error, trace, warn};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::directory::{QueueId, QueueStatus};
use crate::error::FrontierError;
use crate::frontier::EngineShared;
use crate::key;
use crate::store::{PutOutcome, PutPolicy};
use crate::types::{
    AckMessage, AckStatus, NEVER_REFETCH, UrlInfo, UrlItem, UrlItemKind, now_millis,
};

/// Spawns the task behind one ingest stream.
///
/// Items are read from `items` and dispatched as small store-write tasks; a
/// semaphore caps outstanding writes, so the stream is simply not read past
/// the admission limit. When the caller half-closes, in-flight writes drain
/// and their acks flush before the ack channel closes.
pub(crate) fn spawn_ingest_task(
    shared: Arc<EngineShared>,
    items: AsyncReceiver<UrlItem>,
    ack_tx: AsyncSender<AckMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        trace!(
            "Ingest stream started with outstanding limit: {}",
            shared.config.ingest_outstanding_limit
        );
        let semaphore = Arc::new(Semaphore::new(shared.config.ingest_outstanding_limit));
        let mut tasks = JoinSet::new();

        while let Ok(item) = items.recv().await {
            if shared.state.is_read_only() {
                warn!("Engine is read-only, closing ingest stream");
                break;
            }
            shared.stats.increment_items_received();

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Admission semaphore closed, shutting down ingest worker.");
                    break;
                }
            };

            let shared_clone = Arc::clone(&shared);
            let ack_tx_clone = ack_tx.clone();
            tasks.spawn(async move {
                let id = item.ack_id();
                let status = process_item(&shared_clone, item).await;
                if ack_tx_clone.send(AckMessage { id, status }).await.is_err() {
                    debug!("Ack channel closed before the ack could be delivered");
                }
                drop(permit);
            });

            // Reap finished writes as we go so the set stays small on
            // long-lived streams.
            while let Some(res) = tasks.try_join_next() {
                if let Err(e) = res {
                    error!("An ingest task failed: {:?}", e);
                }
            }
        }

        trace!("Ingest stream half-closed, draining in-flight writes");
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("An ingest task failed: {:?}", e);
            }
        }
        shared.state.ingest_streams.fetch_sub(1, Ordering::SeqCst);
        trace!("Ingest stream finished");
    })
}

/// Applies one item and folds errors into the ack status. Fatal store
/// errors flip the engine read-only; everything else is per-item.
async fn process_item(shared: &EngineShared, item: UrlItem) -> AckStatus {
    let status = match apply_item(shared, &item).await {
        Ok(status) => status,
        Err(e) => {
            if e.is_fatal() {
                error!("Fatal store error, entering read-only mode: {}", e);
                shared.state.enter_read_only();
            } else {
                warn!("Failed to apply item {}: {}", item.ack_id(), e);
            }
            AckStatus::Fail
        }
    };
    match status {
        AckStatus::Ok => shared.stats.increment_acked_ok(),
        AckStatus::Skipped => shared.stats.increment_acked_skipped(),
        AckStatus::Fail => shared.stats.increment_acked_failed(),
    }
    status
}

async fn apply_item(shared: &EngineShared, item: &UrlItem) -> Result<AckStatus, FrontierError> {
    let (info, refetch) = match &item.kind {
        UrlItemKind::Discovered { info } => (info, None),
        UrlItemKind::Known {
            info,
            refetchable_from,
        } => (info, Some(*refetchable_from)),
    };

    let Some(queue_id) = validate(info) else {
        return Ok(AckStatus::Fail);
    };

    // Status and capacity gates, before any store write.
    if let Some(handle) = shared.directory.get(&queue_id) {
        let meta = handle.meta();
        if meta.status != QueueStatus::Active {
            debug!("Rejecting item for non-active queue {}", queue_id);
            return Ok(AckStatus::Fail);
        }
        if refetch.is_none() {
            if let Some(max) = shared
                .directory
                .limits_for(&info.crawl_id)
                .max_queue_size
            {
                if meta.counts.active() >= max {
                    debug!("Queue {} is over its size limit", queue_id);
                    return Ok(AckStatus::Fail);
                }
            }
        }
    }

    // Serializes the known-set check with the store write for this URL.
    let _guard = shared.url_locks.lock(&info.crawl_id, &info.url).await;

    match refetch {
        None => apply_discovered(shared, info, &queue_id).await,
        Some(NEVER_REFETCH) => apply_never_refetch(shared, info, &queue_id).await,
        Some(at) => apply_known(shared, info, &queue_id, at).await,
    }
}

/// Validation + key derivation; `None` means the item is unschedulable.
fn validate(info: &UrlInfo) -> Option<QueueId> {
    if info.url.is_empty() {
        debug!("Rejecting item with empty URL");
        return None;
    }
    if info.crawl_id.is_empty() {
        debug!("Rejecting item without crawl id: {}", info.url);
        return None;
    }
    let parsed = match Url::parse(&info.url) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Rejecting malformed URL {}: {}", info.url, e);
            return None;
        }
    };
    let key = match info.key.clone().or_else(|| key::queue_key(&parsed)) {
        Some(key) => key,
        None => {
            debug!("Rejecting URL without a derivable queue key: {}", info.url);
            return None;
        }
    };
    Some(QueueId::new(info.crawl_id.clone(), key))
}

async fn apply_discovered(
    shared: &EngineShared,
    info: &UrlInfo,
    queue_id: &QueueId,
) -> Result<AckStatus, FrontierError> {
    if shared.is_known_cached(&info.crawl_id, &info.url).await? {
        trace!("Skipping already known URL: {}", info.url);
        return Ok(AckStatus::Skipped);
    }

    let outcome = shared
        .store
        .put_scheduled(
            &info.crawl_id,
            &queue_id.key,
            &info.url,
            now_millis(),
            &info.metadata,
            PutPolicy::NewOnly,
        )
        .await?;
    shared.remember_known(&info.crawl_id, &info.url);

    match outcome {
        PutOutcome::AlreadyKnown => Ok(AckStatus::Skipped),
        PutOutcome::Inserted | PutOutcome::Replaced => {
            let handle = shared.ensure_queue(queue_id);
            handle.meta().counts.scheduled += 1;
            trace!("Scheduled discovered URL {} in {}", info.url, queue_id);
            Ok(AckStatus::Ok)
        }
    }
}

/// A known item with `refetchable_from == 0` marks the URL as done: record
/// it as known and complete any live entry.
async fn apply_never_refetch(
    shared: &EngineShared,
    info: &UrlInfo,
    queue_id: &QueueId,
) -> Result<AckStatus, FrontierError> {
    shared.store.add_known(&info.crawl_id, &info.url).await?;
    shared.remember_known(&info.crawl_id, &info.url);
    if shared.directory.get(queue_id).is_some() {
        shared.complete_url(queue_id, &info.url).await?;
    }
    trace!("Recorded {} as known, never to refetch", info.url);
    Ok(AckStatus::Ok)
}

async fn apply_known(
    shared: &EngineShared,
    info: &UrlInfo,
    queue_id: &QueueId,
    refetchable_from: u64,
) -> Result<AckStatus, FrontierError> {
    let outcome = shared
        .store
        .put_scheduled(
            &info.crawl_id,
            &queue_id.key,
            &info.url,
            refetchable_from,
            &info.metadata,
            PutPolicy::Upsert,
        )
        .await?;
    shared.remember_known(&info.crawl_id, &info.url);

    let handle = shared.ensure_queue(queue_id);
    match outcome {
        PutOutcome::Inserted => {
            handle.meta().counts.scheduled += 1;
        }
        PutOutcome::Replaced => {
            // The entry may have moved between the scheduled and in-flight
            // sets; re-read the authoritative counts.
            shared.sync_queue_counts(queue_id).await?;
        }
        PutOutcome::AlreadyKnown => {}
    }
    trace!(
        "Scheduled known URL {} in {} at {}",
        info.url, queue_id, refetchable_from
    );
    Ok(AckStatus::Ok)
}
