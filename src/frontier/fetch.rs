//! Contains the fetch scheduling logic for the frontier engine.
//!
//! One task per fetch request walks the candidate queues starting after the
//! fairness cursor, claims due entries, and streams them to the consumer
//! until the caps are reached, the candidates are exhausted, or the
//! deadline expires. Deadline expiry is not an error: the stream closes
//! cleanly with whatever was produced.

use kanal::AsyncSender;
use log::{debug, trace, warn};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

use crate::frontier::EngineShared;
use crate::types::{EpochMillis, GetParams, UrlInfo};

/// Spawns the task behind one fetch response stream.
///
/// `now` is the wall-clock instant the request is evaluated against; every
/// politeness and due-time comparison inside the request uses it.
pub(crate) fn spawn_fetch_task(
    shared: Arc<EngineShared>,
    params: GetParams,
    now: EpochMillis,
    out_tx: AsyncSender<UrlInfo>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run_fetch(&shared, &params, now, &out_tx).await;
        shared.state.fetch_streams.fetch_sub(1, Ordering::SeqCst);
    })
}

async fn run_fetch(
    shared: &EngineShared,
    params: &GetParams,
    now: EpochMillis,
    out_tx: &AsyncSender<UrlInfo>,
) {
    shared.stats.increment_fetch_requests();

    // The effective deadline is the minimum of the caller's and ours.
    let deadline_ms = params
        .deadline_ms
        .map(|d| d.min(shared.config.fetch_deadline_ms))
        .unwrap_or(shared.config.fetch_deadline_ms);
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);

    let max_urls = params.max_urls.max(1);
    let max_queues = params.max_queues.max(1);
    let per_queue_cap = max_urls.div_ceil(max_queues);
    let delay_requestable = if params.delay_requestable_ms == 0 {
        shared.config.default_delay_requestable_ms
    } else {
        params.delay_requestable_ms
    };

    let candidates = shared
        .directory
        .candidates(params.crawl_id.as_deref(), params.key.as_deref());
    trace!("Fetch considering {} candidate queues", candidates.len());

    let mut served = 0usize;
    let mut queues_drawn = 0usize;

    'queues: for (queue_id, handle) in candidates {
        if served >= max_urls || queues_drawn >= max_queues {
            break;
        }
        if Instant::now() >= deadline {
            debug!("Fetch deadline reached after serving {} URLs", served);
            break;
        }

        // Eligibility under the queue's own lock, released before store I/O.
        {
            let mut meta = handle.meta();
            if !meta.eligible(now) {
                continue;
            }
        }

        let budget = per_queue_cap.min(max_urls - served);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let due = match tokio::time::timeout(
            remaining,
            shared
                .store
                .fetch_due(&queue_id.crawl_id, &queue_id.key, now, budget),
        )
        .await
        {
            Ok(Ok(due)) => due,
            Ok(Err(e)) => {
                warn!("fetch_due failed for queue {}: {}", queue_id, e);
                continue;
            }
            Err(_) => {
                debug!("Store did not answer within the deadline, returning partial results");
                break;
            }
        };
        if due.is_empty() {
            continue;
        }

        let min_delay = shared.directory.limits_for(&queue_id.crawl_id).min_delay_ms;
        let mut drawn_from_queue = 0usize;

        for entry in due {
            // With a non-zero politeness delay the first serve pushes
            // next_eligible_at past `now`, so a queue yields one URL per
            // visit; a zero-delay crawl drains up to the per-queue cap.
            // The window is reserved before store I/O so concurrent fetches
            // cannot both pass the gate.
            {
                let mut meta = handle.meta();
                if !meta.eligible(now) {
                    break;
                }
                meta.next_eligible_at = now + min_delay;
            }

            let reservable_at = now + delay_requestable;
            let claimed = match shared
                .store
                .mark_in_flight(&queue_id.crawl_id, &queue_id.key, &entry.url, now, reservable_at)
                .await
            {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!("mark_in_flight failed for {}: {}", entry.url, e);
                    continue;
                }
            };
            if !claimed {
                trace!("Entry {} was claimed by a concurrent fetch", entry.url);
                continue;
            }

            {
                let mut meta = handle.meta();
                if !entry.in_flight {
                    meta.counts.scheduled = meta.counts.scheduled.saturating_sub(1);
                    meta.counts.in_flight += 1;
                }
                meta.last_produced_at = Some(now);
            }

            let info = UrlInfo {
                url: entry.url,
                crawl_id: queue_id.crawl_id.clone(),
                key: Some(queue_id.key.clone()),
                metadata: entry.metadata,
            };
            shared.stats.record_served(&queue_id.crawl_id);

            if out_tx.send(info).await.is_err() {
                debug!("Fetch stream cancelled by the consumer; served URLs stay in flight");
                return;
            }
            served += 1;
            drawn_from_queue += 1;

            if served >= max_urls {
                shared.directory.advance_cursor(&queue_id);
                break 'queues;
            }
        }

        if drawn_from_queue > 0 {
            shared.directory.advance_cursor(&queue_id);
            queues_drawn += 1;
        }
    }

    if served == 0 {
        shared.stats.increment_empty_fetches();
    }
    trace!("Fetch finished: {} URLs from {} queues", served, queues_drawn);
}
