//! In-memory queue store.
//!
//! The default backend: per-queue state lives behind its own mutex inside a
//! sharded map, known-sets are exact per-crawl sets, and durability is
//! provided by whole-state snapshots written through the checkpoint module
//! when a snapshot path is configured. Also the backend the test suite runs
//! against.

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use async_trait::async_trait;

use crate::checkpoint::{self, EntrySnapshot, QueueSnapshot, StoreSnapshot};
use crate::error::FrontierError;
use crate::store::{DueUrl, PutOutcome, PutPolicy, QueueCounts, QueueStore};
use crate::types::{EpochMillis, Metadata};

#[derive(Debug, Clone)]
struct Slot {
    at: EpochMillis,
    seq: u64,
    metadata: Metadata,
}

/// State of one queue. `order` and `scheduled` describe the same entries;
/// `in_flight` is disjoint from both, keyed by URL with `at` holding the
/// re-service deadline.
#[derive(Debug, Default)]
struct QueueData {
    order: BTreeMap<(EpochMillis, u64), String>,
    scheduled: HashMap<String, Slot>,
    in_flight: HashMap<String, Slot>,
    completed: u64,
    next_seq: u64,
}

impl QueueData {
    fn insert_scheduled(&mut self, url: &str, at: EpochMillis, metadata: Metadata) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert((at, seq), url.to_string());
        self.scheduled
            .insert(url.to_string(), Slot { at, seq, metadata });
    }

    fn remove_scheduled(&mut self, url: &str) -> Option<Slot> {
        let slot = self.scheduled.remove(url)?;
        self.order.remove(&(slot.at, slot.seq));
        Some(slot)
    }

    fn counts(&self) -> QueueCounts {
        QueueCounts {
            scheduled: self.scheduled.len() as u64,
            in_flight: self.in_flight.len() as u64,
            completed: self.completed,
        }
    }

    /// Due entries at `now` in schedule order: scheduled entries whose time
    /// has come, merged with in-flight entries whose reservation expired.
    fn due(&self, now: EpochMillis, max: usize) -> Vec<DueUrl> {
        let mut due: Vec<((EpochMillis, u64), DueUrl)> = self
            .order
            .range(..=(now, u64::MAX))
            .map(|(&(at, seq), url)| {
                let metadata = self
                    .scheduled
                    .get(url)
                    .map(|s| s.metadata.clone())
                    .unwrap_or_default();
                (
                    (at, seq),
                    DueUrl {
                        url: url.clone(),
                        metadata,
                        refetchable_from: at,
                        in_flight: false,
                    },
                )
            })
            .collect();

        for (url, slot) in &self.in_flight {
            if slot.at <= now {
                due.push((
                    (slot.at, slot.seq),
                    DueUrl {
                        url: url.clone(),
                        metadata: slot.metadata.clone(),
                        refetchable_from: slot.at,
                        in_flight: true,
                    },
                ));
            }
        }

        due.sort_by_key(|(key, _)| *key);
        due.truncate(max);
        due.into_iter().map(|(_, entry)| entry).collect()
    }
}

fn merge_metadata(existing: &mut Metadata, incoming: &Metadata) {
    for (k, v) in incoming {
        existing.insert(k.clone(), v.clone());
    }
}

/// The in-memory [`QueueStore`] backend.
pub struct MemoryQueueStore {
    queues: DashMap<(String, String), Arc<Mutex<QueueData>>>,
    known: DashMap<String, DashSet<String>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        MemoryQueueStore {
            queues: DashMap::new(),
            known: DashMap::new(),
            snapshot_path: None,
        }
    }

    /// A store that persists its full state to `path` on `checkpoint()`.
    pub fn with_snapshot_path(path: impl Into<PathBuf>) -> Self {
        MemoryQueueStore {
            snapshot_path: Some(path.into()),
            ..MemoryQueueStore::new()
        }
    }

    /// Rebuilds a store from a snapshot, keeping `path` as the target of
    /// future checkpoints.
    pub fn from_snapshot(snapshot: StoreSnapshot, path: Option<PathBuf>) -> Self {
        let store = MemoryQueueStore {
            queues: DashMap::new(),
            known: DashMap::new(),
            snapshot_path: path,
        };

        for queue in snapshot.queues {
            let handle = store.queue(&queue.crawl_id, &queue.key);
            let mut data = handle.lock();
            for entry in queue.scheduled {
                data.insert_scheduled(&entry.url, entry.refetchable_from, entry.metadata);
            }
            for entry in queue.in_flight {
                let seq = data.next_seq;
                data.next_seq += 1;
                data.in_flight.insert(
                    entry.url,
                    Slot {
                        at: entry.refetchable_from,
                        seq,
                        metadata: entry.metadata,
                    },
                );
            }
            data.completed = queue.completed;
        }

        for (crawl_id, urls) in snapshot.known {
            let set = DashSet::new();
            for url in urls {
                set.insert(url);
            }
            store.known.insert(crawl_id, set);
        }

        store
    }

    /// Captures the full store state.
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut queues = Vec::with_capacity(self.queues.len());
        for entry in self.queues.iter() {
            let (crawl_id, key) = entry.key().clone();
            let data = entry.value().lock();

            let scheduled = data
                .order
                .iter()
                .filter_map(|(_, url)| {
                    data.scheduled.get(url).map(|slot| EntrySnapshot {
                        url: url.clone(),
                        refetchable_from: slot.at,
                        metadata: slot.metadata.clone(),
                    })
                })
                .collect();

            let mut in_flight: Vec<(u64, EntrySnapshot)> = data
                .in_flight
                .iter()
                .map(|(url, slot)| {
                    (
                        slot.seq,
                        EntrySnapshot {
                            url: url.clone(),
                            refetchable_from: slot.at,
                            metadata: slot.metadata.clone(),
                        },
                    )
                })
                .collect();
            in_flight.sort_by_key(|(seq, _)| *seq);

            queues.push(QueueSnapshot {
                crawl_id,
                key,
                scheduled,
                in_flight: in_flight.into_iter().map(|(_, e)| e).collect(),
                completed: data.completed,
            });
        }

        let known = self
            .known
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().iter().map(|u| u.clone()).collect(),
                )
            })
            .collect();

        StoreSnapshot { queues, known }
    }

    fn queue(&self, crawl_id: &str, queue_key: &str) -> Arc<Mutex<QueueData>> {
        self.queues
            .entry((crawl_id.to_string(), queue_key.to_string()))
            .or_default()
            .clone()
    }

    fn existing_queue(&self, crawl_id: &str, queue_key: &str) -> Option<Arc<Mutex<QueueData>>> {
        self.queues
            .get(&(crawl_id.to_string(), queue_key.to_string()))
            .map(|q| Arc::clone(q.value()))
    }
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        MemoryQueueStore::new()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn put_scheduled(
        &self,
        crawl_id: &str,
        queue_key: &str,
        url: &str,
        refetchable_from: EpochMillis,
        metadata: &Metadata,
        policy: PutPolicy,
    ) -> Result<PutOutcome, FrontierError> {
        match policy {
            PutPolicy::NewOnly => {
                let already = self
                    .known
                    .get(crawl_id)
                    .map(|set| set.contains(url))
                    .unwrap_or(false);
                if already {
                    return Ok(PutOutcome::AlreadyKnown);
                }
                self.known
                    .entry(crawl_id.to_string())
                    .or_default()
                    .insert(url.to_string());
                let handle = self.queue(crawl_id, queue_key);
                let mut data = handle.lock();
                data.insert_scheduled(url, refetchable_from, metadata.clone());
                Ok(PutOutcome::Inserted)
            }
            PutPolicy::Upsert => {
                self.known
                    .entry(crawl_id.to_string())
                    .or_default()
                    .insert(url.to_string());
                let handle = self.queue(crawl_id, queue_key);
                let mut data = handle.lock();

                if let Some(slot) = data.remove_scheduled(url) {
                    // Later time wins; metadata keys merge by replacement.
                    let at = refetchable_from.max(slot.at);
                    let mut merged = slot.metadata;
                    merge_metadata(&mut merged, metadata);
                    data.insert_scheduled(url, at, merged);
                    Ok(PutOutcome::Replaced)
                } else if let Some(slot) = data.in_flight.remove(url) {
                    let mut merged = slot.metadata;
                    merge_metadata(&mut merged, metadata);
                    data.insert_scheduled(url, refetchable_from, merged);
                    Ok(PutOutcome::Replaced)
                } else {
                    data.insert_scheduled(url, refetchable_from, metadata.clone());
                    Ok(PutOutcome::Inserted)
                }
            }
        }
    }

    async fn fetch_due(
        &self,
        crawl_id: &str,
        queue_key: &str,
        now: EpochMillis,
        max: usize,
    ) -> Result<Vec<DueUrl>, FrontierError> {
        match self.existing_queue(crawl_id, queue_key) {
            Some(handle) => Ok(handle.lock().due(now, max)),
            None => Ok(Vec::new()),
        }
    }

    async fn mark_in_flight(
        &self,
        crawl_id: &str,
        queue_key: &str,
        url: &str,
        now: EpochMillis,
        reservable_at: EpochMillis,
    ) -> Result<bool, FrontierError> {
        let Some(handle) = self.existing_queue(crawl_id, queue_key) else {
            return Ok(false);
        };
        let mut data = handle.lock();
        if let Some(slot) = data.remove_scheduled(url) {
            if slot.at > now {
                // Not due yet; leave the entry exactly where it was.
                data.order.insert((slot.at, slot.seq), url.to_string());
                data.scheduled.insert(url.to_string(), slot);
                return Ok(false);
            }
            data.in_flight.insert(
                url.to_string(),
                Slot {
                    at: reservable_at,
                    seq: slot.seq,
                    metadata: slot.metadata,
                },
            );
            Ok(true)
        } else if let Some(slot) = data.in_flight.get_mut(url) {
            if slot.at <= now {
                slot.at = reservable_at;
                Ok(true)
            } else {
                Ok(false)
            }
        } else {
            Ok(false)
        }
    }

    async fn mark_completed(
        &self,
        crawl_id: &str,
        queue_key: &str,
        url: &str,
    ) -> Result<bool, FrontierError> {
        let Some(handle) = self.existing_queue(crawl_id, queue_key) else {
            return Ok(false);
        };
        let mut data = handle.lock();
        let removed = data.remove_scheduled(url).is_some() || data.in_flight.remove(url).is_some();
        if removed {
            data.completed += 1;
        }
        Ok(removed)
    }

    async fn reschedule(
        &self,
        crawl_id: &str,
        queue_key: &str,
        url: &str,
        refetchable_from: EpochMillis,
    ) -> Result<(), FrontierError> {
        let handle = self.queue(crawl_id, queue_key);
        let mut data = handle.lock();
        let metadata = data
            .in_flight
            .remove(url)
            .or_else(|| data.remove_scheduled(url))
            .map(|slot| slot.metadata)
            .unwrap_or_default();
        data.insert_scheduled(url, refetchable_from, metadata);
        Ok(())
    }

    async fn is_known(&self, crawl_id: &str, url: &str) -> Result<bool, FrontierError> {
        Ok(self
            .known
            .get(crawl_id)
            .map(|set| set.contains(url))
            .unwrap_or(false))
    }

    async fn add_known(&self, crawl_id: &str, url: &str) -> Result<(), FrontierError> {
        self.known
            .entry(crawl_id.to_string())
            .or_default()
            .insert(url.to_string());
        Ok(())
    }

    async fn iterate_queues(
        &self,
        crawl_id: Option<&str>,
    ) -> Result<Vec<(String, String)>, FrontierError> {
        Ok(self
            .queues
            .iter()
            .filter(|entry| crawl_id.map(|c| entry.key().0 == c).unwrap_or(true))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn queue_counts(
        &self,
        crawl_id: &str,
        queue_key: &str,
    ) -> Result<QueueCounts, FrontierError> {
        Ok(self
            .existing_queue(crawl_id, queue_key)
            .map(|handle| handle.lock().counts())
            .unwrap_or_default())
    }

    async fn delete_queue(&self, crawl_id: &str, queue_key: &str) -> Result<u64, FrontierError> {
        match self
            .queues
            .remove(&(crawl_id.to_string(), queue_key.to_string()))
        {
            Some((_, handle)) => {
                let data = handle.lock();
                let removed = data.counts().active();
                debug!(
                    "Deleted queue {}/{} with {} live URLs",
                    crawl_id, queue_key, removed
                );
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    async fn delete_crawl(&self, crawl_id: &str) -> Result<u64, FrontierError> {
        let keys: Vec<(String, String)> = self
            .queues
            .iter()
            .filter(|entry| entry.key().0 == crawl_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            if let Some((_, handle)) = self.queues.remove(&key) {
                removed += handle.lock().counts().active();
            }
        }
        self.known.remove(crawl_id);
        debug!("Deleted crawl {} with {} live URLs", crawl_id, removed);
        Ok(removed)
    }

    async fn checkpoint(&self) -> Result<(), FrontierError> {
        match &self.snapshot_path {
            Some(path) => checkpoint::save_snapshot(path, &self.snapshot()),
            None => Ok(()),
        }
    }
}
