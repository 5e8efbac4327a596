//! # Queue Store Module
//!
//! Persistence abstraction for scheduled URLs and per-crawl known-sets.
//!
//! ## Overview
//!
//! The engine is written against the [`QueueStore`] trait; backends plug in
//! underneath it. Every queue is identified by `(crawl_id, queue_key)` and
//! holds two disjoint sets of entries: `scheduled` (time-ordered, waiting to
//! become due) and `in_flight` (handed to a consumer, carrying the deadline
//! after which they are re-served). Serving an entry moves it from
//! `scheduled` to `in_flight`; completing it removes it from either set.
//!
//! ## Guarantees expected from implementations
//!
//! - `put_scheduled` is atomic with respect to `is_known`: once it returns
//!   [`PutOutcome::Inserted`], `is_known` for the same URL returns true.
//! - Writes within one crawl are linearizable; writes across crawls need
//!   not be.
//! - `fetch_due` never mutates; callers claim entries via `mark_in_flight`.

mod memory;

pub use memory::MemoryQueueStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FrontierError;
use crate::types::{EpochMillis, Metadata};

/// Result of a `put_scheduled` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The URL was new: it entered the known-set and was scheduled.
    Inserted,
    /// The URL was already known and nothing was written.
    AlreadyKnown,
    /// An existing entry for the URL was updated in place.
    Replaced,
}

/// Write policy of a `put_scheduled` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutPolicy {
    /// Discovered items: write only when the URL is not yet known.
    NewOnly,
    /// Known items: insert, or update the live entry (later time wins,
    /// metadata keys merge by replacement).
    Upsert,
}

/// An entry returned by `fetch_due`.
#[derive(Debug, Clone)]
pub struct DueUrl {
    pub url: String,
    pub metadata: Metadata,
    pub refetchable_from: EpochMillis,
    /// True when this is an in-flight entry whose reservation expired and
    /// is being offered again.
    pub in_flight: bool,
}

/// Live entry counts of one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub scheduled: u64,
    pub in_flight: u64,
    pub completed: u64,
}

impl QueueCounts {
    pub fn active(&self) -> u64 {
        self.scheduled + self.in_flight
    }
}

/// Storage backend contract for the frontier engine.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Schedules `url` in `(crawl_id, queue_key)` under the given policy.
    async fn put_scheduled(
        &self,
        crawl_id: &str,
        queue_key: &str,
        url: &str,
        refetchable_from: EpochMillis,
        metadata: &Metadata,
        policy: PutPolicy,
    ) -> Result<PutOutcome, FrontierError>;

    /// Returns up to `max` entries due at `now` in schedule order, without
    /// claiming them. Expired in-flight entries are included.
    async fn fetch_due(
        &self,
        crawl_id: &str,
        queue_key: &str,
        now: EpochMillis,
        max: usize,
    ) -> Result<Vec<DueUrl>, FrontierError>;

    /// Claims a due entry: moves it to the in-flight set with the given
    /// re-service deadline, or renews an expired reservation. Returns false
    /// without writing when the entry is not due at `now` or another
    /// consumer holds an unexpired reservation, so concurrent fetches never
    /// serve the same URL twice within one reservation window.
    async fn mark_in_flight(
        &self,
        crawl_id: &str,
        queue_key: &str,
        url: &str,
        now: EpochMillis,
        reservable_at: EpochMillis,
    ) -> Result<bool, FrontierError>;

    /// Removes the entry from the queue entirely. Returns whether an entry
    /// was actually present.
    async fn mark_completed(
        &self,
        crawl_id: &str,
        queue_key: &str,
        url: &str,
    ) -> Result<bool, FrontierError>;

    /// Moves an entry (scheduled or in-flight) back to the scheduled set at
    /// the given time.
    async fn reschedule(
        &self,
        crawl_id: &str,
        queue_key: &str,
        url: &str,
        refetchable_from: EpochMillis,
    ) -> Result<(), FrontierError>;

    async fn is_known(&self, crawl_id: &str, url: &str) -> Result<bool, FrontierError>;

    async fn add_known(&self, crawl_id: &str, url: &str) -> Result<(), FrontierError>;

    /// Lists `(crawl_id, queue_key)` pairs, optionally restricted to one
    /// crawl.
    async fn iterate_queues(
        &self,
        crawl_id: Option<&str>,
    ) -> Result<Vec<(String, String)>, FrontierError>;

    async fn queue_counts(
        &self,
        crawl_id: &str,
        queue_key: &str,
    ) -> Result<QueueCounts, FrontierError>;

    /// Drops one queue; returns the number of live URLs removed.
    async fn delete_queue(&self, crawl_id: &str, queue_key: &str) -> Result<u64, FrontierError>;

    /// Drops all queues and the known-set of a crawl; returns the number of
    /// live URLs removed.
    async fn delete_crawl(&self, crawl_id: &str) -> Result<u64, FrontierError>;

    /// Flushes to the durable medium, returning only once the backend's
    /// durability level is reached. Backends without a durable medium
    /// return immediately.
    async fn checkpoint(&self) -> Result<(), FrontierError>;
}
