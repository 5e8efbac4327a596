//! # Builder Module
//!
//! Provides the `FrontierBuilder`, a fluent API for constructing and
//! configuring `Frontier` instances.
//!
//! ## Overview
//!
//! The builder assembles the engine: it validates the configuration, picks
//! or accepts a queue store, restores a checkpoint when one exists, and
//! rebuilds the in-memory queue directory from the store before the engine
//! starts serving.
//!
//! ## Key Features
//!
//! - **Configuration**: apply a whole [`FrontierConfig`] or set individual
//!   options fluently
//! - **Pluggable store**: bring any [`QueueStore`] implementation; the
//!   in-memory backend is the default
//! - **Checkpoint management**: point the built-in store at a snapshot file
//!   and it is restored on build and rewritten on `checkpoint()`, optionally
//!   on a periodic schedule
//!
//! ## Example
//!
//! ```rust,ignore
//! use frontier_core::FrontierBuilder;
//! use std::time::Duration;
//!
//! async fn setup() -> Result<(), frontier_core::FrontierError> {
//!     let frontier = FrontierBuilder::new()
//!         .default_min_delay_ms(2_000)
//!         .with_checkpoint_path("./frontier.checkpoint")
//!         .with_checkpoint_interval(Duration::from_secs(60))
//!         .build()
//!         .await?;
//!
//!     let acks = frontier.put_urls(my_item_stream)?;
//!     // ...
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::checkpoint;
use crate::config::{CrawlLimits, FrontierConfig};
use crate::directory::{QueueDirectory, QueueId};
use crate::error::FrontierError;
use crate::frontier::Frontier;
use crate::store::{MemoryQueueStore, QueueStore};
use crate::types::EpochMillis;

pub struct FrontierBuilder {
    config: FrontierConfig,
    store: Option<Arc<dyn QueueStore>>,
    checkpoint_path: Option<PathBuf>,
    checkpoint_interval: Option<Duration>,
}

impl Default for FrontierBuilder {
    fn default() -> Self {
        FrontierBuilder {
            config: FrontierConfig::default(),
            store: None,
            checkpoint_path: None,
            checkpoint_interval: None,
        }
    }
}

impl FrontierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: FrontierConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses a custom queue store instead of the in-memory default. A custom
    /// store manages its own durability; the checkpoint path is only used
    /// by the built-in store.
    pub fn with_store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Enables snapshot persistence for the built-in store: restored on
    /// build, rewritten on every `checkpoint()`.
    pub fn with_checkpoint_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.checkpoint_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Checkpoints on a fixed schedule in addition to explicit calls.
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = Some(interval);
        self
    }

    /// Sets the default politeness delay between serves from one queue.
    pub fn default_min_delay_ms(mut self, delay: EpochMillis) -> Self {
        self.config.default_min_delay_ms = delay;
        self
    }

    /// Sets the default reservation window for served URLs.
    pub fn default_delay_requestable_ms(mut self, delay: EpochMillis) -> Self {
        self.config.default_delay_requestable_ms = delay;
        self
    }

    /// Caps simultaneously open ingest + fetch streams.
    pub fn max_concurrent_streams(mut self, limit: usize) -> Self {
        self.config.max_concurrent_streams = limit;
        self
    }

    /// Caps outstanding store writes per ingest stream.
    pub fn ingest_outstanding_limit(mut self, limit: usize) -> Self {
        self.config.ingest_outstanding_limit = limit;
        self
    }

    /// Sets the server-side deadline for one fetch request.
    pub fn fetch_deadline_ms(mut self, deadline: u64) -> Self {
        self.config.fetch_deadline_ms = deadline;
        self
    }

    /// Builds the `Frontier`, restoring checkpointed state and rebuilding
    /// the queue directory from the store.
    pub async fn build(self) -> Result<Frontier, FrontierError> {
        self.config.validate()?;

        let store: Arc<dyn QueueStore> = match self.store {
            Some(store) => store,
            None => {
                if self.config.store_backend != "memory" {
                    return Err(FrontierError::Configuration(format!(
                        "unknown store backend: {}",
                        self.config.store_backend
                    )));
                }
                match &self.checkpoint_path {
                    Some(path) => match checkpoint::load_snapshot(path)? {
                        Some(snapshot) => Arc::new(MemoryQueueStore::from_snapshot(
                            snapshot,
                            Some(path.clone()),
                        )),
                        None => Arc::new(MemoryQueueStore::with_snapshot_path(path.clone())),
                    },
                    None => Arc::new(MemoryQueueStore::new()),
                }
            }
        };

        let directory = Arc::new(QueueDirectory::new(CrawlLimits::new(
            self.config.default_min_delay_ms,
        )));

        // Rebuild the directory from the store so counts and queue
        // existence survive restarts.
        let queues = store.iterate_queues(None).await?;
        for (crawl_id, key) in queues {
            let counts = store.queue_counts(&crawl_id, &key).await?;
            let handle = directory.ensure(&QueueId::new(crawl_id, key));
            handle.meta().counts = counts;
        }
        if !directory.is_empty() {
            debug!("Rebuilt directory with {} queues", directory.len());
        }

        let frontier = Frontier::new(store, directory, self.config);
        if let Some(interval) = self.checkpoint_interval {
            frontier.start_periodic_checkpoints(interval);
        }
        Ok(frontier)
    }
}
