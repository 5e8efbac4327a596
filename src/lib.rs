//! # frontier-core
//!
//! Core engine of the `frontier` crawl-coordination service.
//!
//! A URL frontier sits behind a distributed crawler: workers stream
//! discovered URLs in, the engine deduplicates and persists them per host
//! queue, and hands back URLs that are ready to fetch while enforcing
//! politeness (a minimum delay between serves from the same queue) and
//! fairness across queues and crawls.
//!
//! Transport is not part of this crate: the streaming operations speak
//! async channel endpoints, which a gRPC (or any other) adapter maps its
//! generated stubs onto.
//!
//! ## Example
//!
//! ```rust,ignore
//! use frontier_core::{FrontierBuilder, GetParams, UrlInfo, UrlItem};
//!
//! async fn run() -> Result<(), frontier_core::FrontierError> {
//!     let frontier = FrontierBuilder::new().build().await?;
//!
//!     let (items_tx, items_rx) = frontier_core::kanal::unbounded_async();
//!     let acks = frontier.put_urls(items_rx)?;
//!     items_tx
//!         .send(UrlItem::discovered(UrlInfo::new("https://example.com/", "default")))
//!         .await
//!         .ok();
//!     drop(items_tx);
//!     while let Ok(ack) = acks.recv().await {
//!         println!("{} -> {:?}", ack.id, ack.status);
//!     }
//!
//!     let urls = frontier.get_urls(GetParams::new(10, 5))?;
//!     while let Ok(info) = urls.recv().await {
//!         println!("ready: {}", info.url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod checkpoint;
pub mod concurrency;
pub mod config;
pub mod directory;
pub mod error;
pub mod frontier;
pub mod key;
pub mod prelude;
pub mod state;
pub mod stats;
pub mod store;
pub mod types;

pub use builder::FrontierBuilder;
pub use config::{CrawlLimits, FrontierConfig};
pub use error::FrontierError;
pub use frontier::Frontier;
pub use stats::FrontierStats;
pub use store::{MemoryQueueStore, PutOutcome, PutPolicy, QueueStore};
pub use types::{
    AckMessage, AckStatus, EpochMillis, GetParams, Metadata, QueueStats, StatsSummary, UrlInfo,
    UrlItem, UrlItemKind,
};

// Essential re-exports for store implementors and channel plumbing.
pub use async_trait::async_trait;
pub use dashmap::DashMap;
pub use kanal;
pub use tokio;
