//! # Checkpoint Module
//!
//! Durable snapshots of the frontier's scheduling state.
//!
//! ## Overview
//!
//! A checkpoint captures everything needed to resume after a restart: every
//! queue's scheduled and in-flight entries, per-queue completion counters
//! and the per-crawl known-sets. Snapshots are encoded with MessagePack and
//! written atomically (temporary file, then rename), so a crash during a
//! save never corrupts the previous checkpoint.
//!
//! The in-memory store backend uses these helpers to implement its
//! `checkpoint()` operation; the builder uses them to restore state before
//! the engine starts serving.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::FrontierError;
use crate::types::{EpochMillis, Metadata};

/// One persisted queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub url: String,
    /// For scheduled entries: when the URL becomes due. For in-flight
    /// entries: when the reservation expires and the URL is re-served.
    pub refetchable_from: EpochMillis,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Full state of one queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub crawl_id: String,
    pub key: String,
    pub scheduled: Vec<EntrySnapshot>,
    pub in_flight: Vec<EntrySnapshot>,
    pub completed: u64,
}

/// Full state of the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub queues: Vec<QueueSnapshot>,
    /// Known URLs per crawl id.
    pub known: HashMap<String, Vec<String>>,
}

impl StoreSnapshot {
    pub fn url_count(&self) -> usize {
        self.queues
            .iter()
            .map(|q| q.scheduled.len() + q.in_flight.len())
            .sum()
    }
}

/// Serializes and writes a snapshot atomically.
pub fn save_snapshot(path: &Path, snapshot: &StoreSnapshot) -> Result<(), FrontierError> {
    info!(
        "Saving checkpoint with {} queues and {} live URLs to {:?}",
        snapshot.queues.len(),
        snapshot.url_count(),
        path
    );

    let encoded = rmp_serde::to_vec(snapshot)
        .map_err(|e| FrontierError::Checkpoint(format!("failed to serialize snapshot: {}", e)))?;

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, encoded).map_err(|e| {
        FrontierError::Checkpoint(format!("failed to write temporary checkpoint file: {}", e))
    })?;
    fs::rename(&tmp_path, path).map_err(|e| {
        FrontierError::Checkpoint(format!("failed to rename temporary checkpoint file: {}", e))
    })?;

    info!("Checkpoint saved successfully.");
    Ok(())
}

/// Reads a snapshot back. A missing file yields `None`; a file that cannot
/// be decoded is reported as a warning and also yields `None`, so a stale
/// or foreign file never blocks startup.
pub fn load_snapshot(path: &Path) -> Result<Option<StoreSnapshot>, FrontierError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(FrontierError::Checkpoint(format!(
                "failed to read checkpoint file {:?}: {}",
                path, e
            )));
        }
    };

    match rmp_serde::from_slice::<StoreSnapshot>(&bytes) {
        Ok(snapshot) => {
            info!(
                "Loaded checkpoint from {:?}: {} queues, {} live URLs",
                path,
                snapshot.queues.len(),
                snapshot.url_count()
            );
            Ok(Some(snapshot))
        }
        Err(e) => {
            warn!("Failed to deserialize checkpoint from {:?}: {}", path, e);
            Ok(None)
        }
    }
}
