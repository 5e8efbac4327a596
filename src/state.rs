//! Module for tracking the operational state of the engine.
//!
//! `EngineState` counts the streams currently open against the frontier and
//! carries the read-only flag raised on a fatal store failure. The stream
//! counters back the open-stream admission cap; the read-only flag makes
//! every subsequent write-path stream close instead of touching the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared operational state of the frontier's stream tasks.
#[derive(Debug, Default)]
pub struct EngineState {
    /// Ingest streams currently open.
    pub ingest_streams: AtomicUsize,
    /// Fetch streams currently open.
    pub fetch_streams: AtomicUsize,
    /// Raised on fatal store failure; cleared only by operator restart.
    read_only: AtomicBool,
}

impl EngineState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open_streams(&self) -> usize {
        self.ingest_streams.load(Ordering::SeqCst) + self.fetch_streams.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.open_streams() == 0
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn enter_read_only(&self) {
        self.read_only.store(true, Ordering::SeqCst);
    }
}
