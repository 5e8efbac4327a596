//! # Frontier Module
//!
//! Implements the engine that coordinates URL ingestion and fetch
//! scheduling.
//!
//! ## Overview
//!
//! The frontier module provides the main `Frontier` struct and the stream
//! worker tasks behind its two streaming operations. Ingestion and fetching
//! run as independent Tokio tasks per stream, communicating with callers
//! over async channels; the control surface operates on the shared queue
//! directory and store directly.
//!
//! ## Key Components
//!
//! - **Frontier**: the engine facade holding the store, directory and
//!   configuration, and exposing the full service surface
//! - **Ingest Task**: consumes a `UrlItem` stream, deduplicates and writes,
//!   acks each item exactly once
//! - **Fetch Task**: produces ready URLs under politeness, fairness and
//!   deadline constraints
//!
//! ## Internal Components
//!
//! These are implementation details and are not typically used directly:
//! - `spawn_ingest_task`: creates the task behind one ingest stream
//! - `spawn_fetch_task`: creates the task behind one fetch response

mod core;
mod fetch;
mod ingest;

pub use self::core::Frontier;

pub(crate) use self::core::EngineShared;
pub(crate) use self::fetch::spawn_fetch_task;
pub(crate) use self::ingest::spawn_ingest_task;
