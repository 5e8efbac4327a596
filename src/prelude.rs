//! A "prelude" for users of the `frontier-core` crate.
//!
//! This prelude re-exports the most commonly used traits, structs, and
//! macros so that they can be easily imported.
//!
//! # Example
//!
//! ```
//! use frontier_core::prelude::*;
//! ```

pub use crate::{
    // Core structs
    Frontier,
    FrontierBuilder,
    // Core traits
    QueueStore,
    // Essential re-exports for trait implementation
    async_trait,
};

pub use crate::error::FrontierError;
pub use crate::store::MemoryQueueStore;
pub use crate::types::{AckMessage, AckStatus, GetParams, UrlInfo, UrlItem};
