//! Concurrency utilities for the frontier engine.
//!
//! Provides the striped lock set that serializes known-set checks and the
//! corresponding store writes per `(crawl_id, url)` without a single
//! engine-wide lock.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::{Mutex, MutexGuard};

/// A fixed set of async mutexes indexed by hash.
///
/// Two operations on the same `(crawl_id, url)` always contend on the same
/// stripe; operations on different URLs almost never do. Guards may be held
/// across store I/O.
pub struct StripedLocks {
    stripes: Vec<Mutex<()>>,
    mask: usize,
}

impl StripedLocks {
    /// Creates a lock set with at least `stripes` stripes, rounded up to a
    /// power of two.
    pub fn new(stripes: usize) -> Self {
        let count = stripes.max(2).next_power_of_two();
        StripedLocks {
            stripes: (0..count).map(|_| Mutex::new(())).collect(),
            mask: count - 1,
        }
    }

    /// Locks the stripe for `(crawl_id, url)`.
    pub async fn lock(&self, crawl_id: &str, url: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.index(crawl_id, url)].lock().await
    }

    fn index(&self, crawl_id: &str, url: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        crawl_id.hash(&mut hasher);
        url.hash(&mut hasher);
        hasher.finish() as usize & self.mask
    }

    #[cfg(test)]
    fn stripe_count(&self) -> usize {
        self.stripes.len()
    }
}

impl Default for StripedLocks {
    fn default() -> Self {
        StripedLocks::new(1024)
    }
}
