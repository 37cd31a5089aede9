//! PROPFIND result cache
//!
//! Mapped WebDAV drives, especially when driven from the command line,
//! repeat the same metadata queries many times a second. [`StatCache`]
//! keeps serialized multistatus bodies keyed by path and `Depth`, much like
//! the directory cache lifetime setting of common SMB clients.
//!
//! A response differs by requested depth, so each depth gets its own
//! [`TtlCache`], created on first insert and kept (with its sweep) until
//! [`StatCache::stop`].

use crate::stats::CacheStats;
use crate::ttl::TtlCache;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct DepthCache {
    cache: Arc<TtlCache>,
    sweeper: Option<CancellationToken>,
}

#[derive(Default)]
struct State {
    caches: HashMap<u32, DepthCache>,
    stopped: bool,
}

/// Cache of PROPFIND results keyed by `(path, depth)`
pub struct StatCache {
    ttl: Duration,
    state: Mutex<State>,
    stats: Arc<CacheStats>,
}

impl StatCache {
    /// Create an empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(State::default()),
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached bytes for exactly this name and depth, if present and unexpired
    pub fn get(&self, name: &str, depth: u32) -> Option<Bytes> {
        let cache = {
            let state = self.state.lock();
            state.caches.get(&depth).map(|d| Arc::clone(&d.cache))
        };

        let value = cache.and_then(|c| c.get(name));
        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        value
    }

    /// Store `value`, creating the sub-cache for `depth` on first use
    pub fn set(&self, name: &str, depth: u32, value: Bytes) {
        let cache = {
            let mut state = self.state.lock();
            let stopped = state.stopped;
            let depth_cache = state.caches.entry(depth).or_insert_with(|| {
                let cache = Arc::new(TtlCache::new(self.ttl, Arc::clone(&self.stats)));
                let sweeper = if stopped { None } else { cache.start_sweeper() };
                debug!(
                    "Created stat cache for depth {} (sweeper: {})",
                    depth,
                    sweeper.is_some()
                );
                DepthCache { cache, sweeper }
            });
            Arc::clone(&depth_cache.cache)
        };

        cache.set(name.to_string(), value);
    }

    /// Drop every entry at every depth. Sub-caches and sweeps stay alive.
    pub fn invalidate(&self) {
        let state = self.state.lock();
        for depth_cache in state.caches.values() {
            depth_cache.cache.clear();
        }
    }

    /// Halt every background sweep. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;

        let mut stopped = 0;
        for depth_cache in state.caches.values_mut() {
            if let Some(token) = depth_cache.sweeper.take() {
                token.cancel();
                stopped += 1;
            }
        }
        info!("Stopped {} stat cache sweeper(s)", stopped);
    }

    /// Number of live-or-unswept entries across all depths
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.caches.values().map(|d| d.cache.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl Drop for StatCache {
    fn drop(&mut self) {
        self.stop();
    }
}
