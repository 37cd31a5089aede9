//! Expiring key/value map with an optional background sweep
//!
//! Expiry is enforced lazily on every read, so correctness never depends on
//! the sweep. The sweep only bounds memory held by entries nobody reads
//! again.

use crate::stats::CacheStats;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lower bound on the sweep period so tiny TTLs don't spin
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

struct Entry {
    value: Bytes,
    inserted: Instant,
}

/// A string-keyed cache where every entry lives for the same TTL
pub struct TtlCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    stats: Arc<CacheStats>,
}

impl TtlCache {
    pub fn new(ttl: Duration, stats: Arc<CacheStats>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            stats,
        }
    }

    /// Get a live value, dropping it if it has expired
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => entry.inserted.elapsed() >= self.ttl,
        };
        if expired {
            entries.remove(key);
            self.stats.record_evictions(1);
            return None;
        }
        entries.get(key).map(|e| e.value.clone())
    }

    /// Insert or overwrite, restarting the entry's TTL
    pub fn set(&self, key: String, value: Bytes) {
        self.entries.lock().insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.inserted.elapsed() < self.ttl);
        let purged = before - entries.len();
        drop(entries);
        self.stats.record_evictions(purged as u64);
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the background sweep on the current tokio runtime.
    ///
    /// Returns the token that stops it, or `None` when called outside a
    /// runtime, in which case expiry stays purely lazy.
    pub fn start_sweeper(self: &Arc<Self>) -> Option<CancellationToken> {
        let handle = Handle::try_current().ok()?;
        let token = CancellationToken::new();
        let period = self.ttl.max(MIN_SWEEP_INTERVAL);
        handle.spawn(sweep_loop(Arc::downgrade(self), period, token.clone()));
        Some(token)
    }
}

async fn sweep_loop(cache: Weak<TtlCache>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(cache) = cache.upgrade() else { break };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!("Swept {} expired cache entries", purged);
                }
            }
        }
    }
}
