//! Rate graph caching with TTL support.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ratemesh_common::{SharedClock, Timestamp};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::graph::RateGraph;

/// A built graph and its lifetime.
#[derive(Debug, Clone)]
pub struct CachedGraph {
    pub graph: Arc<RateGraph>,
    pub built_at: Timestamp,
    pub expires_at: Timestamp,
}

impl CachedGraph {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at > now
    }
}

/// One cache key's graph, filled at most once.
///
/// Callers racing on an empty slot all wait on the same build.
#[derive(Debug, Default)]
struct Slot {
    cell: OnceCell<CachedGraph>,
}

/// Cache of built rate graphs keyed by calendar day.
///
/// Entries are checked for expiry when read and replaced by a fresh build;
/// nothing sweeps them in the background.
pub struct GraphCache {
    slots: DashMap<String, Arc<Slot>>,
    clock: SharedClock,
    ttl: Duration,
    builds: AtomicU64,
}

impl GraphCache {
    /// Create an empty cache.
    pub fn new(clock: SharedClock, ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
            ttl,
            builds: AtomicU64::new(0),
        }
    }

    /// Return the live graph for `key`, running `build` if there is none.
    ///
    /// At most one build per key is in flight at a time.
    pub async fn get_or_build<F, Fut>(&self, key: &str, build: F) -> Arc<RateGraph>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RateGraph>,
    {
        let slot = self.live_slot(key);

        if let Some(cached) = slot.cell.get() {
            debug!(key, "Graph cache hit");
            return cached.graph.clone();
        }

        let cached = slot
            .cell
            .get_or_init(|| async move {
                debug!(key, "Graph cache miss, building");
                self.builds.fetch_add(1, Ordering::Relaxed);
                let graph = build().await;
                let built_at = self.clock.now();
                CachedGraph {
                    graph: Arc::new(graph),
                    built_at,
                    expires_at: built_at
                        .checked_add_signed(self.ttl)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                }
            })
            .await;

        cached.graph.clone()
    }

    /// The slot to use for `key`, replacing it if its graph has expired.
    fn live_slot(&self, key: &str) -> Arc<Slot> {
        let now = self.clock.now();
        let mut entry = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Slot::default()));

        let expired = entry
            .cell
            .get()
            .map(|cached| !cached.is_live(now))
            .unwrap_or(false);
        if expired {
            debug!(key, "Graph cache entry expired");
            *entry = Arc::new(Slot::default());
        }

        entry.clone()
    }

    /// Drop every cached graph.
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Number of graphs built since creation.
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of cached graphs, expired ones included until next read.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics.
    pub fn stats(&self) -> GraphCacheStats {
        let mut keys: Vec<String> = self
            .slots
            .iter()
            .filter(|slot| slot.cell.initialized())
            .map(|slot| slot.key().clone())
            .collect();
        keys.sort();

        GraphCacheStats {
            size: keys.len(),
            keys,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphCacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}
