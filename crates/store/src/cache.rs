use std::sync::RwLock;
use std::time::Duration;

use cinder_core::ResourceKey;
use metrics::counter;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::debug;

/// TTL index over rendered pages. Holds only expiry instants; page content
/// lives in the registry on the UI thread.
///
/// Shared between the dispatcher (read: cache checks) and the UI thread
/// (write: page insertion), hence its own lock.
pub struct PageCache {
    ttl: Duration,
    entries: RwLock<FxHashMap<ResourceKey, Instant>>,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(FxHashMap::default()) }
    }

    pub fn ttl(&self) -> Duration { self.ttl }

    /// Present and not yet expired.
    pub fn contains(&self, key: &ResourceKey) -> bool {
        let hit = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.get(key).is_some_and(|exp| *exp > Instant::now())
        };
        if hit {
            counter!("page_cache_hits_total", 1);
        } else {
            counter!("page_cache_misses_total", 1);
        }
        hit
    }

    /// Insert or refresh `key` with the default TTL.
    pub fn touch(&self, key: &ResourceKey) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.clone(), Instant::now() + self.ttl);
    }

    pub fn remove(&self, key: &ResourceKey) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key).is_some()
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, exp| *exp > now);
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, remaining = entries.len(), "page cache purge");
        }
        purged
    }

    /// Entries including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = PageCache::new(Duration::from_secs(300));
        let k = ResourceKey::build(["local", "topics"]);
        cache.touch(&k);
        assert!(cache.contains(&k));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.contains(&k));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.contains(&k));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn touch_refreshes_expiry() {
        let cache = PageCache::new(Duration::from_secs(10));
        let k = ResourceKey::from("clusters");
        cache.touch(&k);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.touch(&k);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(cache.contains(&k));
        assert!(cache.remove(&k));
        assert!(!cache.contains(&k));
    }
}
