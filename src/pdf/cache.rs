//! Bounded page buffer for rendered PDF pages
//!
//! LRU ordering with a protect-set: entries near the current page, the first
//! and last page, and anything currently on screen survive eviction.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};
use lru::LruCache;

use super::types::{PageEntry, SharedEntry, scale_key};

/// Cache key for rendered pages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Page number (1-based)
    pub page: usize,
    /// Scale factor (stored as millionths for stable hashing)
    pub scale_millionths: u32,
}

impl CacheKey {
    #[must_use]
    pub fn new(page: usize, scale: f32) -> Self {
        Self {
            page,
            scale_millionths: scale_key(scale),
        }
    }

    #[must_use]
    pub fn for_entry(entry: &PageEntry) -> Self {
        Self::new(entry.page, entry.scale)
    }
}

/// Bounded cache of rendered pages keyed by `(page, scale)`
pub struct PageBuffer {
    cache: LruCache<CacheKey, SharedEntry>,
    capacity: usize,
    protect_radius: usize,
    page_count: usize,
    current_page: usize,
    current_scale: u32,
    displayed: HashSet<CacheKey>,
}

impl PageBuffer {
    /// Create a buffer holding at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize, protect_radius: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            capacity: capacity.max(1),
            protect_radius,
            page_count: 0,
            current_page: 1,
            current_scale: scale_key(1.0),
            displayed: HashSet::new(),
        }
    }

    /// Get a cached page, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, page: usize, scale: f32) -> Option<SharedEntry> {
        self.cache.get(&CacheKey::new(page, scale)).cloned()
    }

    /// Check if a page is cached without promoting it
    #[must_use]
    pub fn contains(&self, page: usize, scale: f32) -> bool {
        self.cache.contains(&CacheKey::new(page, scale))
    }

    /// Insert a rendered page, evicting down to capacity
    pub fn put(&mut self, entry: PageEntry) -> SharedEntry {
        let key = CacheKey::for_entry(&entry);
        let arc = Arc::new(entry);
        self.cache.put(key, arc.clone());
        self.evict_overflow();
        arc
    }

    /// Drop every entry. Used on document and scale changes.
    pub fn clear(&mut self) {
        if !self.cache.is_empty() {
            debug!("Clearing page buffer ({} entries)", self.cache.len());
        }
        self.cache.clear();
    }

    /// Update the page and scale the protect-set is computed around
    pub fn set_focus(&mut self, current_page: usize, scale: f32) {
        self.current_page = current_page;
        self.current_scale = scale_key(scale);
    }

    pub fn set_page_count(&mut self, page_count: usize) {
        self.page_count = page_count;
    }

    /// Replace the set of entries currently shown on screen
    pub fn set_displayed(&mut self, keys: impl IntoIterator<Item = CacheKey>) {
        self.displayed.clear();
        self.displayed.extend(keys);
    }

    /// Pages exempt from eviction at the current scale
    #[must_use]
    pub fn protected_pages(&self) -> Vec<usize> {
        let current = self.current_page.max(1);
        let lo = current.saturating_sub(self.protect_radius).max(1);
        let mut hi = current + self.protect_radius;
        if self.page_count > 0 {
            hi = hi.min(self.page_count);
        }

        let mut pages: Vec<usize> = (lo..=hi).collect();
        pages.push(1);
        if self.page_count > 0 {
            pages.push(self.page_count);
        }
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    fn is_protected(&self, key: &CacheKey, protected: &[usize]) -> bool {
        key.scale_millionths == self.current_scale && protected.binary_search(&key.page).is_ok()
    }

    fn evict_overflow(&mut self) {
        while self.cache.len() > self.capacity {
            let Some(victim) = self.pick_victim() else {
                warn!(
                    "Page buffer over capacity ({} > {}) with only on-screen entries left",
                    self.cache.len(),
                    self.capacity
                );
                break;
            };
            self.cache.pop(&victim);
            debug!("Evicted page {} from buffer", victim.page);
        }
    }

    /// Least recently used unprotected entry, then least recently used
    /// off-screen entry. On-screen entries are never picked.
    fn pick_victim(&self) -> Option<CacheKey> {
        let protected = self.protected_pages();
        let off_screen = || {
            self.cache
                .iter()
                .rev()
                .map(|(key, _)| *key)
                .filter(|key| !self.displayed.contains(key))
        };

        off_screen()
            .find(|key| !self.is_protected(key, &protected))
            .or_else(|| off_screen().next())
    }

    /// Cached keys from most to least recently used
    #[must_use]
    pub fn keys(&self) -> Vec<CacheKey> {
        self.cache.iter().map(|(key, _)| *key).collect()
    }

    /// Number of cached pages
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Cache capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::types::{PageSize, Raster};

    fn test_entry(page: usize, scale: f32) -> PageEntry {
        PageEntry {
            page,
            scale,
            raster: Raster::blank(4, 4),
            natural: PageSize::new(4.0, 4.0),
        }
    }

    fn buffer(capacity: usize, page_count: usize) -> PageBuffer {
        let mut buffer = PageBuffer::new(capacity, 2);
        buffer.set_page_count(page_count);
        buffer
    }

    #[test]
    fn cache_insert_and_get() {
        let mut cache = buffer(10, 5);
        cache.put(test_entry(1, 1.0));

        assert!(cache.contains(1, 1.0));
        assert!(cache.get(1, 1.0).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_are_scale_specific() {
        let mut cache = buffer(10, 5);
        cache.put(test_entry(2, 1.0));

        assert!(cache.get(2, 1.25).is_none());
        assert!(cache.get(2, 1.0).is_some());
    }

    #[test]
    fn clear_drops_everything() {
        let mut cache = buffer(10, 5);
        for page in 1..=5 {
            cache.put(test_entry(page, 1.0));
        }
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn protect_set_covers_neighbors_and_ends() {
        let mut cache = buffer(10, 20);
        cache.set_focus(10, 1.0);
        assert_eq!(cache.protected_pages(), vec![1, 8, 9, 10, 11, 12, 20]);

        cache.set_focus(1, 1.0);
        assert_eq!(cache.protected_pages(), vec![1, 2, 3, 20]);

        cache.set_focus(20, 1.0);
        assert_eq!(cache.protected_pages(), vec![1, 18, 19, 20]);
    }

    #[test]
    fn bound_holds_after_every_put() {
        let mut cache = buffer(10, 40);
        for page in 1..=40 {
            cache.set_focus(page, 1.0);
            cache.put(test_entry(page, 1.0));
            assert!(cache.len() <= cache.capacity());
        }
    }

    #[test]
    fn far_pages_are_evicted_before_protected_ones() {
        let mut cache = buffer(10, 30);
        cache.set_focus(15, 1.0);

        // Far pages first, so they are the least recently used
        for page in [5, 6, 7] {
            cache.put(test_entry(page, 1.0));
        }
        for page in [1, 13, 14, 15, 16, 17, 30] {
            cache.put(test_entry(page, 1.0));
        }
        assert_eq!(cache.len(), 10);

        cache.put(test_entry(25, 1.0));
        assert_eq!(cache.len(), 10);
        assert!(!cache.contains(5, 1.0));
        for page in [1, 13, 14, 15, 16, 17, 30] {
            assert!(cache.contains(page, 1.0), "page {page} was evicted");
        }
    }

    #[test]
    fn lru_order_decides_among_unprotected() {
        let mut cache = buffer(3, 100);
        cache.set_focus(50, 1.0);
        cache.put(test_entry(20, 1.0));
        cache.put(test_entry(21, 1.0));
        cache.put(test_entry(22, 1.0));

        // Touch 20 so 21 becomes the oldest
        let _ = cache.get(20, 1.0);
        cache.put(test_entry(23, 1.0));

        assert!(cache.contains(20, 1.0));
        assert!(!cache.contains(21, 1.0));
    }

    #[test]
    fn stale_scale_entries_are_not_protected() {
        let mut cache = buffer(2, 10);
        cache.set_focus(1, 1.0);
        cache.put(test_entry(1, 2.0));
        cache.put(test_entry(1, 1.0));
        cache.put(test_entry(2, 1.0));

        assert!(!cache.contains(1, 2.0));
        assert!(cache.contains(1, 1.0));
        assert!(cache.contains(2, 1.0));
    }

    #[test]
    fn displayed_entries_are_never_evicted() {
        let mut cache = buffer(2, 100);
        cache.set_focus(1, 1.0);
        cache.put(test_entry(60, 1.0));
        cache.set_displayed([CacheKey::new(60, 1.0)]);

        cache.put(test_entry(70, 1.0));
        cache.put(test_entry(80, 1.0));

        assert!(cache.contains(60, 1.0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn protected_entries_go_when_nothing_else_is_left() {
        let mut cache = buffer(2, 5);
        cache.set_focus(3, 1.0);
        cache.set_displayed([CacheKey::new(3, 1.0)]);
        for page in [1, 2, 3] {
            cache.put(test_entry(page, 1.0));
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(3, 1.0));
        assert!(!cache.contains(1, 1.0));
    }
}
