//! Recency list
//!
//! One process-wide LRU over the keys of valid chunks: head = most recently
//! admitted or touched, tail = eviction candidate. The list stores keys, not
//! chunks; the bucket chain keeps ownership, so a key whose chunk was already
//! removed is simply stale and every operation tolerates it as a no-op.

use lru::LruCache;
use parking_lot::Mutex;

use chunkcache_core::ChunkKey;

pub(crate) struct RecencyList {
    list: Mutex<LruCache<ChunkKey, ()>>,
}

impl RecencyList {
    pub(crate) fn new() -> Self {
        // Capacity decisions belong to the cache's evictor, not the list.
        Self {
            list: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Add a freshly validated chunk's key at the head.
    pub(crate) fn push_head(&self, key: ChunkKey) {
        self.list.lock().put(key, ());
    }

    /// Move a key to the head on a hit. No-op if the key is not present
    /// (the evictor already claimed it).
    pub(crate) fn touch(&self, key: &ChunkKey) {
        self.list.lock().promote(key);
    }

    /// Drop a key wherever it sits (targeted invalidation).
    pub(crate) fn unlink(&self, key: &ChunkKey) {
        self.list.lock().pop(key);
    }

    /// Detach the coldest key for eviction.
    pub(crate) fn pop_tail(&self) -> Option<ChunkKey> {
        self.list.lock().pop_lru().map(|(key, ())| key)
    }

    pub(crate) fn clear(&self) {
        self.list.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.list.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &ChunkKey) -> bool {
        self.list.lock().contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(offset: u64) -> ChunkKey {
        ChunkKey::new("obj", 1, offset, 4096)
    }

    #[test]
    fn test_pop_tail_is_oldest() {
        let list = RecencyList::new();
        list.push_head(key(0));
        list.push_head(key(4096));
        list.push_head(key(8192));

        assert_eq!(list.pop_tail(), Some(key(0)));
        assert_eq!(list.pop_tail(), Some(key(4096)));
        assert_eq!(list.pop_tail(), Some(key(8192)));
        assert_eq!(list.pop_tail(), None);
    }

    #[test]
    fn test_touch_moves_to_head() {
        let list = RecencyList::new();
        list.push_head(key(0));
        list.push_head(key(4096));

        list.touch(&key(0));
        assert_eq!(list.pop_tail(), Some(key(4096)));
        assert_eq!(list.pop_tail(), Some(key(0)));
    }

    #[test]
    fn test_touch_missing_is_noop() {
        let list = RecencyList::new();
        list.push_head(key(0));
        list.touch(&key(4096));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_unlink() {
        let list = RecencyList::new();
        list.push_head(key(0));
        list.push_head(key(4096));

        list.unlink(&key(0));
        assert_eq!(list.len(), 1);
        assert_eq!(list.pop_tail(), Some(key(4096)));

        // Unlinking an absent key is tolerated.
        list.unlink(&key(0));
    }

    #[test]
    fn test_repush_promotes() {
        let list = RecencyList::new();
        list.push_head(key(0));
        list.push_head(key(4096));
        list.push_head(key(0));

        assert_eq!(list.len(), 2);
        assert_eq!(list.pop_tail(), Some(key(4096)));
    }
}
