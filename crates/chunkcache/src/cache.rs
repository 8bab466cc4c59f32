//! Chunk cache engine
//!
//! `ChunkCache` fronts an immutable backing store with a bounded pool of
//! fixed-size chunks. Readers ask for arbitrary byte ranges; the cache serves
//! them out of resident chunks, fetching each missing chunk from the backing
//! store exactly once per concurrent request storm, while the eviction thread
//! trims residency from the recency tail.
//!
//! The cache never blocks correctness: any runtime failure (allocation,
//! capacity, fetch error, fetch in flight too long) degrades the lookup to a
//! miss and the caller falls back to its own read path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use chunkcache_core::types::align_down;
use chunkcache_core::{BlockSource, ChunkCacheConfig, ChunkKey, Error};

use crate::backend::{MemoryBackend, Payload};
use crate::chunk::{chunk_extent, Chunk};
use crate::evictor::Evictor;
use crate::index::BucketTable;
use crate::recency::RecencyList;
use crate::stats::{CacheStats, StatsSnapshot};
use crate::MAX_RETRIES;

/// Outcome of a cache lookup.
///
/// `Miss` means the caller must read from the backing store itself; the cache
/// may have served part of the request into `dst` before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Lookup {
    /// Every requested byte was served from the cache
    Hit,
    /// Fall back to the caller's own read path
    Miss,
}

/// Block-granularity chunk cache.
///
/// One long-lived instance per host connection, built with [`ChunkCache::setup`]
/// and torn down with [`ChunkCache::shutdown`].
pub struct ChunkCache {
    /// None when the cache is disabled by configuration
    inner: Option<Arc<CacheInner>>,
    evictor: Mutex<Option<Evictor>>,
}

pub(crate) struct CacheInner {
    capacity: u64,
    chunk_size: u64,
    pub(crate) evict_interval: Duration,
    table: BucketTable,
    recency: RecencyList,
    backend: MemoryBackend,
    bytes_used: AtomicU64,
    pub(crate) exiting: AtomicBool,
    stats: CacheStats,
}

impl ChunkCache {
    /// Build a cache from a validated configuration and start its eviction
    /// thread. A disabled configuration yields a cache whose entry points do
    /// nothing.
    pub fn setup(config: &ChunkCacheConfig) -> Result<Self, Error> {
        config.validate()?;

        if !config.enabled {
            debug!("chunk cache disabled by configuration");
            return Ok(Self {
                inner: None,
                evictor: Mutex::new(None),
            });
        }

        let backend = MemoryBackend::from_config(config)?;

        let inner = Arc::new(CacheInner {
            capacity: config.capacity,
            chunk_size: config.chunk_size,
            evict_interval: Duration::from_millis(config.evict_interval_ms),
            table: BucketTable::new(config.effective_hashsize()),
            recency: RecencyList::new(),
            backend,
            bytes_used: AtomicU64::new(0),
            exiting: AtomicBool::new(false),
            stats: CacheStats::default(),
        });
        let evictor = Evictor::spawn(Arc::clone(&inner));

        info!(
            "configured chunk cache of type {:?} with capacity {} bytes",
            config.backend, config.capacity
        );
        Ok(Self {
            inner: Some(inner),
            evictor: Mutex::new(Some(evictor)),
        })
    }

    /// Reconfiguration after setup is not supported.
    pub fn reconfigure(&self, _config: &ChunkCacheConfig) -> Result<(), Error> {
        Err(Error::InvalidConfig(
            "reconfiguration of chunk cache not supported".into(),
        ))
    }

    /// Serve `dst.len()` bytes of `block` starting at `offset`, populating
    /// missing chunks from the backing store along the way.
    pub fn get(
        &self,
        block: &dyn BlockSource,
        object_id: u32,
        offset: u64,
        dst: &mut [u8],
    ) -> Lookup {
        let Some(inner) = &self.inner else {
            return Lookup::Miss;
        };
        if inner.exiting.load(Ordering::Relaxed) {
            return Lookup::Miss;
        }
        inner.get(block, object_id, offset, dst)
    }

    /// Drop every chunk of `(block, object_id)` overlapping
    /// `[offset, offset + size)`, e.g. because the block was rewritten under
    /// a new id.
    pub fn remove(&self, block: &dyn BlockSource, object_id: u32, offset: u64, size: u64) {
        let Some(inner) = &self.inner else {
            return;
        };
        if inner.exiting.load(Ordering::Relaxed) {
            return;
        }
        inner.remove(block, object_id, offset, size);
    }

    /// Stop the eviction thread and free every resident chunk. The host must
    /// quiesce readers first. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.exiting.store(true, Ordering::SeqCst);
        if let Some(evictor) = self.evictor.lock().take() {
            evictor.stop();
        }
        inner.drain();
        debug!("chunk cache shut down");
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        match &self.inner {
            Some(inner) => inner
                .stats
                .snapshot(inner.bytes_used.load(Ordering::Relaxed)),
            None => StatsSnapshot::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn evict_one(&self) -> bool {
        self.inner.as_ref().is_some_and(|inner| inner.evict_one())
    }

    #[cfg(test)]
    pub(crate) fn check_integrity(&self) {
        if let Some(inner) = &self.inner {
            inner.check_integrity();
        }
    }
}

impl Drop for ChunkCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl CacheInner {
    fn get(&self, block: &dyn BlockSource, object_id: u32, offset: u64, dst: &mut [u8]) -> Lookup {
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);

        // Ranges that fall outside the object cannot be cached or served.
        let size = dst.len() as u64;
        if offset.checked_add(size).map_or(true, |end| end > block.size()) {
            trace!(
                "get: range {}+{} outside object {} of size {}",
                offset,
                size,
                block.name(),
                block.size()
            );
            return Lookup::Miss;
        }

        // A block may span many chunks. Loop until every byte is served.
        let mut already_read = 0usize;
        while already_read < dst.len() {
            let cursor = offset + already_read as u64;
            match self.read_one(block, object_id, cursor, &mut dst[already_read..]) {
                Ok(copied) => already_read += copied,
                Err(Error::CapacityExhausted) | Err(Error::Retry) => return Lookup::Miss,
                Err(e) => {
                    warn!("chunk cache degraded to pass-through: {e}");
                    return Lookup::Miss;
                }
            }
        }
        Lookup::Hit
    }

    /// Serve bytes from the single chunk containing `cursor`, populating it
    /// on a miss. Returns the number of bytes copied into `dst`.
    fn read_one(
        &self,
        block: &dyn BlockSource,
        object_id: u32,
        cursor: u64,
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        let key = ChunkKey::new(block.name(), object_id, cursor, self.chunk_size);
        let bucket_id = self.table.bucket_of(&key);

        let mut retries = 0u32;
        loop {
            {
                let chain = self.table.lock(bucket_id);
                if let Some(pos) = chain.iter().position(|c| c.key() == &key) {
                    if let Some(data) = chain[pos].payload() {
                        let copied = copy_out(chain[pos].offset(), data, cursor, dst);
                        drop(chain);
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        self.recency.touch(&key);
                        return Ok(copied);
                    }

                    // Reserved: another thread's fetch is in flight. Back off
                    // and retry; past the bound this becomes a soft miss.
                    drop(chain);
                    retries += 1;
                    if retries > MAX_RETRIES {
                        self.stats.retries.fetch_add(1, Ordering::Relaxed);
                        trace!("get: gave up waiting on in-flight chunk {:?}", key);
                        return Err(Error::Retry);
                    }
                    for _ in 0..32 {
                        std::hint::spin_loop();
                    }
                    continue;
                }
            }

            // Not resident. Admission (capacity check plus payload
            // allocation) runs with no lock held.
            let len = chunk_extent(self.chunk_size, block.size(), key.chunk_offset);
            let payload = self.admit(len)?;

            // Re-probe under the lock: another thread may have claimed the
            // identity in the gap, and the chain holds at most one chunk per
            // key. Inserting the placeholder before the lock is released is
            // what makes concurrent misses issue exactly one fetch.
            let mut chain = self.table.lock(bucket_id);
            if chain.iter().any(|c| c.key() == &key) {
                drop(chain);
                self.bytes_used.fetch_sub(len, Ordering::Relaxed);
                drop(payload);
                continue;
            }
            chain.push(Chunk::reserved(key, len));
            drop(chain);

            return self.populate(block, key, bucket_id, len, payload, cursor, dst);
        }
    }

    /// Capacity check plus payload allocation. Advisory: two concurrent
    /// admissions may both pass and transiently overshoot capacity by one
    /// chunk; the evictor corrects that.
    fn admit(&self, len: u64) -> Result<Payload, Error> {
        let proposed = self.bytes_used.load(Ordering::Relaxed) + self.chunk_size;
        if proposed > self.capacity {
            self.stats.exceeded_capacity.fetch_add(1, Ordering::Relaxed);
            trace!("exceeded chunk cache capacity of {} bytes", self.capacity);
            return Err(Error::CapacityExhausted);
        }
        let payload = self.backend.alloc(len as usize)?;
        self.bytes_used.fetch_add(len, Ordering::Relaxed);
        Ok(payload)
    }

    /// Fetch the reserved chunk's bytes with no lock held, serve the caller
    /// from the fresh buffer, then publish it (Reserved -> Valid) and put the
    /// key at the recency head.
    #[allow(clippy::too_many_arguments)]
    fn populate(
        &self,
        block: &dyn BlockSource,
        key: ChunkKey,
        bucket_id: usize,
        len: u64,
        mut payload: Payload,
        cursor: u64,
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        if let Err(e) = block.read(key.chunk_offset, &mut payload) {
            warn!(
                "fetch of chunk {:?} failed, removing reservation: {}",
                key, e
            );
            self.unreserve(&key, bucket_id, len);
            return Err(Error::BackingStore(e));
        }

        let copied = copy_out(key.chunk_offset, &payload, cursor, dst);

        {
            let mut chain = self.table.lock(bucket_id);
            match chain.iter_mut().find(|c| c.key() == &key && c.is_reserved()) {
                Some(chunk) => chunk.publish(payload),
                None => {
                    // Unreachable: only the reserving thread transitions its
                    // placeholder, and invalidation skips reserved chunks.
                    debug_assert!(false, "reserved chunk vanished during fetch");
                    self.bytes_used.fetch_sub(len, Ordering::Relaxed);
                    return Err(Error::Retry);
                }
            }
        }

        self.stats.chunks_admitted.fetch_add(1, Ordering::Relaxed);
        self.stats.chunks.fetch_add(1, Ordering::Relaxed);
        self.recency.push_head(key);
        trace!("populated chunk {:?}, size {}", key, len);
        Ok(copied)
    }

    /// Unwind a failed reservation: unlink the placeholder so a later lookup
    /// can retry the identity.
    fn unreserve(&self, key: &ChunkKey, bucket_id: usize, len: u64) {
        let mut chain = self.table.lock(bucket_id);
        if let Some(pos) = chain
            .iter()
            .position(|c| c.key() == key && c.is_reserved())
        {
            chain.swap_remove(pos);
        }
        drop(chain);
        self.bytes_used.fetch_sub(len, Ordering::Relaxed);
    }

    fn remove(&self, block: &dyn BlockSource, object_id: u32, offset: u64, size: u64) {
        if size == 0 {
            return;
        }
        let end = offset.saturating_add(size);

        // One identity per chunk stride across the range.
        let mut aligned = align_down(offset, self.chunk_size);
        while aligned < end {
            let key = ChunkKey::new(block.name(), object_id, aligned, self.chunk_size);
            let bucket_id = self.table.bucket_of(&key);

            let mut chain = self.table.lock(bucket_id);
            if let Some(pos) = chain
                .iter()
                .position(|c| c.key() == &key && c.is_valid() && c.overlaps(offset, end))
            {
                let chunk = chain.swap_remove(pos);
                // Unlink the key while the bucket lock still blocks
                // re-admission, so a new chunk under this identity can never
                // lose its recency entry to us.
                self.recency.unlink(&key);
                drop(chain);

                trace!("remove: chunk {:?}, size {}", key, chunk.len());
                self.release_chunk(chunk);
            }
            aligned += self.chunk_size;
        }
    }

    /// Evict the coldest chunk. The recency pop commits the evictor to this
    /// key before any bucket lock is taken; a claim can still lose to a
    /// targeted invalidation, in which case there is nothing to free.
    pub(crate) fn evict_one(&self) -> bool {
        let Some(key) = self.recency.pop_tail() else {
            return false;
        };

        let bucket_id = self.table.bucket_of(&key);
        let mut chain = self.table.lock(bucket_id);
        let Some(pos) = chain
            .iter()
            .position(|c| c.key() == &key && c.is_valid())
        else {
            return false;
        };
        let chunk = chain.swap_remove(pos);
        drop(chain);

        trace!("evict: chunk {:?}, size {}", key, chunk.len());
        self.release_chunk(chunk);
        self.stats.chunks_evicted.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub(crate) fn over_capacity(&self) -> bool {
        self.bytes_used.load(Ordering::Relaxed) + self.chunk_size > self.capacity
    }

    /// Return a chunk's bytes to the backend and settle the gauges. The
    /// caller must already own the chunk (removed from its chain).
    fn release_chunk(&self, chunk: Chunk) {
        self.bytes_used.fetch_sub(chunk.len(), Ordering::Relaxed);
        if chunk.is_valid() {
            self.stats.chunks.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Free everything at shutdown, after the eviction thread has joined.
    fn drain(&self) {
        self.recency.clear();
        for bucket in self.table.buckets() {
            let mut chain = bucket.lock();
            for chunk in chain.drain(..) {
                self.release_chunk(chunk);
            }
        }
        debug_assert_eq!(self.bytes_used.load(Ordering::Relaxed), 0);
    }

    #[cfg(test)]
    pub(crate) fn check_integrity(&self) {
        let mut total = 0u64;
        let mut valid = 0usize;
        for bucket in self.table.buckets() {
            let chain = bucket.lock();
            let mut seen = std::collections::HashSet::new();
            for chunk in chain.iter() {
                assert!(
                    seen.insert(*chunk.key()),
                    "two chunks share an identity in one bucket"
                );
                total += chunk.len();
                if chunk.is_valid() {
                    valid += 1;
                    assert!(
                        self.recency.contains(chunk.key()),
                        "valid chunk missing from the recency list"
                    );
                }
            }
        }
        assert_eq!(total, self.bytes_used.load(Ordering::Relaxed));
        assert_eq!(valid, self.recency.len());
    }
}

/// Copy from a chunk's payload into the caller's buffer. `cursor` must fall
/// inside the chunk; the copy stops at the chunk or buffer end, whichever
/// comes first.
fn copy_out(chunk_offset: u64, data: &[u8], cursor: u64, dst: &mut [u8]) -> usize {
    let start = (cursor - chunk_offset) as usize;
    let copied = (data.len() - start).min(dst.len());
    dst[..copied].copy_from_slice(&data[start..start + copied]);
    copied
}
