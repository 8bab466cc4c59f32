//! Persistent-memory payload region
//!
//! The pmem backend maps a file at the configured `device_path` and carves it
//! into chunk-size slots handed out from a free list. The index is never
//! persisted; only payload bytes live in the region, so no flushing is
//! required for correctness.

use std::fs::OpenOptions;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

use memmap2::MmapMut;
use parking_lot::Mutex;
use tracing::debug;

use chunkcache_core::Error;

/// Extra slots beyond `capacity / chunk_size`. Admission is advisory and may
/// transiently overshoot capacity; the slack absorbs that window.
const SLOT_SLACK: u64 = 8;

struct RegionInner {
    /// Keeps the mapping alive; all access goes through `base`.
    _map: MmapMut,
    base: *mut u8,
    slot_size: usize,
    /// Byte offsets of unallocated slots
    free: Mutex<Vec<usize>>,
}

// SAFETY: slots are disjoint byte ranges of the mapping and each offset is
// held by at most one `PmemSlot` at a time (enforced by the free list), so a
// slot's bytes are only ever touched through its unique owner.
unsafe impl Send for RegionInner {}
unsafe impl Sync for RegionInner {}

/// A file-backed region of chunk-size payload slots.
pub(crate) struct PmemRegion {
    inner: Arc<RegionInner>,
}

impl PmemRegion {
    /// Create (or reuse) the region file and map it.
    pub(crate) fn create(path: &Path, capacity: u64, chunk_size: u64) -> Result<Self, Error> {
        let slots = capacity.div_ceil(chunk_size) + SLOT_SLACK;
        let total = slots * chunk_size;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                Error::InvalidConfig(format!("chunk cache failed to open pmem region {path:?}: {e}"))
            })?;
        file.set_len(total).map_err(|e| {
            Error::InvalidConfig(format!("chunk cache failed to size pmem region {path:?}: {e}"))
        })?;

        // SAFETY: the region file is owned by this cache instance; nothing
        // else maps or resizes it while the mapping is live.
        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
            Error::InvalidConfig(format!("chunk cache failed to map pmem region {path:?}: {e}"))
        })?;
        let base = map.as_mut_ptr();

        debug!(
            "pmem region at {:?}: {} slots of {} bytes",
            path, slots, chunk_size
        );

        let free = (0..slots as usize)
            .rev()
            .map(|i| i * chunk_size as usize)
            .collect();

        Ok(Self {
            inner: Arc::new(RegionInner {
                _map: map,
                base,
                slot_size: chunk_size as usize,
                free: Mutex::new(free),
            }),
        })
    }

    /// Take a free slot; `len` must not exceed the slot size.
    pub(crate) fn alloc(&self, len: usize) -> Result<PmemSlot, Error> {
        debug_assert!(len <= self.inner.slot_size);
        let offset = self.inner.free.lock().pop().ok_or(Error::OutOfMemory)?;
        let mut slot = PmemSlot {
            region: Arc::clone(&self.inner),
            offset,
            len,
        };
        // Slots are recycled; present each allocation zeroed like the heap.
        slot.fill(0);
        Ok(slot)
    }

    #[cfg(test)]
    pub(crate) fn free_slots(&self) -> usize {
        self.inner.free.lock().len()
    }
}

/// An allocated payload slot; returns to the region's free list on drop.
pub(crate) struct PmemSlot {
    region: Arc<RegionInner>,
    offset: usize,
    len: usize,
}

impl Deref for PmemSlot {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: `offset..offset + len` is inside the mapping and disjoint
        // from every other live slot.
        unsafe { std::slice::from_raw_parts(self.region.base.add(self.offset), self.len) }
    }
}

impl DerefMut for PmemSlot {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` makes the access exclusive.
        unsafe { std::slice::from_raw_parts_mut(self.region.base.add(self.offset), self.len) }
    }
}

impl Drop for PmemSlot {
    fn drop(&mut self) {
        self.region.free.lock().push(self.offset);
    }
}
