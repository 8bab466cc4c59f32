//! Chunk metadata and lifecycle
//!
//! A chunk moves through `Reserved` (placeholder inserted by the first reader
//! to miss, fetch in flight) to `Valid` (payload published, readable by
//! anyone holding the bucket lock). It leaves the cache by being removed from
//! its bucket chain; the remover owns it and frees payload and metadata by
//! dropping it. Transitions are one-way.

use chunkcache_core::ChunkKey;

use crate::backend::Payload;

pub(crate) enum ChunkState {
    /// Placeholder: the reserving thread is fetching the payload. Observers
    /// back off and retry; nothing else may touch the chunk.
    Reserved,
    /// Payload published and readable.
    Valid(Payload),
}

pub(crate) struct Chunk {
    key: ChunkKey,
    /// Actual payload length: `min(configured chunk size, object size - offset)`
    len: u64,
    state: ChunkState,
}

impl Chunk {
    pub(crate) fn reserved(key: ChunkKey, len: u64) -> Self {
        Self {
            key,
            len,
            state: ChunkState::Reserved,
        }
    }

    pub(crate) fn key(&self) -> &ChunkKey {
        &self.key
    }

    pub(crate) fn offset(&self) -> u64 {
        self.key.chunk_offset
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    pub(crate) fn is_reserved(&self) -> bool {
        matches!(self.state, ChunkState::Reserved)
    }

    pub(crate) fn is_valid(&self) -> bool {
        matches!(self.state, ChunkState::Valid(_))
    }

    /// Payload bytes, if published.
    pub(crate) fn payload(&self) -> Option<&[u8]> {
        match &self.state {
            ChunkState::Reserved => None,
            ChunkState::Valid(payload) => Some(payload),
        }
    }

    /// Publish the fetched payload: Reserved -> Valid.
    pub(crate) fn publish(&mut self, payload: Payload) {
        debug_assert!(self.is_reserved());
        debug_assert_eq!(payload.len() as u64, self.len);
        self.state = ChunkState::Valid(payload);
    }

    /// Does `[start, end)` intersect this chunk's byte range?
    pub(crate) fn overlaps(&self, start: u64, end: u64) -> bool {
        let chunk_start = self.offset();
        let chunk_end = chunk_start + self.len;
        chunk_start < end && start < chunk_end
    }
}

/// Payload length for the chunk at `aligned_offset`: chunks cannot extend
/// past the end of the object.
pub(crate) fn chunk_extent(chunk_size: u64, object_size: u64, aligned_offset: u64) -> u64 {
    chunk_size.min(object_size - aligned_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn key(offset: u64) -> ChunkKey {
        ChunkKey::new("obj", 1, offset, 4096)
    }

    #[test]
    fn test_lifecycle() {
        let mut chunk = Chunk::reserved(key(4096), 4096);
        assert!(chunk.is_reserved());
        assert!(chunk.payload().is_none());

        let payload = MemoryBackend::Dram.alloc(4096).unwrap();
        chunk.publish(payload);
        assert!(chunk.is_valid());
        assert_eq!(chunk.payload().unwrap().len(), 4096);
    }

    #[test]
    fn test_overlaps() {
        let chunk = Chunk::reserved(key(4096), 4096);

        assert!(chunk.overlaps(4096, 8192));
        assert!(chunk.overlaps(0, 4097));
        assert!(chunk.overlaps(8191, 8192));
        assert!(chunk.overlaps(0, u64::MAX));

        assert!(!chunk.overlaps(0, 4096));
        assert!(!chunk.overlaps(8192, 16384));
    }

    #[test]
    fn test_chunk_extent() {
        // Interior chunk
        assert_eq!(chunk_extent(4096, 100_000, 4096), 4096);
        // Tail chunk of an object that is not a chunk-size multiple
        assert_eq!(chunk_extent(4096, 10_000, 8192), 10_000 - 8192);
        // Object smaller than one chunk
        assert_eq!(chunk_extent(4096, 100, 0), 100);
    }
}
