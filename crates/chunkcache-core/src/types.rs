//! Chunk identity
//!
//! A chunk is addressed by `(object name prefix, object id, aligned offset)`.
//! The name prefix is a fixed-width truncation so the whole identity is plain
//! old data and compares by byte equality.

use crate::OBJECT_NAME_MAX;

/// Identity of a chunk in the cache.
///
/// The offset is always aligned down to a multiple of the configured chunk
/// size, so every byte of an object maps to exactly one key.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct ChunkKey {
    /// First `OBJECT_NAME_MAX` bytes of the object name, zero-padded
    pub object_name: [u8; OBJECT_NAME_MAX],
    /// Object id within the block store
    pub object_id: u32,
    /// Chunk-aligned byte offset within the object
    pub chunk_offset: u64,
}

impl ChunkKey {
    /// Build the key for the chunk containing `offset`.
    pub fn new(name: &str, object_id: u32, offset: u64, chunk_size: u64) -> Self {
        let mut object_name = [0u8; OBJECT_NAME_MAX];
        let bytes = name.as_bytes();
        let len = bytes.len().min(OBJECT_NAME_MAX);
        object_name[..len].copy_from_slice(&bytes[..len]);

        Self {
            object_name,
            object_id,
            chunk_offset: align_down(offset, chunk_size),
        }
    }

    /// Identity bytes fed to the bucket hash.
    pub fn hash_bytes(&self) -> [u8; OBJECT_NAME_MAX + 4 + 8] {
        let mut out = [0u8; OBJECT_NAME_MAX + 4 + 8];
        out[..OBJECT_NAME_MAX].copy_from_slice(&self.object_name);
        out[OBJECT_NAME_MAX..OBJECT_NAME_MAX + 4].copy_from_slice(&self.object_id.to_le_bytes());
        out[OBJECT_NAME_MAX + 4..].copy_from_slice(&self.chunk_offset.to_le_bytes());
        out
    }

    /// Name prefix with trailing padding stripped, for log messages.
    pub fn display_name(&self) -> &str {
        let end = self
            .object_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(OBJECT_NAME_MAX);
        std::str::from_utf8(&self.object_name[..end]).unwrap_or("<non-utf8>")
    }
}

impl std::fmt::Debug for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkKey")
            .field("object_name", &self.display_name())
            .field("object_id", &self.object_id)
            .field("chunk_offset", &self.chunk_offset)
            .finish()
    }
}

/// Round `offset` down to a multiple of `chunk_size`.
pub const fn align_down(offset: u64, chunk_size: u64) -> u64 {
    (offset / chunk_size) * chunk_size
}
