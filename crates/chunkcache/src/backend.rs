//! Memory backend - chunk payload allocation
//!
//! Payload buffers come from one of two backends: the volatile heap, or a
//! persistent-memory region carved out of a file (feature `pmem`). The
//! backend knows nothing about chunks; a payload's lifetime is owned by the
//! chunk that allocated it and the buffer returns to its backend on drop.

use std::ops::{Deref, DerefMut};

use tracing::warn;

use chunkcache_core::{BackendKind, ChunkCacheConfig, Error};

#[cfg(feature = "pmem")]
use crate::pmem::{PmemRegion, PmemSlot};

/// Payload allocator selected at setup.
pub(crate) enum MemoryBackend {
    /// Heap allocations
    Dram,
    /// Slots in a file-backed persistent-memory region
    #[cfg(feature = "pmem")]
    Pmem(PmemRegion),
}

impl MemoryBackend {
    /// Build the backend described by a validated configuration.
    pub(crate) fn from_config(config: &ChunkCacheConfig) -> Result<Self, Error> {
        match config.backend {
            BackendKind::Dram => Ok(MemoryBackend::Dram),
            #[cfg(feature = "pmem")]
            BackendKind::File => {
                // validate() guarantees the path is present and absolute.
                let path = config
                    .device_path
                    .as_ref()
                    .ok_or_else(|| Error::InvalidConfig("device_path is required".into()))?;
                let region = PmemRegion::create(path, config.capacity, config.chunk_size)?;
                Ok(MemoryBackend::Pmem(region))
            }
            #[cfg(not(feature = "pmem"))]
            BackendKind::File => Err(Error::InvalidConfig(
                "chunk cache of type file requires the pmem feature".into(),
            )),
        }
    }

    /// Allocate a zeroed payload of exactly `len` bytes.
    pub(crate) fn alloc(&self, len: usize) -> Result<Payload, Error> {
        match self {
            MemoryBackend::Dram => {
                let mut buf = Vec::new();
                if buf.try_reserve_exact(len).is_err() {
                    warn!("payload allocation of {} bytes failed", len);
                    return Err(Error::OutOfMemory);
                }
                buf.resize(len, 0);
                Ok(Payload::Dram(buf.into_boxed_slice()))
            }
            #[cfg(feature = "pmem")]
            MemoryBackend::Pmem(region) => region.alloc(len).map(Payload::Pmem),
        }
    }
}

/// An owned chunk payload buffer.
///
/// Dropping the payload returns the memory to the backend that produced it,
/// so allocation and free always pair up.
pub(crate) enum Payload {
    Dram(Box<[u8]>),
    #[cfg(feature = "pmem")]
    Pmem(PmemSlot),
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Payload::Dram(buf) => buf,
            #[cfg(feature = "pmem")]
            Payload::Pmem(slot) => slot,
        }
    }
}

impl DerefMut for Payload {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            Payload::Dram(buf) => buf,
            #[cfg(feature = "pmem")]
            Payload::Pmem(slot) => slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dram_alloc_len_and_zeroed() {
        let backend = MemoryBackend::Dram;
        let payload = backend.alloc(4096).unwrap();
        assert_eq!(payload.len(), 4096);
        assert!(payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_dram_payload_writable() {
        let backend = MemoryBackend::Dram;
        let mut payload = backend.alloc(64).unwrap();
        payload[0] = 0xAB;
        payload[63] = 0xCD;
        assert_eq!(payload[0], 0xAB);
        assert_eq!(payload[63], 0xCD);
    }

    #[cfg(not(feature = "pmem"))]
    #[test]
    fn test_file_backend_requires_pmem_feature() {
        let config = ChunkCacheConfig {
            enabled: true,
            backend: BackendKind::File,
            device_path: Some("/tmp/pmem".into()),
            ..Default::default()
        };
        assert!(matches!(
            MemoryBackend::from_config(&config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
