//! Chunkcache Core - Shared types, configuration, and the backing-store contract
//!
//! This crate contains the foundational types used by the chunk cache engine.
//! It has no knowledge of the engine's internal data structures.

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::{BackendKind, ChunkCacheConfig, Config};
pub use error::Error;
pub use store::{BlockSource, FileBlock};
pub use types::ChunkKey;

/// Fixed width of the object-name prefix carried in a chunk's identity
pub const OBJECT_NAME_MAX: usize = 32;

/// Smallest allowed hash table size (buckets)
pub const MIN_HASHSIZE: u32 = 64;

/// Largest allowed hash table size (buckets)
pub const MAX_HASHSIZE: u32 = 1024 * 1024;

/// Hash table size used when the configuration leaves it at zero
pub const DEFAULT_HASHSIZE: u32 = 1024;

/// Default chunk granularity (1 MB)
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Default cache capacity (512 MB)
pub const DEFAULT_CAPACITY: u64 = 512 * 1024 * 1024;

/// Default eviction interval in milliseconds
pub const DEFAULT_EVICT_INTERVAL_MS: u64 = 1000;
