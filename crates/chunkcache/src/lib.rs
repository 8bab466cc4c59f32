//! Chunkcache - block-granularity chunk cache over an immutable backing store
//!
//! Upper layers request arbitrary byte ranges of a logical block; the cache
//! serves them from a bounded pool of fixed-size chunks, fetching missing
//! chunks from the backing store exactly once per concurrent request storm,
//! while a background evictor keeps residency under the configured capacity.
//!
//! # Architecture
//!
//! ```text
//!  get(block, object, offset, dst)         remove(block, object, range)
//!        │                                        │
//!        ▼                                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Hash index: fixed table of buckets, one lock per bucket     │
//! │   chain entries: Chunk { key, len, Reserved | Valid(buf) }  │
//! └───────────────┬─────────────────────────────────────────────┘
//!                 │ keys of valid chunks
//!                 ▼
//! ┌─────────────────────────────┐    ┌───────────────────────────┐
//! │ Recency list (one lock)     │◀───│ Evictor thread            │
//! │   head = hottest            │    │   pop tail, claim, free   │
//! │   tail = eviction candidate │    │   one chunk per tick      │
//! └─────────────────────────────┘    └───────────────────────────┘
//! ```
//!
//! Lock order is bucket before recency everywhere except the evictor, which
//! pops the recency tail first and then claims the chunk under its bucket
//! lock; ownership of a chunk belongs to whichever actor unlinks it from its
//! chain, so the two can never free the same chunk twice.
//!
//! The cache is non-authoritative: allocation failures, capacity exhaustion,
//! and backing-store errors all degrade a lookup to a miss, and the caller
//! reads the block itself.

mod backend;
mod cache;
mod chunk;
mod evictor;
mod index;
#[cfg(feature = "pmem")]
mod pmem;
mod recency;
mod stats;

pub use cache::{ChunkCache, Lookup};
pub use stats::StatsSnapshot;

pub use chunkcache_core::{
    BackendKind, BlockSource, ChunkCacheConfig, ChunkKey, Config, Error, FileBlock,
};

/// How many times a lookup re-probes a chunk whose fetch is in flight before
/// taking a soft miss.
pub const MAX_RETRIES: u32 = 32 * 1024;
