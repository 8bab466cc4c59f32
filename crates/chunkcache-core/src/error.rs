//! Error types for the chunk cache

use thiserror::Error;

/// Errors surfaced by the chunk cache.
///
/// Only `InvalidConfig` ever reaches a caller as an `Err`: the cache is
/// non-authoritative, so every runtime failure on the read path degrades to a
/// miss and the caller falls back to its own read path.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("chunk allocation failed")]
    OutOfMemory,

    #[error("backing store read failed: {0}")]
    BackingStore(#[from] std::io::Error),

    #[error("chunk cache capacity exceeded")]
    CapacityExhausted,

    #[error("chunk fetch still in flight")]
    Retry,
}

impl Error {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}
