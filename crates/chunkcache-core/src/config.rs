//! Configuration for the chunk cache
//!
//! Supports TOML configuration files with sensible defaults. The cache lives
//! under a `[chunk_cache]` table:
//!
//! ```toml
//! [chunk_cache]
//! enabled = true
//! capacity = 1048576
//! chunk_size = 65536
//! hashsize = 64
//! type = "dram"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Error;
use crate::{
    DEFAULT_CAPACITY, DEFAULT_CHUNK_SIZE, DEFAULT_EVICT_INTERVAL_MS, DEFAULT_HASHSIZE,
    MAX_HASHSIZE, MIN_HASHSIZE,
};

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chunk cache settings
    pub chunk_cache: ChunkCacheConfig,
}

/// Where chunk payloads live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendKind {
    /// Volatile heap allocations
    #[default]
    Dram,
    /// Persistent-memory region backed by a file at `device_path`
    File,
}

impl TryFrom<String> for BackendKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        // The source accepts any case, and an empty value means DRAM.
        if value.is_empty() || value.eq_ignore_ascii_case("dram") {
            Ok(BackendKind::Dram)
        } else if value.eq_ignore_ascii_case("file") {
            Ok(BackendKind::File)
        } else {
            Err(format!("unknown chunk cache type {value:?}"))
        }
    }
}

impl From<BackendKind> for String {
    fn from(kind: BackendKind) -> String {
        match kind {
            BackendKind::Dram => "dram".to_string(),
            BackendKind::File => "file".to_string(),
        }
    }
}

/// Chunk cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkCacheConfig {
    /// If false, all cache entry points return immediately without doing work
    pub enabled: bool,
    /// Soft upper bound on resident payload bytes
    pub capacity: u64,
    /// Chunk granularity in bytes
    pub chunk_size: u64,
    /// Number of hash buckets; 0 selects the default, other values are
    /// clamped to the supported range
    pub hashsize: u32,
    /// Payload backend
    #[serde(rename = "type")]
    pub backend: BackendKind,
    /// Absolute path of the persistent-memory device; required for `type = "file"`
    pub device_path: Option<PathBuf>,
    /// Eviction thread wake interval in milliseconds
    pub evict_interval_ms: u64,
}

impl Default for ChunkCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: DEFAULT_CAPACITY,      // 512MB
            chunk_size: DEFAULT_CHUNK_SIZE,  // 1MB
            hashsize: 0,                     // 0 = DEFAULT_HASHSIZE
            backend: BackendKind::Dram,
            device_path: None,
            evict_interval_ms: DEFAULT_EVICT_INTERVAL_MS,
        }
    }
}

impl ChunkCacheConfig {
    /// Validate the configuration.
    ///
    /// A disabled cache is always valid; the remaining keys are only checked
    /// when the cache is actually going to be built.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        if self.capacity == 0 {
            return Err(Error::invalid_config(
                "chunk cache capacity must be greater than zero",
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::invalid_config(
                "chunk size must be greater than zero",
            ));
        }
        if self.evict_interval_ms == 0 {
            return Err(Error::invalid_config(
                "eviction interval must be greater than zero",
            ));
        }
        if self.backend == BackendKind::File {
            match &self.device_path {
                None => {
                    return Err(Error::invalid_config(
                        "chunk cache of type file requires device_path",
                    ))
                }
                Some(path) if !path.is_absolute() => {
                    return Err(Error::invalid_config(
                        "chunk cache device_path must be an absolute path",
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Bucket count the hash table will actually use: 0 selects the default
    /// and any other value is clamped to `[MIN_HASHSIZE, MAX_HASHSIZE]`.
    pub fn effective_hashsize(&self) -> u32 {
        if self.hashsize == 0 {
            DEFAULT_HASHSIZE
        } else {
            self.hashsize.clamp(MIN_HASHSIZE, MAX_HASHSIZE)
        }
    }
}

impl Config {
    /// Load configuration from a specific path, falling back to defaults when
    /// the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            debug!("config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("failed to read {path:?}: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse {path:?}: {e}")))?;

        info!("loaded config from {:?}", path);
        Ok(config)
    }

    /// Parse a configuration document from a string.
    pub fn parse(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.chunk_cache.enabled);
        assert_eq!(config.chunk_cache.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.chunk_cache.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.chunk_cache.backend, BackendKind::Dram);
        config.chunk_cache.validate().unwrap();
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [chunk_cache]
            enabled = true
            capacity = 1048576
        "#;
        let config = Config::parse(toml_str).unwrap();
        assert!(config.chunk_cache.enabled);
        assert_eq!(config.chunk_cache.capacity, 1048576);
        // Other values should be defaults
        assert_eq!(config.chunk_cache.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.chunk_cache.hashsize, 0);
    }

    #[test]
    fn test_type_case_insensitive() {
        for (text, kind) in [
            ("dram", BackendKind::Dram),
            ("DRAM", BackendKind::Dram),
            ("Dram", BackendKind::Dram),
            ("file", BackendKind::File),
            ("FILE", BackendKind::File),
            ("", BackendKind::Dram),
        ] {
            let doc = format!("[chunk_cache]\ntype = \"{text}\"\n");
            let config = Config::parse(&doc).unwrap();
            assert_eq!(config.chunk_cache.backend, kind, "type = {text:?}");
        }

        assert!(Config::parse("[chunk_cache]\ntype = \"ssd\"\n").is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.chunk_cache.enabled = true;
        config.chunk_cache.backend = BackendKind::File;
        config.chunk_cache.device_path = Some(PathBuf::from("/dev/pmem0"));

        let doc = toml::to_string(&config).unwrap();
        let parsed = Config::parse(&doc).unwrap();
        assert_eq!(parsed.chunk_cache.backend, BackendKind::File);
        assert_eq!(
            parsed.chunk_cache.device_path.as_deref(),
            Some(Path::new("/dev/pmem0"))
        );
    }

    #[test]
    fn test_validation_rejects_zeroes() {
        let mut cfg = ChunkCacheConfig {
            enabled: true,
            ..Default::default()
        };
        cfg.capacity = 0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        let mut cfg = ChunkCacheConfig {
            enabled: true,
            ..Default::default()
        };
        cfg.chunk_size = 0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_hashsize_clamped() {
        let mut cfg = ChunkCacheConfig {
            enabled: true,
            ..Default::default()
        };

        cfg.hashsize = 0;
        assert_eq!(cfg.effective_hashsize(), DEFAULT_HASHSIZE);

        cfg.hashsize = MIN_HASHSIZE;
        assert_eq!(cfg.effective_hashsize(), MIN_HASHSIZE);

        cfg.hashsize = MAX_HASHSIZE;
        assert_eq!(cfg.effective_hashsize(), MAX_HASHSIZE);

        // Out-of-range sizes are clamped, not rejected.
        cfg.hashsize = MIN_HASHSIZE - 1;
        assert_eq!(cfg.effective_hashsize(), MIN_HASHSIZE);
        cfg.validate().unwrap();

        cfg.hashsize = MAX_HASHSIZE + 1;
        assert_eq!(cfg.effective_hashsize(), MAX_HASHSIZE);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validation_device_path() {
        let mut cfg = ChunkCacheConfig {
            enabled: true,
            backend: BackendKind::File,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        cfg.device_path = Some(PathBuf::from("relative/pmem"));
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        cfg.device_path = Some(PathBuf::from("/abs/pmem"));
        cfg.validate().unwrap();
    }

    #[test]
    fn test_disabled_skips_validation() {
        // The source returns before looking at any other key when disabled.
        let cfg = ChunkCacheConfig {
            enabled: false,
            capacity: 0,
            chunk_size: 0,
            hashsize: 7,
            ..Default::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn test_sample_config() {
        let sample = Config::sample();
        assert!(sample.contains("[chunk_cache]"));
        assert!(sample.contains("capacity"));
    }

    #[test]
    fn test_config_load_missing() {
        let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(!config.chunk_cache.enabled); // Should use defaults
    }
}
