//! Configuration for Tessera
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, TesseraError};
use crate::storage::{DEFAULT_BLOCKS_PER_PAGE, DEFAULT_BLOCK_CAPACITY};

/// Main configuration for a Tessera store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the store file. One store is exactly one file:
    ///   {path}
    ///     ├── header           (128 bytes)
    ///     └── pages...         (blocks_per_page block records each)
    pub path: PathBuf,

    /// Which medium backs the store file
    pub backend: Backend,

    // -------------------------------------------------------------------------
    // Geometry (fixed when the store is created)
    // -------------------------------------------------------------------------
    /// Payload bytes per block
    pub block_capacity: u64,

    /// Blocks added per growth step
    pub blocks_per_page: u64,

    // -------------------------------------------------------------------------
    // Durability
    // -------------------------------------------------------------------------
    /// When the header is fsynced and the directory rewritten
    pub sync_strategy: SyncStrategy,
}

/// Backing medium for the store file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Growable memory-mapped region
    Mapped,

    /// Positioned reads and writes on a file stream
    Stream,
}

/// Durability strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync the header after every structural change and persist the
    /// directory after every directory mutation (safest, slowest)
    EveryChange,

    /// Write headers without fsync; persist the directory only on
    /// `Engine::sync` and `Engine::close`
    OnClose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./tessera.db"),
            backend: Backend::Mapped,
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            blocks_per_page: DEFAULT_BLOCKS_PER_PAGE,
            sync_strategy: SyncStrategy::EveryChange,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject configurations the store cannot be created with
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(TesseraError::Config("store path is empty".to_string()));
        }
        if self.block_capacity == 0 {
            return Err(TesseraError::Config(
                "block capacity must be at least 1 byte".to_string(),
            ));
        }
        if self.blocks_per_page == 0 {
            return Err(TesseraError::Config(
                "a page must hold at least one block".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the backing medium
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the payload capacity of each block (in bytes)
    pub fn block_capacity(mut self, bytes: u64) -> Self {
        self.config.block_capacity = bytes;
        self
    }

    /// Set how many blocks each growth step adds
    pub fn blocks_per_page(mut self, count: u64) -> Self {
        self.config.blocks_per_page = count;
        self
    }

    /// Set the durability strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
