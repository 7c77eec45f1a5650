//! Configuration for cairnkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::types::EngineType;

/// Main configuration for a cairnkv data directory
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 0.{ext}          (master table)
    ///     └── {id}.{ext}       (one file per dictionary)
    pub data_dir: PathBuf,

    /// Engine backing the master table
    pub master_engine: EngineType,

    /// fsync after every page/record write on file-backed engines
    pub sync_writes: bool,

    // -------------------------------------------------------------------------
    // Engine Tunables
    // -------------------------------------------------------------------------
    /// Maximum children per B+ tree node (keys per node = order - 1)
    pub bpp_tree_order: usize,

    /// Records a linear hash bucket holds before it counts as overflowing
    pub linear_hash_records_per_bucket: usize,

    /// Load factor (percent) at which linear hash splits the next bucket
    pub linear_hash_split_threshold: usize,

    /// Fixed seed for skip list level selection (entropy when None)
    pub skip_list_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./cairnkv_data"),
            master_engine: EngineType::FlatFile,
            sync_writes: false,
            bpp_tree_order: 4,
            linear_hash_records_per_bucket: 4,
            linear_hash_split_threshold: 85,
            skip_list_seed: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the engine that backs the master table
    pub fn master_engine(mut self, engine: EngineType) -> Self {
        self.config.master_engine = engine;
        self
    }

    /// Enable or disable fsync after each write on file engines
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Set the B+ tree order
    pub fn bpp_tree_order(mut self, order: usize) -> Self {
        self.config.bpp_tree_order = order;
        self
    }

    /// Set the number of records per linear hash bucket
    pub fn linear_hash_records_per_bucket(mut self, count: usize) -> Self {
        self.config.linear_hash_records_per_bucket = count;
        self
    }

    /// Set the linear hash split threshold (percent)
    pub fn linear_hash_split_threshold(mut self, percent: usize) -> Self {
        self.config.linear_hash_split_threshold = percent;
        self
    }

    /// Seed skip list level selection for reproducible layouts
    pub fn skip_list_seed(mut self, seed: u64) -> Self {
        self.config.skip_list_seed = Some(seed);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
