//! Dictionary Facade
//!
//! The handle callers hold for one dictionary instance.
//!
//! ## Responsibilities
//! - Own the engine (`Box<dyn StorageEngine>`) and the instance header
//! - Dispatch record operations and queries to the engine
//! - Track open/closed status and reject use of a closed dictionary
//!
//! Dropping a `Dictionary` releases its engine without saving in-memory
//! state; call `close()` to persist.
//!
//! A dictionary created with `UNASSIGNED_ID` gets a private placeholder file
//! (`unassigned-<pid>-<seq>.<ext>`) until a master table registers it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::Config;
use crate::cursor::Cursor;
use crate::engine::{self, StorageEngine};
use crate::error::{CairnError, Result};
use crate::predicate::Predicate;
use crate::types::{
    DictionaryConfig, DictionaryId, DictionaryStatus, EngineType, WriteConcern, UNASSIGNED_ID,
};

/// Sequence for placeholder files created by this process
static PLACEHOLDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Fresh backing file for a dictionary that has no id yet
fn placeholder_path(data_dir: &Path, engine_type: EngineType) -> PathBuf {
    loop {
        let seq = PLACEHOLDER_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = data_dir.join(format!(
            "unassigned-{}-{}.{}",
            std::process::id(),
            seq,
            engine_type.extension()
        ));
        if !path.exists() {
            return path;
        }
    }
}

/// Backing file for `config`; unassigned dictionaries get a placeholder
fn backing_path(data_dir: &Path, config: &DictionaryConfig) -> PathBuf {
    if config.id == UNASSIGNED_ID {
        placeholder_path(data_dir, config.engine_type)
    } else {
        config.storage_path(data_dir)
    }
}

/// A single key/value dictionary bound to one engine
pub struct Dictionary {
    /// Directory holding the backing file
    data_dir: PathBuf,

    /// Backing file owned by this dictionary
    path: PathBuf,

    /// Instance header
    config: DictionaryConfig,

    /// Engine tunables used whenever the engine is (re)built
    tunables: Config,

    /// `None` once closed or destroyed
    engine: Option<Box<dyn StorageEngine>>,

    status: DictionaryStatus,
}

impl Dictionary {
    /// Create a dictionary with fresh storage
    pub fn create(data_dir: &Path, config: DictionaryConfig, tunables: &Config) -> Result<Self> {
        let path = backing_path(data_dir, &config);
        let engine = engine::create_engine(&config, &path, tunables)?;
        tracing::info!(
            "Created dictionary {} at {} ({:?}, key {:?}/{}, value {})",
            config.id,
            path.display(),
            config.engine_type,
            config.key_type,
            config.key_size,
            config.value_size
        );
        Ok(Self::with_engine(data_dir, path, config, tunables, engine))
    }

    /// Open a dictionary over its existing storage
    ///
    /// An unassigned config has no file to find, so it opens empty.
    pub fn open_existing(data_dir: &Path, config: DictionaryConfig, tunables: &Config) -> Result<Self> {
        let path = backing_path(data_dir, &config);
        let engine = engine::open_engine(&config, &path, tunables)?;
        Ok(Self::with_engine(data_dir, path, config, tunables, engine))
    }

    fn with_engine(
        data_dir: &Path,
        path: PathBuf,
        config: DictionaryConfig,
        tunables: &Config,
        engine: Box<dyn StorageEngine>,
    ) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            path,
            config,
            tunables: tunables.clone(),
            engine: Some(engine),
            status: DictionaryStatus::Ok,
        }
    }

    fn engine(&mut self) -> Result<&mut Box<dyn StorageEngine>> {
        self.engine.as_mut().ok_or(CairnError::DictionaryClosed)
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Store a record; returns the number inserted
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.engine()?.insert(key, value)
    }

    /// Value of the first record under `key`
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.engine()?.get(key)
    }

    /// Overwrite records under `key`, inserting when absent
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.engine()?.update(key, value)
    }

    /// Remove every record under `key`
    pub fn delete(&mut self, key: &[u8]) -> Result<usize> {
        self.engine()?.delete(key)
    }

    /// Number of live records
    pub fn len(&self) -> Result<u64> {
        self.engine
            .as_ref()
            .map(|e| e.len())
            .ok_or(CairnError::DictionaryClosed)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Cursor over records matching `predicate`
    pub fn find(&mut self, predicate: Predicate) -> Result<Box<dyn Cursor + '_>> {
        self.engine()?.find(predicate)
    }

    pub fn equality(&mut self, key: impl Into<Vec<u8>>) -> Result<Box<dyn Cursor + '_>> {
        self.find(Predicate::equality(key))
    }

    /// Records with keys in `[lower, upper]`
    pub fn range(
        &mut self,
        lower: impl Into<Vec<u8>>,
        upper: impl Into<Vec<u8>>,
    ) -> Result<Box<dyn Cursor + '_>> {
        self.find(Predicate::range(lower, upper))
    }

    pub fn all_records(&mut self) -> Result<Box<dyn Cursor + '_>> {
        self.find(Predicate::AllRecords)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Reopen with `config`, closing the current engine first if still open
    pub fn open(&mut self, config: DictionaryConfig) -> Result<()> {
        if self.engine.is_some() {
            self.close()?;
        }
        let path = if config.id == self.config.id && config.engine_type == self.config.engine_type {
            self.path.clone()
        } else {
            backing_path(&self.data_dir, &config)
        };
        let engine = engine::open_engine(&config, &path, &self.tunables)?;
        tracing::debug!("Opened dictionary {} ({:?})", config.id, config.engine_type);
        self.config = config;
        self.path = path;
        self.engine = Some(engine);
        self.status = DictionaryStatus::Ok;
        Ok(())
    }

    /// Flush and release the engine; the backing storage is kept
    ///
    /// If the flush fails the dictionary stays open, so close can be retried.
    pub fn close(&mut self) -> Result<()> {
        self.engine()?.flush()?;
        self.engine = None;
        self.status = DictionaryStatus::Closed;
        tracing::debug!("Closed dictionary {}", self.config.id);
        Ok(())
    }

    /// Release the engine and erase its backing storage
    pub fn destroy(mut self) -> Result<()> {
        let engine = self.engine.take().ok_or(CairnError::DictionaryClosed)?;
        engine.destroy()?;
        tracing::info!("Destroyed dictionary {}", self.config.id);
        Ok(())
    }

    /// Erase backing storage whether or not the engine is open
    pub(crate) fn erase(mut self) -> Result<()> {
        match self.engine.take() {
            Some(engine) => engine.destroy(),
            None => engine::remove_storage(&self.path),
        }
    }

    pub fn set_write_concern(&mut self, write_concern: WriteConcern) -> Result<()> {
        self.engine()?.set_write_concern(write_concern)
    }

    pub fn write_concern(&self) -> Result<WriteConcern> {
        self.engine
            .as_ref()
            .map(|e| e.write_concern())
            .ok_or(CairnError::DictionaryClosed)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &DictionaryConfig {
        &self.config
    }

    pub fn status(&self) -> DictionaryStatus {
        self.status
    }

    pub fn id(&self) -> DictionaryId {
        self.config.id
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the engine's backing file
    pub fn storage_path(&self) -> PathBuf {
        self.path.clone()
    }

    /// Rebind to `config` (a new id and capacity), moving the backing file
    pub(crate) fn retag(&mut self, config: DictionaryConfig) -> Result<()> {
        let was_open = self.engine.is_some();
        if was_open {
            self.close()?;
        }

        let to = backing_path(&self.data_dir, &config);
        if self.path != to && self.path.exists() {
            std::fs::rename(&self.path, &to)?;
        }
        tracing::debug!("Retagged dictionary {} as {}", self.config.id, config.id);
        self.config = config;
        self.path = to;

        if was_open {
            self.open(config)?;
        }
        Ok(())
    }
}
