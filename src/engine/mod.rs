//! Engine Module
//!
//! Interchangeable storage engines behind one trait.
//!
//! ## Responsibilities
//! - Define the `StorageEngine` contract every implementation honours
//! - Build engines from a `DictionaryConfig` (`create_engine` / `open_engine`)
//! - Validate keys, values and predicates before touching storage
//!
//! ## Engines
//! | Engine                | Storage          | Order      | Default write concern |
//! |-----------------------|------------------|------------|-----------------------|
//! | `BppTree`             | snapshot         | key order  | AllowDuplicates       |
//! | `SkipList`            | snapshot         | key order  | AllowDuplicates       |
//! | `FlatFile`            | record file      | file order | AllowDuplicates       |
//! | `OpenAddressHash`     | snapshot         | slot order | Unique                |
//! | `OpenAddressFileHash` | slot file        | slot order | Unique                |
//! | `LinearHash`          | snapshot         | bucket     | Unique                |

mod bpp_tree;
mod file_hash;
mod flat_file;
mod linear_hash;
mod open_address;
mod skip_list;

use std::fs;
use std::path::Path;

pub use bpp_tree::BppTree;
pub use file_hash::{FileSlots, OpenAddressFileHash};
pub use flat_file::FlatFile;
pub use linear_hash::LinearHash;
pub use open_address::{MemorySlots, OpenAddressHash, OpenAddressTable, Slot, SlotStore};
pub use skip_list::SkipList;

use crate::codec::RecordInfo;
use crate::config::Config;
use crate::cursor::Cursor;
use crate::error::{CairnError, Result};
use crate::predicate::Predicate;
use crate::types::{DictionaryConfig, EngineType, WriteConcern};

/// Uniform contract of every storage engine
///
/// Engines own their backing storage exclusively. Every write returns the
/// number of records it affected.
pub trait StorageEngine {
    /// Which implementation this is
    fn engine_type(&self) -> EngineType;

    /// Record layout this engine was built with
    fn record_info(&self) -> RecordInfo;

    fn write_concern(&self) -> WriteConcern;

    /// Change the duplicate-key policy for this instance
    fn set_write_concern(&mut self, write_concern: WriteConcern) -> Result<()>;

    /// Store a new record
    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<usize>;

    /// Value of the first record stored under `key`
    ///
    /// A successful get always reports one record. When duplicates are
    /// allowed, count the matches with an equality cursor instead.
    fn get(&mut self, key: &[u8]) -> Result<Vec<u8>>;

    /// Overwrite records stored under `key`, inserting if there are none
    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<usize>;

    /// Remove every record stored under `key`
    fn delete(&mut self, key: &[u8]) -> Result<usize>;

    /// Open a cursor over the records matching `predicate`
    fn find<'a>(&'a mut self, predicate: Predicate) -> Result<Box<dyn Cursor + 'a>>;

    /// Number of live records
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist state without releasing the engine; safe to retry on error
    fn flush(&mut self) -> Result<()>;

    /// Flush state and release the backing storage
    fn close(mut self: Box<Self>) -> Result<()> {
        self.flush()
    }

    /// Release and erase the backing storage
    fn destroy(self: Box<Self>) -> Result<()>;
}

// =============================================================================
// Factories
// =============================================================================

/// Create a fresh engine for `config` at `path`, replacing any existing storage
pub fn create_engine(
    config: &DictionaryConfig,
    path: &Path,
    tunables: &Config,
) -> Result<Box<dyn StorageEngine>> {
    config.validate()?;
    let info = config.record_info()?;

    tracing::debug!(
        "Creating {:?} engine for dictionary {} at {}",
        config.engine_type,
        config.id,
        path.display()
    );

    let engine: Box<dyn StorageEngine> = match config.engine_type {
        EngineType::BppTree => Box::new(BppTree::create(path, info, tunables)?),
        EngineType::FlatFile => Box::new(FlatFile::create(path, info, tunables)?),
        EngineType::OpenAddressFileHash => Box::new(OpenAddressFileHash::create(
            path,
            info,
            config.capacity,
            tunables,
        )?),
        EngineType::OpenAddressHash => Box::new(OpenAddressHash::create(
            path,
            info,
            config.capacity,
            tunables,
        )?),
        EngineType::SkipList => {
            Box::new(SkipList::create(path, info, config.capacity, tunables)?)
        }
        EngineType::LinearHash => {
            Box::new(LinearHash::create(path, info, config.capacity, tunables)?)
        }
    };
    Ok(engine)
}

/// Open the engine for `config` at `path`, creating empty storage if none exists
pub fn open_engine(
    config: &DictionaryConfig,
    path: &Path,
    tunables: &Config,
) -> Result<Box<dyn StorageEngine>> {
    config.validate()?;
    if !path.exists() {
        return create_engine(config, path, tunables);
    }

    let info = config.record_info()?;
    tracing::debug!(
        "Opening {:?} engine for dictionary {} at {}",
        config.engine_type,
        config.id,
        path.display()
    );

    let engine: Box<dyn StorageEngine> = match config.engine_type {
        EngineType::BppTree => Box::new(BppTree::open(path, info, tunables)?),
        EngineType::FlatFile => Box::new(FlatFile::open(path, info, tunables)?),
        EngineType::OpenAddressFileHash => Box::new(OpenAddressFileHash::open(
            path,
            info,
            config.capacity,
            tunables,
        )?),
        EngineType::OpenAddressHash => Box::new(OpenAddressHash::open(
            path,
            info,
            config.capacity,
            tunables,
        )?),
        EngineType::SkipList => Box::new(SkipList::open(path, info, config.capacity, tunables)?),
        EngineType::LinearHash => {
            Box::new(LinearHash::open(path, info, config.capacity, tunables)?)
        }
    };
    Ok(engine)
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Fail with `Corruption` when stored layout disagrees with the requested one
pub(crate) fn ensure_layout(path: &Path, stored: &RecordInfo, requested: &RecordInfo) -> Result<()> {
    if stored != requested {
        return Err(CairnError::Corruption(format!(
            "{} holds {:?}/{}/{} records, expected {:?}/{}/{}",
            path.display(),
            stored.key_type,
            stored.key_size,
            stored.value_size,
            requested.key_type,
            requested.key_size,
            requested.value_size
        )));
    }
    Ok(())
}

/// Remove a backing file if present
pub(crate) fn remove_storage(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

