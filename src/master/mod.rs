//! Master Table
//!
//! Catalog of dictionaries in a data directory.
//!
//! ## Responsibilities
//! - Allocate dictionary identifiers (never reissued)
//! - Persist one configuration row per dictionary
//! - Rebuild dictionary handles from their rows after a restart
//!
//! ## Layout
//! The catalog is itself a dictionary (id 0) keyed by 8-byte unsigned ids
//! with 26-byte rows (see `row`). Key 0 is a header row whose `id` field is
//! the next identifier to hand out; the remaining fields describe the
//! catalog dictionary itself.

mod row;

use std::fs;

use crate::config::Config;
use crate::cursor::collect_records;
use crate::dictionary::Dictionary;
use crate::error::{CairnError, Result};
use crate::types::{
    DictionaryConfig, DictionaryId, EngineType, KeyType, WriteConcern, MASTER_TABLE_ID,
    UNASSIGNED_ID,
};

pub use row::{ROW_KEY_SIZE, ROW_SIZE};

use row::{decode_row, encode_row, row_key};

/// Slot/bucket count used when the catalog sits on a hash engine
const MASTER_CAPACITY: u64 = 1024;

/// First identifier handed to a user dictionary
const FIRST_DICTIONARY_ID: DictionaryId = 1;

/// Persistent catalog of dictionary configurations
pub struct MasterTable {
    config: Config,

    /// Backing catalog dictionary; `None` until initialized or after close
    dictionary: Option<Dictionary>,

    /// Next identifier to allocate (mirrors the header row)
    next_id: DictionaryId,
}

impl MasterTable {
    /// Create a handle for `config.data_dir`; call `initialize()` before use
    pub fn new(config: Config) -> Self {
        Self {
            config,
            dictionary: None,
            next_id: FIRST_DICTIONARY_ID,
        }
    }

    fn catalog_config(&self) -> DictionaryConfig {
        DictionaryConfig::new(
            MASTER_TABLE_ID,
            KeyType::Unsigned,
            ROW_KEY_SIZE as u32,
            ROW_SIZE as u32,
            MASTER_CAPACITY,
            self.config.master_engine,
        )
    }

    /// Open (or create) the catalog and recover the id counter
    ///
    /// On startup:
    /// 1. Create the data directory if it doesn't exist
    /// 2. Open the catalog dictionary, creating it when absent
    /// 3. Read the header row, writing a fresh one if missing
    /// 4. Raise the counter past every stored row id
    pub fn initialize(&mut self) -> Result<()> {
        if self.dictionary.is_some() {
            self.close()?;
        }
        fs::create_dir_all(&self.config.data_dir)?;

        let catalog = self.catalog_config();
        let mut dictionary = Dictionary::open_existing(&self.config.data_dir, catalog, &self.config)?;
        dictionary.set_write_concern(WriteConcern::Unique)?;

        let header_id = match dictionary.get(&row_key(MASTER_TABLE_ID)) {
            Ok(raw) => Some(decode_row(&raw)?.id),
            Err(CairnError::ItemNotFound) => None,
            Err(e) => return Err(e),
        };

        let highest = {
            let mut cursor = dictionary.all_records()?;
            let records = collect_records(cursor.as_mut())?;
            let mut highest = None;
            for record in records {
                if record.key == row_key(MASTER_TABLE_ID) {
                    continue;
                }
                highest = highest.max(Some(decode_row(&record.value)?.id));
            }
            highest
        };

        let recovered = highest.map_or(FIRST_DICTIONARY_ID, |id| id + 1);
        let next_id = match header_id {
            Some(stored) if stored >= recovered => stored,
            Some(stored) => {
                tracing::warn!(
                    "Master table header says next id {}, rows need {}; repairing",
                    stored,
                    recovered
                );
                recovered
            }
            None => recovered,
        };

        self.dictionary = Some(dictionary);
        self.next_id = next_id;
        if header_id != Some(next_id) {
            self.write_header()?;
        }

        tracing::info!(
            "Master table open at {} ({:?}, next id {})",
            self.config.data_dir.display(),
            self.config.master_engine,
            self.next_id
        );
        Ok(())
    }

    fn catalog(&mut self) -> Result<&mut Dictionary> {
        self.dictionary.as_mut().ok_or(CairnError::MasterTableClosed)
    }

    fn write_header(&mut self) -> Result<()> {
        let header = DictionaryConfig {
            id: self.next_id,
            ..self.catalog_config()
        };
        self.catalog()?.update(&row_key(MASTER_TABLE_ID), &encode_row(&header))?;
        Ok(())
    }

    /// Reserve the next identifier and persist the advanced counter
    fn allocate_id(&mut self) -> Result<DictionaryId> {
        self.catalog()?;
        let id = self.next_id;
        self.next_id += 1;
        self.write_header()?;
        tracing::debug!("Allocated dictionary id {}", id);
        Ok(id)
    }

    fn put_row(&mut self, config: &DictionaryConfig) -> Result<()> {
        self.catalog()?.insert(&row_key(config.id), &encode_row(config))?;
        Ok(())
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register an already-built dictionary under a fresh id.
    ///
    /// The dictionary is re-tagged: its engine is closed, its backing file
    /// renamed to the new id and the engine reopened.
    pub fn add(&mut self, dictionary: &mut Dictionary, capacity: u64) -> Result<DictionaryId> {
        let id = self.allocate_id()?;
        let config = DictionaryConfig {
            id,
            capacity,
            ..*dictionary.config()
        };
        self.put_row(&config)?;
        dictionary.retag(config)?;
        Ok(id)
    }

    /// Allocate an id, create the dictionary's storage and record its row
    pub fn initialize_dictionary(
        &mut self,
        key_type: KeyType,
        key_size: u32,
        value_size: u32,
        capacity: u64,
        engine_type: EngineType,
    ) -> Result<Dictionary> {
        self.catalog()?;
        let mut config =
            DictionaryConfig::new(UNASSIGNED_ID, key_type, key_size, value_size, capacity, engine_type);
        config.validate()?;

        config.id = self.allocate_id()?;
        let dictionary = Dictionary::create(&self.config.data_dir, config, &self.config)?;
        self.put_row(&config)?;
        Ok(dictionary)
    }

    // =========================================================================
    // Lookup and Reopen
    // =========================================================================

    /// Stored configuration of dictionary `id`
    pub fn lookup(&mut self, id: DictionaryId) -> Result<DictionaryConfig> {
        if id == MASTER_TABLE_ID {
            self.catalog()?;
            return Err(CairnError::ItemNotFound);
        }
        let raw = self.catalog()?.get(&row_key(id))?;
        decode_row(&raw)
    }

    /// Reopen `dictionary` using the stored row for `id`
    pub fn open_dictionary(&mut self, dictionary: &mut Dictionary, id: DictionaryId) -> Result<()> {
        let config = self.lookup(id)?;
        dictionary.open(config)
    }

    /// Build a new handle for dictionary `id` from its stored row
    pub fn load_dictionary(&mut self, id: DictionaryId) -> Result<Dictionary> {
        let config = self.lookup(id)?;
        Dictionary::open_existing(&self.config.data_dir, config, &self.config)
    }

    /// Flush and release a dictionary; its row stays registered
    pub fn close_dictionary(&mut self, dictionary: &mut Dictionary) -> Result<()> {
        self.catalog()?;
        dictionary.close()
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Erase a dictionary's storage and forget its row
    ///
    /// A dictionary without a row fails with `ItemNotFound` and keeps its
    /// storage.
    pub fn delete_dictionary(&mut self, dictionary: Dictionary) -> Result<()> {
        let id = dictionary.id();
        self.lookup(id)?;
        dictionary.erase()?;
        self.delete_entry(id)?;
        tracing::info!("Deleted dictionary {}", id);
        Ok(())
    }

    /// Forget the row for `id` without touching storage
    pub fn delete_entry(&mut self, id: DictionaryId) -> Result<()> {
        if id == MASTER_TABLE_ID {
            return Err(CairnError::invalid("the master table header cannot be deleted"));
        }
        self.catalog()?.delete(&row_key(id))?;
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Every registered dictionary, in id order
    pub fn entries(&mut self) -> Result<Vec<DictionaryConfig>> {
        let catalog = self.catalog()?;
        let mut cursor = catalog.all_records()?;
        let records = collect_records(cursor.as_mut())?;

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            if record.key == row_key(MASTER_TABLE_ID) {
                continue;
            }
            entries.push(decode_row(&record.value)?);
        }
        entries.sort_by_key(|config| config.id);
        Ok(entries)
    }

    /// Identifier the next registration will receive
    pub fn next_id(&self) -> Result<DictionaryId> {
        self.dictionary
            .as_ref()
            .map(|_| self.next_id)
            .ok_or(CairnError::MasterTableClosed)
    }

    pub fn is_open(&self) -> bool {
        self.dictionary.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flush and close the catalog
    pub fn close(&mut self) -> Result<()> {
        let mut dictionary = self.dictionary.take().ok_or(CairnError::MasterTableClosed)?;
        dictionary.close()?;
        tracing::info!("Master table closed (next id {})", self.next_id);
        Ok(())
    }
}
