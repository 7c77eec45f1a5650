//! Open-address hashing
//!
//! Fixed-capacity table with linear probing and tombstones. The probing
//! rules live in `OpenAddressTable`; where the slots physically live is
//! abstracted by `SlotStore` (an in-memory vector here, a paged file in
//! `file_hash`).
//!
//! ## Probe Rules
//! - A key starts probing at `hash(key) % capacity` and wraps around
//! - Lookups stop only at an `Empty` slot or after `capacity` steps
//! - Deleted slots become tombstones, which keep probe chains intact
//! - Inserts reuse the first tombstone or empty slot seen on the chain

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ensure_layout, remove_storage, StorageEngine};
use crate::codec::RecordInfo;
use crate::config::Config;
use crate::cursor::{Cursor, EngineCursor, RecordSource};
use crate::error::{CairnError, Result};
use crate::predicate::Predicate;
use crate::storage::{read_snapshot, write_snapshot};
use crate::types::{hash_key, EngineType, Record, WriteConcern};

/// One slot of an open-address table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    Empty,
    Occupied { key: Vec<u8>, value: Vec<u8> },
    /// Tombstone left by a delete
    Deleted,
}

/// Physical home of an open-address table's slots
pub trait SlotStore {
    /// Engine type reported by tables over this store
    const ENGINE: EngineType;

    fn capacity(&self) -> u64;

    /// Read slot `index`; out-of-range indices are `Corruption`
    fn read_slot(&mut self, index: u64) -> Result<Slot>;

    fn write_slot(&mut self, index: u64, slot: &Slot) -> Result<()>;

    /// Persist a changed write concern (stores may defer this to `flush`)
    fn save_write_concern(&mut self, write_concern: WriteConcern) -> Result<()>;

    /// Persist everything not yet on disk
    fn flush(&mut self, info: &RecordInfo, write_concern: WriteConcern) -> Result<()>;

    /// Release and erase
    fn destroy(self) -> Result<()>;
}

/// Linear-probing hash table over any `SlotStore`
pub struct OpenAddressTable<S> {
    store: S,
    info: RecordInfo,
    write_concern: WriteConcern,
    len: u64,
}

/// In-memory open-address hash persisted by snapshot
pub type OpenAddressHash = OpenAddressTable<MemorySlots>;

impl<S: SlotStore> OpenAddressTable<S> {
    /// Wrap a store, counting its occupied slots
    pub(crate) fn from_store(
        mut store: S,
        info: RecordInfo,
        write_concern: WriteConcern,
    ) -> Result<Self> {
        let mut len = 0;
        for index in 0..store.capacity() {
            if matches!(store.read_slot(index)?, Slot::Occupied { .. }) {
                len += 1;
            }
        }
        Ok(Self {
            store,
            info,
            write_concern,
            len,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.store.capacity()
    }

    fn start_slot(&self, key: &[u8]) -> u64 {
        hash_key(self.info.key_type, key) % self.store.capacity()
    }

    /// Claim a slot for a new record, honouring the write concern
    fn place(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        let capacity = self.store.capacity();
        let start = self.start_slot(key);
        let unique = self.write_concern == WriteConcern::Unique;
        let mut free = None;

        for step in 0..capacity {
            let index = (start + step) % capacity;
            match self.store.read_slot(index)? {
                Slot::Empty => {
                    free.get_or_insert(index);
                    break;
                }
                Slot::Deleted => {
                    free.get_or_insert(index);
                    if !unique {
                        break;
                    }
                }
                Slot::Occupied { key: stored, .. } => {
                    if unique && stored == key {
                        return Err(CairnError::DuplicateKey);
                    }
                }
            }
        }

        match free {
            Some(index) => {
                let slot = Slot::Occupied {
                    key: key.to_vec(),
                    value: value.to_vec(),
                };
                self.store.write_slot(index, &slot)?;
                self.len += 1;
                Ok(1)
            }
            None => {
                tracing::warn!(
                    "Open-address table full ({} slots), rejecting insert",
                    capacity
                );
                Err(CairnError::DictionaryFull)
            }
        }
    }
}

impl<S: SlotStore> StorageEngine for OpenAddressTable<S> {
    fn engine_type(&self) -> EngineType {
        S::ENGINE
    }

    fn record_info(&self) -> RecordInfo {
        self.info
    }

    fn write_concern(&self) -> WriteConcern {
        self.write_concern
    }

    fn set_write_concern(&mut self, write_concern: WriteConcern) -> Result<()> {
        self.store.save_write_concern(write_concern)?;
        self.write_concern = write_concern;
        Ok(())
    }

    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.info.check_record(key, value)?;
        self.place(key, value)
    }

    fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.info.check_key(key)?;
        let capacity = self.store.capacity();
        let start = self.start_slot(key);

        for step in 0..capacity {
            match self.store.read_slot((start + step) % capacity)? {
                Slot::Empty => break,
                Slot::Occupied { key: stored, value } if stored == key => return Ok(value),
                _ => {}
            }
        }
        Err(CairnError::ItemNotFound)
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.info.check_record(key, value)?;
        let capacity = self.store.capacity();
        let start = self.start_slot(key);
        let mut count = 0;

        for step in 0..capacity {
            let index = (start + step) % capacity;
            match self.store.read_slot(index)? {
                Slot::Empty => break,
                Slot::Occupied { key: stored, .. } if stored == key => {
                    let slot = Slot::Occupied {
                        key: stored,
                        value: value.to_vec(),
                    };
                    self.store.write_slot(index, &slot)?;
                    count += 1;
                    if self.write_concern == WriteConcern::Unique {
                        break;
                    }
                }
                _ => {}
            }
        }

        if count == 0 {
            return self.place(key, value);
        }
        Ok(count)
    }

    fn delete(&mut self, key: &[u8]) -> Result<usize> {
        self.info.check_key(key)?;
        let capacity = self.store.capacity();
        let start = self.start_slot(key);
        let mut count = 0;

        for step in 0..capacity {
            let index = (start + step) % capacity;
            match self.store.read_slot(index)? {
                Slot::Empty => break,
                Slot::Occupied { key: stored, .. } if stored == key => {
                    self.store.write_slot(index, &Slot::Deleted)?;
                    count += 1;
                }
                _ => {}
            }
        }

        if count == 0 {
            return Err(CairnError::ItemNotFound);
        }
        self.len -= count as u64;
        Ok(count)
    }

    fn find<'a>(&'a mut self, predicate: Predicate) -> Result<Box<dyn Cursor + 'a>> {
        predicate.validate(&self.info)?;
        let capacity = self.store.capacity();
        let (position, chain) = match &predicate {
            Predicate::Equality(key) => (self.start_slot(key), true),
            _ => (0, false),
        };

        let scan = SlotScan {
            table: self,
            predicate,
            chain,
            position,
            steps: 0,
            capacity,
        };
        Ok(Box::new(EngineCursor::start(scan)?))
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn flush(&mut self) -> Result<()> {
        self.store.flush(&self.info, self.write_concern)
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        let table = *self;
        table.store.destroy()
    }
}

/// Cursor source over slots.
///
/// Equality walks the key's probe chain; ranges scan every slot in index
/// order.
struct SlotScan<'a, S> {
    table: &'a mut OpenAddressTable<S>,
    predicate: Predicate,
    chain: bool,
    position: u64,
    steps: u64,
    capacity: u64,
}

impl<S: SlotStore> RecordSource for SlotScan<'_, S> {
    fn next_match(&mut self) -> Result<Option<Record>> {
        let key_type = self.table.info.key_type;
        while self.steps < self.capacity {
            let index = self.position;
            self.steps += 1;
            self.position = (self.position + 1) % self.capacity;

            match self.table.store.read_slot(index)? {
                Slot::Empty if self.chain => {
                    self.steps = self.capacity;
                    return Ok(None);
                }
                Slot::Occupied { key, value } if self.predicate.matches(key_type, &key) => {
                    return Ok(Some(Record { key, value }));
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

// =============================================================================
// In-Memory Slots
// =============================================================================

/// Snapshot image of an in-memory table
#[derive(Serialize, Deserialize)]
struct MemoryImage<S> {
    info: RecordInfo,
    write_concern: WriteConcern,
    slots: S,
}

/// Slots held in a vector, saved to a snapshot on close
pub struct MemorySlots {
    slots: Vec<Slot>,
    path: PathBuf,
    sync: bool,
}

impl SlotStore for MemorySlots {
    const ENGINE: EngineType = EngineType::OpenAddressHash;

    fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    fn read_slot(&mut self, index: u64) -> Result<Slot> {
        self.slots.get(index as usize).cloned().ok_or_else(|| {
            CairnError::Corruption(format!(
                "slot {} outside table of {}",
                index,
                self.slots.len()
            ))
        })
    }

    fn write_slot(&mut self, index: u64, slot: &Slot) -> Result<()> {
        let len = self.slots.len();
        let target = self.slots.get_mut(index as usize).ok_or_else(|| {
            CairnError::Corruption(format!("slot {} outside table of {}", index, len))
        })?;
        *target = slot.clone();
        Ok(())
    }

    fn save_write_concern(&mut self, _write_concern: WriteConcern) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self, info: &RecordInfo, write_concern: WriteConcern) -> Result<()> {
        let image = MemoryImage {
            info: *info,
            write_concern,
            slots: &self.slots,
        };
        write_snapshot(&self.path, Self::ENGINE, &image, self.sync)
    }

    fn destroy(self) -> Result<()> {
        remove_storage(&self.path)
    }
}

impl OpenAddressTable<MemorySlots> {
    /// Fresh table of `capacity` empty slots; any old snapshot is discarded
    pub fn create(path: &Path, info: RecordInfo, capacity: u64, config: &Config) -> Result<Self> {
        if capacity == 0 {
            return Err(CairnError::invalid("hash table capacity must be positive"));
        }
        remove_storage(path)?;

        let store = MemorySlots {
            slots: vec![Slot::Empty; capacity as usize],
            path: path.to_path_buf(),
            sync: config.sync_writes,
        };
        Ok(Self {
            store,
            info,
            write_concern: EngineType::OpenAddressHash.default_write_concern(),
            len: 0,
        })
    }

    /// Restore from snapshot, or start fresh if there is none
    pub fn open(path: &Path, info: RecordInfo, capacity: u64, config: &Config) -> Result<Self> {
        if !path.exists() {
            return Self::create(path, info, capacity, config);
        }

        let image: MemoryImage<Vec<Slot>> = read_snapshot(path, EngineType::OpenAddressHash)?;
        ensure_layout(path, &image.info, &info)?;
        if image.slots.is_empty() {
            return Err(CairnError::Corruption(format!(
                "{} holds a table with no slots",
                path.display()
            )));
        }

        let store = MemorySlots {
            slots: image.slots,
            path: path.to_path_buf(),
            sync: config.sync_writes,
        };
        Self::from_store(store, info, image.write_concern)
    }
}
