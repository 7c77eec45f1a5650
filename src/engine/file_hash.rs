//! Open-Address File Hash
//!
//! The open-address table with one slot per fixed-size page in a file.
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Header (28 bytes)                                          │
//! │   Magic "CKOH" (4) │ Version (2) │ Key type (1)            │
//! │   Key size (4) │ Value size (4) │ Capacity (8) │ WC (1)    │
//! │   CRC32 (4)                                                │
//! ├────────────────────────────────────────────────────────────┤
//! │ Slot 0: Status (1) │ Key (key_size) │ Value (value_size)   │
//! │ Slot 1: ...                                                │
//! │ ...                                                        │
//! │ Slot capacity-1                                            │
//! └────────────────────────────────────────────────────────────┘
//! ```
//! Status is 0 for empty, 1 for occupied and 2 for a tombstone.

use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};

use super::open_address::{OpenAddressTable, Slot, SlotStore};
use super::{ensure_layout, remove_storage};
use crate::codec::RecordInfo;
use crate::config::Config;
use crate::error::{CairnError, Result};
use crate::storage::{open_header, seal_header, PagedFile, HEADER_OVERHEAD};
use crate::types::{EngineType, KeyType, WriteConcern};

const MAGIC: &[u8; 4] = b"CKOH";

/// Key type (1) + Key size (4) + Value size (4) + Capacity (8) + WC (1)
const HEADER_FIELDS: usize = 18;
const HEADER_SIZE: usize = HEADER_OVERHEAD + HEADER_FIELDS;

const STATUS_EMPTY: u8 = 0;
const STATUS_OCCUPIED: u8 = 1;
const STATUS_DELETED: u8 = 2;

/// Open-address hash whose slots live in a paged file
pub type OpenAddressFileHash = OpenAddressTable<FileSlots>;

/// Slots stored as pages of a `PagedFile`
pub struct FileSlots {
    file: PagedFile,
    info: RecordInfo,
    capacity: u64,
}

fn encode_header(info: &RecordInfo, capacity: u64, write_concern: WriteConcern) -> Vec<u8> {
    let mut fields = BytesMut::with_capacity(HEADER_FIELDS);
    fields.put_u8(info.key_type as u8);
    fields.put_u32_le(info.key_size as u32);
    fields.put_u32_le(info.value_size as u32);
    fields.put_u64_le(capacity);
    fields.put_u8(write_concern as u8);
    seal_header(MAGIC, &fields)
}

fn decode_header(raw: &[u8]) -> Result<(RecordInfo, u64, WriteConcern)> {
    let mut fields = open_header(MAGIC, raw)?;
    if fields.len() != HEADER_FIELDS {
        return Err(CairnError::Corruption(format!(
            "file hash header has {} field bytes",
            fields.len()
        )));
    }
    let key_type = KeyType::from_u8(fields.get_u8())?;
    let key_size = fields.get_u32_le() as usize;
    let value_size = fields.get_u32_le() as usize;
    let capacity = fields.get_u64_le();
    let write_concern = WriteConcern::from_u8(fields.get_u8())?;

    let info = RecordInfo::new(key_type, key_size, value_size)
        .map_err(|e| CairnError::Corruption(format!("bad record layout in header: {}", e)))?;
    Ok((info, capacity, write_concern))
}

impl FileSlots {
    fn page_size(info: &RecordInfo) -> usize {
        1 + info.record_size()
    }

    fn encode_slot(&self, slot: &Slot) -> Vec<u8> {
        let mut page = vec![0u8; Self::page_size(&self.info)];
        match slot {
            Slot::Empty => {}
            Slot::Deleted => page[0] = STATUS_DELETED,
            Slot::Occupied { key, value } => {
                page[0] = STATUS_OCCUPIED;
                page[1..1 + self.info.key_size].copy_from_slice(key);
                page[1 + self.info.key_size..].copy_from_slice(value);
            }
        }
        page
    }

    fn decode_slot(&self, index: u64, page: &[u8]) -> Result<Slot> {
        match page[0] {
            STATUS_EMPTY => Ok(Slot::Empty),
            STATUS_DELETED => Ok(Slot::Deleted),
            STATUS_OCCUPIED => {
                let split = 1 + self.info.key_size;
                Ok(Slot::Occupied {
                    key: page[1..split].to_vec(),
                    value: page[split..].to_vec(),
                })
            }
            other => Err(CairnError::Corruption(format!(
                "slot {} of {} has status byte {}",
                index,
                self.file.path().display(),
                other
            ))),
        }
    }
}

impl SlotStore for FileSlots {
    const ENGINE: EngineType = EngineType::OpenAddressFileHash;

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn read_slot(&mut self, index: u64) -> Result<Slot> {
        let mut page = vec![0u8; self.file.page_size()];
        self.file.read_page(index, &mut page)?;
        self.decode_slot(index, &page)
    }

    fn write_slot(&mut self, index: u64, slot: &Slot) -> Result<()> {
        let page = self.encode_slot(slot);
        self.file.write_page(index, &page)
    }

    fn save_write_concern(&mut self, write_concern: WriteConcern) -> Result<()> {
        let header = encode_header(&self.info, self.capacity, write_concern);
        self.file.rewrite_header(&header)
    }

    fn flush(&mut self, _info: &RecordInfo, _write_concern: WriteConcern) -> Result<()> {
        self.file.sync()
    }

    fn destroy(self) -> Result<()> {
        let path = self.file.path().to_path_buf();
        drop(self.file);
        remove_storage(&path)
    }
}

impl OpenAddressTable<FileSlots> {
    /// Create a file of `capacity` empty slots, replacing any existing one
    pub fn create(path: &Path, info: RecordInfo, capacity: u64, config: &Config) -> Result<Self> {
        if capacity == 0 {
            return Err(CairnError::invalid("hash table capacity must be positive"));
        }
        let write_concern = EngineType::OpenAddressFileHash.default_write_concern();
        let header = encode_header(&info, capacity, write_concern);

        let mut file = PagedFile::create(
            path,
            &header,
            FileSlots::page_size(&info),
            config.sync_writes,
        )?;
        file.append_zeroed(capacity)?;

        tracing::debug!(
            "Created file hash {} with {} slots",
            path.display(),
            capacity
        );

        let store = FileSlots {
            file,
            info,
            capacity,
        };
        OpenAddressTable::from_store(store, info, write_concern)
    }

    /// Open an existing slot file, or create it if missing.
    ///
    /// The stored capacity wins over `capacity`.
    pub fn open(path: &Path, info: RecordInfo, capacity: u64, config: &Config) -> Result<Self> {
        if !path.exists() {
            return Self::create(path, info, capacity, config);
        }

        // Validate the header before the paged open may trim a torn tail
        let raw = PagedFile::read_header(path, HEADER_SIZE)?;
        let (stored, stored_capacity, write_concern) = decode_header(&raw)?;
        ensure_layout(path, &stored, &info)?;
        let (file, _) = PagedFile::open(
            path,
            HEADER_SIZE,
            FileSlots::page_size(&info),
            config.sync_writes,
        )?;

        if stored_capacity != capacity {
            tracing::warn!(
                "File hash {} has {} slots, requested {}; using stored capacity",
                path.display(),
                stored_capacity,
                capacity
            );
        }
        if file.page_count() < stored_capacity {
            return Err(CairnError::Corruption(format!(
                "{} has {} of {} slots",
                path.display(),
                file.page_count(),
                stored_capacity
            )));
        }

        let store = FileSlots {
            file,
            info,
            capacity: stored_capacity,
        };
        OpenAddressTable::from_store(store, info, write_concern)
    }
}
