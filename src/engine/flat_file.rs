//! Flat File
//!
//! Unordered append-only record file; every operation is a linear scan.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Header (20 bytes)                                                │
//! │   Magic "CKFF" (4) │ Version (2) │ Key type (1) │ Key size (4)   │
//! │   Value size (4) │ WC (1) │ CRC32 (4)                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Record: Status (1) │ Key │ Value │ CRC32 of key+value (4)        │
//! │ Record: ...                                                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//! Status 1 marks a live record, 0 a deleted one. Deletes and updates
//! rewrite records in place; inserts append.

use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};

use super::{ensure_layout, remove_storage, StorageEngine};
use crate::codec::RecordInfo;
use crate::config::Config;
use crate::cursor::{Cursor, EngineCursor, RecordSource};
use crate::error::{CairnError, Result};
use crate::predicate::Predicate;
use crate::storage::{open_header, seal_header, PagedFile, HEADER_OVERHEAD};
use crate::types::{EngineType, KeyType, Record, WriteConcern};

const MAGIC: &[u8; 4] = b"CKFF";

/// Key type (1) + Key size (4) + Value size (4) + WC (1)
const HEADER_FIELDS: usize = 10;
const HEADER_SIZE: usize = HEADER_OVERHEAD + HEADER_FIELDS;

const STATUS_DELETED: u8 = 0;
const STATUS_LIVE: u8 = 1;

/// A decoded record page
struct Entry {
    live: bool,
    key: Vec<u8>,
    value: Vec<u8>,
}

/// File-backed engine storing records one after another
pub struct FlatFile {
    file: PagedFile,
    info: RecordInfo,
    write_concern: WriteConcern,
    len: u64,
}

fn encode_header(info: &RecordInfo, write_concern: WriteConcern) -> Vec<u8> {
    let mut fields = BytesMut::with_capacity(HEADER_FIELDS);
    fields.put_u8(info.key_type as u8);
    fields.put_u32_le(info.key_size as u32);
    fields.put_u32_le(info.value_size as u32);
    fields.put_u8(write_concern as u8);
    seal_header(MAGIC, &fields)
}

fn decode_header(raw: &[u8]) -> Result<(RecordInfo, WriteConcern)> {
    let mut fields = open_header(MAGIC, raw)?;
    if fields.len() != HEADER_FIELDS {
        return Err(CairnError::Corruption(format!(
            "flat file header has {} field bytes",
            fields.len()
        )));
    }
    let key_type = KeyType::from_u8(fields.get_u8())?;
    let key_size = fields.get_u32_le() as usize;
    let value_size = fields.get_u32_le() as usize;
    let write_concern = WriteConcern::from_u8(fields.get_u8())?;

    let info = RecordInfo::new(key_type, key_size, value_size)
        .map_err(|e| CairnError::Corruption(format!("bad record layout in header: {}", e)))?;
    Ok((info, write_concern))
}

impl FlatFile {
    /// Create an empty record file, replacing any existing one
    pub fn create(path: &Path, info: RecordInfo, config: &Config) -> Result<Self> {
        let write_concern = EngineType::FlatFile.default_write_concern();
        let header = encode_header(&info, write_concern);
        let file = PagedFile::create(path, &header, Self::page_size(&info), config.sync_writes)?;

        Ok(Self {
            file,
            info,
            write_concern,
            len: 0,
        })
    }

    /// Open an existing record file, or create it if missing
    pub fn open(path: &Path, info: RecordInfo, config: &Config) -> Result<Self> {
        if !path.exists() {
            return Self::create(path, info, config);
        }

        let raw = PagedFile::read_header(path, HEADER_SIZE)?;
        let (stored, write_concern) = decode_header(&raw)?;
        ensure_layout(path, &stored, &info)?;
        let (file, _) = PagedFile::open(path, HEADER_SIZE, Self::page_size(&info), config.sync_writes)?;

        let mut flat = Self {
            file,
            info,
            write_concern,
            len: 0,
        };
        for index in 0..flat.file.page_count() {
            if flat.read_entry(index)?.live {
                flat.len += 1;
            }
        }
        Ok(flat)
    }

    fn page_size(info: &RecordInfo) -> usize {
        1 + info.record_size() + 4
    }

    fn encode_entry(&self, live: bool, key: &[u8], value: &[u8]) -> Vec<u8> {
        let mut page = BytesMut::with_capacity(Self::page_size(&self.info));
        page.put_u8(if live { STATUS_LIVE } else { STATUS_DELETED });
        page.put_slice(key);
        page.put_slice(value);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(key);
        hasher.update(value);
        page.put_u32_le(hasher.finalize());
        page.to_vec()
    }

    fn read_entry(&mut self, index: u64) -> Result<Entry> {
        read_entry(&mut self.file, &self.info, index)
    }

    fn write_entry(&mut self, index: u64, live: bool, key: &[u8], value: &[u8]) -> Result<()> {
        let page = self.encode_entry(live, key, value);
        self.file.write_page(index, &page)
    }

    /// Indices of live records stored under `key`
    fn matching(&mut self, key: &[u8], first_only: bool) -> Result<Vec<u64>> {
        let mut found = Vec::new();
        for index in 0..self.file.page_count() {
            let entry = self.read_entry(index)?;
            if entry.live && entry.key == key {
                found.push(index);
                if first_only {
                    break;
                }
            }
        }
        Ok(found)
    }

    fn append(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        if self.write_concern == WriteConcern::Unique && !self.matching(key, true)?.is_empty() {
            return Err(CairnError::DuplicateKey);
        }
        let page = self.encode_entry(true, key, value);
        self.file.append_page(&page)?;
        self.len += 1;
        Ok(1)
    }
}

/// Decode and verify record page `index`
fn read_entry(file: &mut PagedFile, info: &RecordInfo, index: u64) -> Result<Entry> {
    let mut page = vec![0u8; file.page_size()];
    file.read_page(index, &mut page)?;

    let status = page[0];
    let key_end = 1 + info.key_size;
    let value_end = key_end + info.value_size;
    let key = &page[1..key_end];
    let value = &page[key_end..value_end];
    let stored_crc = (&page[value_end..]).get_u32_le();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key);
    hasher.update(value);
    if hasher.finalize() != stored_crc {
        return Err(CairnError::Corruption(format!(
            "record {} of {} failed its checksum",
            index,
            file.path().display()
        )));
    }

    let live = match status {
        STATUS_LIVE => true,
        STATUS_DELETED => false,
        other => {
            return Err(CairnError::Corruption(format!(
                "record {} has status byte {}",
                index, other
            )))
        }
    };
    Ok(Entry {
        live,
        key: key.to_vec(),
        value: value.to_vec(),
    })
}

impl StorageEngine for FlatFile {
    fn engine_type(&self) -> EngineType {
        EngineType::FlatFile
    }

    fn record_info(&self) -> RecordInfo {
        self.info
    }

    fn write_concern(&self) -> WriteConcern {
        self.write_concern
    }

    fn set_write_concern(&mut self, write_concern: WriteConcern) -> Result<()> {
        let header = encode_header(&self.info, write_concern);
        self.file.rewrite_header(&header)?;
        self.write_concern = write_concern;
        Ok(())
    }

    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.info.check_record(key, value)?;
        self.append(key, value)
    }

    fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.info.check_key(key)?;
        let index = *self
            .matching(key, true)?
            .first()
            .ok_or(CairnError::ItemNotFound)?;
        Ok(self.read_entry(index)?.value)
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.info.check_record(key, value)?;
        let unique = self.write_concern == WriteConcern::Unique;
        let targets = self.matching(key, unique)?;
        if targets.is_empty() {
            return self.append(key, value);
        }
        for &index in &targets {
            self.write_entry(index, true, key, value)?;
        }
        Ok(targets.len())
    }

    fn delete(&mut self, key: &[u8]) -> Result<usize> {
        self.info.check_key(key)?;
        let targets = self.matching(key, false)?;
        if targets.is_empty() {
            return Err(CairnError::ItemNotFound);
        }
        for &index in &targets {
            let entry = self.read_entry(index)?;
            self.write_entry(index, false, &entry.key, &entry.value)?;
        }
        self.len -= targets.len() as u64;
        Ok(targets.len())
    }

    fn find<'a>(&'a mut self, predicate: Predicate) -> Result<Box<dyn Cursor + 'a>> {
        predicate.validate(&self.info)?;
        let scan = RecordScan {
            pages: self.file.page_count(),
            file: &mut self.file,
            info: self.info,
            predicate,
            index: 0,
        };
        Ok(Box::new(EngineCursor::start(scan)?))
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync()
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        let path = self.file.path().to_path_buf();
        drop(self);
        remove_storage(&path)
    }
}

/// Cursor source reading records in file order
struct RecordScan<'a> {
    file: &'a mut PagedFile,
    info: RecordInfo,
    predicate: Predicate,
    index: u64,
    pages: u64,
}

impl RecordSource for RecordScan<'_> {
    fn next_match(&mut self) -> Result<Option<Record>> {
        while self.index < self.pages {
            let entry = read_entry(self.file, &self.info, self.index)?;
            self.index += 1;
            if entry.live && self.predicate.matches(self.info.key_type, &entry.key) {
                return Ok(Some(Record::new(entry.key, entry.value)));
            }
        }
        Ok(None)
    }
}
