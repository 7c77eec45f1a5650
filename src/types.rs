//! Core types shared by every engine
//!
//! Key types and their ordering, engine identifiers, write concerns,
//! records and the per-dictionary configuration header.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::RecordInfo;
use crate::error::{CairnError, Result};

/// Dictionary identifier
pub type DictionaryId = u64;

/// Identifier reserved for the master table itself
pub const MASTER_TABLE_ID: DictionaryId = 0;

/// Placeholder id for a dictionary not yet registered with a master table
pub const UNASSIGNED_ID: DictionaryId = u64::MAX;

// =============================================================================
// Key Types
// =============================================================================

/// How stored keys are ordered and hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyType {
    /// Two's-complement little-endian integer (1..=8 bytes)
    Signed = 0,
    /// Little-endian unsigned integer (1..=8 bytes)
    Unsigned = 1,
    /// Opaque fixed-size byte string, compared lexicographically
    VariableLength = 2,
}

impl KeyType {
    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(KeyType::Signed),
            1 => Ok(KeyType::Unsigned),
            2 => Ok(KeyType::VariableLength),
            other => Err(CairnError::Corruption(format!("unknown key type {}", other))),
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, KeyType::VariableLength)
    }

    /// Compare two keys under this key type's ordering
    pub fn compare(self, a: &[u8], b: &[u8]) -> Ordering {
        if a.len() != b.len() || a.len() > 8 {
            return a.cmp(b);
        }
        match self {
            KeyType::Signed => decode_signed(a).cmp(&decode_signed(b)),
            KeyType::Unsigned => decode_unsigned(a).cmp(&decode_unsigned(b)),
            KeyType::VariableLength => a.cmp(b),
        }
    }
}

/// Sign-extend a little-endian integer of up to 8 bytes
pub(crate) fn decode_signed(bytes: &[u8]) -> i64 {
    let negative = bytes.last().map_or(false, |b| b & 0x80 != 0);
    let mut buf = if negative { [0xffu8; 8] } else { [0u8; 8] };
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    i64::from_le_bytes(buf)
}

/// Zero-extend a little-endian integer of up to 8 bytes
pub(crate) fn decode_unsigned(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

/// Hash a key for bucket/slot addressing.
///
/// Numeric keys hash to their own magnitude so that small integer keys land
/// in slot `k mod capacity`; byte-string keys use a multiplicative fold.
pub fn hash_key(key_type: KeyType, key: &[u8]) -> u64 {
    match key_type {
        KeyType::Signed if key.len() <= 8 => decode_signed(key).unsigned_abs(),
        KeyType::Unsigned if key.len() <= 8 => decode_unsigned(key),
        _ => key
            .iter()
            .fold(5381u64, |h, &b| h.wrapping_mul(33).wrapping_add(b as u64)),
    }
}

// =============================================================================
// Engine Types
// =============================================================================

/// Storage engine implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EngineType {
    BppTree = 0,
    FlatFile = 1,
    OpenAddressFileHash = 2,
    OpenAddressHash = 3,
    SkipList = 4,
    LinearHash = 5,
}

impl EngineType {
    pub const ALL: [EngineType; 6] = [
        EngineType::BppTree,
        EngineType::FlatFile,
        EngineType::OpenAddressFileHash,
        EngineType::OpenAddressHash,
        EngineType::SkipList,
        EngineType::LinearHash,
    ];

    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(EngineType::BppTree),
            1 => Ok(EngineType::FlatFile),
            2 => Ok(EngineType::OpenAddressFileHash),
            3 => Ok(EngineType::OpenAddressHash),
            4 => Ok(EngineType::SkipList),
            5 => Ok(EngineType::LinearHash),
            other => Err(CairnError::Corruption(format!("unknown engine type {}", other))),
        }
    }

    /// File extension of this engine's backing file
    pub fn extension(self) -> &'static str {
        match self {
            EngineType::BppTree => "bpt",
            EngineType::FlatFile => "ffs",
            EngineType::OpenAddressFileHash => "oaf",
            EngineType::OpenAddressHash => "oah",
            EngineType::SkipList => "sls",
            EngineType::LinearHash => "lhs",
        }
    }

    /// Write concern an instance starts with
    pub fn default_write_concern(self) -> WriteConcern {
        match self {
            EngineType::OpenAddressHash
            | EngineType::OpenAddressFileHash
            | EngineType::LinearHash => WriteConcern::Unique,
            EngineType::BppTree | EngineType::SkipList | EngineType::FlatFile => {
                WriteConcern::AllowDuplicates
            }
        }
    }

    /// Whether range and equality results come back in key order
    pub fn is_ordered(self) -> bool {
        matches!(self, EngineType::BppTree | EngineType::SkipList)
    }

    /// Backing file for dictionary `id` of this engine under `data_dir`
    pub fn storage_path(self, data_dir: &Path, id: DictionaryId) -> PathBuf {
        data_dir.join(format!("{}.{}", id, self.extension()))
    }
}

/// Policy for inserting a key that is already present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WriteConcern {
    /// Reject the insert with `DuplicateKey`
    Unique = 0,
    /// Store the record alongside the existing ones
    AllowDuplicates = 1,
}

impl WriteConcern {
    pub fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(WriteConcern::Unique),
            1 => Ok(WriteConcern::AllowDuplicates),
            other => Err(CairnError::Corruption(format!("unknown write concern {}", other))),
        }
    }
}

// =============================================================================
// Records and Dictionary Configuration
// =============================================================================

/// A key/value pair as returned by cursors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Lifecycle status of a dictionary facade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryStatus {
    Ok,
    Closed,
}

/// Configuration header of a dictionary instance.
///
/// This is also the row the master table persists for each dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryConfig {
    pub id: DictionaryId,
    pub key_type: KeyType,
    pub key_size: u32,
    pub value_size: u32,
    /// Slot count for open-address engines, initial bucket count for linear
    /// hash, tower height for skip lists; ignored elsewhere
    pub capacity: u64,
    pub engine_type: EngineType,
}

impl DictionaryConfig {
    pub fn new(
        id: DictionaryId,
        key_type: KeyType,
        key_size: u32,
        value_size: u32,
        capacity: u64,
        engine_type: EngineType,
    ) -> Self {
        Self {
            id,
            key_type,
            key_size,
            value_size,
            capacity,
            engine_type,
        }
    }

    /// Record layout described by this configuration
    pub fn record_info(&self) -> Result<RecordInfo> {
        RecordInfo::new(self.key_type, self.key_size as usize, self.value_size as usize)
    }

    /// Reject configurations no engine could be built from
    pub fn validate(&self) -> Result<()> {
        self.record_info()?;
        match self.engine_type {
            EngineType::OpenAddressHash | EngineType::OpenAddressFileHash
                if self.capacity == 0 =>
            {
                Err(CairnError::invalid("hash table capacity must be positive"))
            }
            EngineType::LinearHash if self.capacity == 0 => Err(CairnError::invalid(
                "linear hash needs at least one initial bucket",
            )),
            _ => Ok(()),
        }
    }

    pub fn storage_path(&self, data_dir: &Path) -> PathBuf {
        self.engine_type.storage_path(data_dir, self.id)
    }
}
