//! Master table row encoding
//!
//! ```text
//! ┌──────────┬──────────────┬──────────────┬────────────────┬──────────────┬─────────────┐
//! │ Id (8)   │ Key type (1) │ Key size (4) │ Value size (4) │ Capacity (8) │ Engine (1)  │
//! └──────────┴──────────────┴──────────────┴────────────────┴──────────────┴─────────────┘
//! ```
//! All integers little-endian; 26 bytes per row.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{CairnError, Result};
use crate::types::{DictionaryConfig, DictionaryId, EngineType, KeyType};

/// Encoded size of one row
pub const ROW_SIZE: usize = 26;

/// Width of the master table's unsigned id keys
pub const ROW_KEY_SIZE: usize = 8;

/// Key under which the row for `id` is stored
pub(crate) fn row_key(id: DictionaryId) -> Vec<u8> {
    id.to_le_bytes().to_vec()
}

pub(crate) fn encode_row(config: &DictionaryConfig) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(ROW_SIZE);
    buf.put_u64_le(config.id);
    buf.put_u8(config.key_type as u8);
    buf.put_u32_le(config.key_size);
    buf.put_u32_le(config.value_size);
    buf.put_u64_le(config.capacity);
    buf.put_u8(config.engine_type as u8);
    buf.to_vec()
}

pub(crate) fn decode_row(raw: &[u8]) -> Result<DictionaryConfig> {
    if raw.len() != ROW_SIZE {
        return Err(CairnError::Corruption(format!(
            "master row is {} bytes, expected {}",
            raw.len(),
            ROW_SIZE
        )));
    }

    let mut buf = raw;
    let id = buf.get_u64_le();
    let key_type = KeyType::from_u8(buf.get_u8())?;
    let key_size = buf.get_u32_le();
    let value_size = buf.get_u32_le();
    let capacity = buf.get_u64_le();
    let engine_type = EngineType::from_u8(buf.get_u8())?;

    Ok(DictionaryConfig::new(
        id,
        key_type,
        key_size,
        value_size,
        capacity,
        engine_type,
    ))
}
