//! Storage Module
//!
//! On-disk building blocks shared by the engines.
//!
//! ## Responsibilities
//! - Checksummed file headers for file-backed engines
//! - Fixed-size page access (`PagedFile`) for the file hash and flat file
//! - Whole-state snapshots for in-memory engines
//!
//! ## Header Format
//! ```text
//! ┌──────────┬─────────────┬──────────────────────┬───────────┐
//! │Magic (4) │ Version (2) │ Engine fields (var)  │ CRC32 (4) │
//! └──────────┴─────────────┴──────────────────────┴───────────┘
//! ```
//! The CRC covers everything before it.

mod paged;
mod snapshot;

use bytes::{BufMut, BytesMut};

use crate::error::{CairnError, Result};

pub use paged::PagedFile;
pub use snapshot::{read_snapshot, write_snapshot};

// =============================================================================
// Shared Constants
// =============================================================================

/// Current on-disk format version for every file cairnkv writes
pub(crate) const FORMAT_VERSION: u16 = 1;

/// Magic (4) + Version (2) + CRC (4)
pub(crate) const HEADER_OVERHEAD: usize = 10;

// =============================================================================
// Header Helpers
// =============================================================================

/// Wrap engine header fields with magic, version and a trailing CRC
pub(crate) fn seal_header(magic: &[u8; 4], fields: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_OVERHEAD + fields.len());
    buf.put_slice(magic);
    buf.put_u16_le(FORMAT_VERSION);
    buf.put_slice(fields);
    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);
    buf.to_vec()
}

/// Validate a sealed header and return its engine fields
pub(crate) fn open_header<'a>(magic: &[u8; 4], raw: &'a [u8]) -> Result<&'a [u8]> {
    if raw.len() < HEADER_OVERHEAD {
        return Err(CairnError::Corruption(format!(
            "header too short: {} bytes",
            raw.len()
        )));
    }

    if &raw[0..4] != magic {
        return Err(CairnError::Corruption(format!(
            "invalid magic: expected {:?}, got {:?}",
            magic,
            &raw[0..4]
        )));
    }

    let version = u16::from_le_bytes([raw[4], raw[5]]);
    if version != FORMAT_VERSION {
        return Err(CairnError::Corruption(format!(
            "unsupported format version: {}",
            version
        )));
    }

    let crc_at = raw.len() - 4;
    let stored = u32::from_le_bytes([raw[crc_at], raw[crc_at + 1], raw[crc_at + 2], raw[crc_at + 3]]);
    if crc32fast::hash(&raw[..crc_at]) != stored {
        return Err(CairnError::Corruption("header checksum mismatch".to_string()));
    }

    Ok(&raw[6..crc_at])
}
