//! Snapshot files for in-memory engines
//!
//! ```text
//! ┌──────────┬─────────────┬────────────┬──────────────────┬───────────┬────────────────────┐
//! │Magic (4) │ Version (2) │ Engine (1) │ Payload len (8)  │ CRC32 (4) │ bincode payload    │
//! └──────────┴─────────────┴────────────┴──────────────────┴───────────┴────────────────────┘
//! ```
//! The CRC covers the payload. Snapshots are written to `{path}.tmp` and
//! renamed into place so a crash never leaves a half-written snapshot.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::FORMAT_VERSION;
use crate::error::{CairnError, Result};
use crate::types::EngineType;

const SNAPSHOT_MAGIC: &[u8; 4] = b"CKSN";

/// Magic (4) + Version (2) + Engine (1) + Length (8) + CRC (4)
const SNAPSHOT_HEADER_SIZE: usize = 19;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Serialize `state` and atomically replace the snapshot at `path`
pub fn write_snapshot<T: Serialize>(
    path: &Path,
    engine: EngineType,
    state: &T,
    sync: bool,
) -> Result<()> {
    let payload = bincode::serialize(state)?;

    let mut buf = BytesMut::with_capacity(SNAPSHOT_HEADER_SIZE + payload.len());
    buf.put_slice(SNAPSHOT_MAGIC);
    buf.put_u16_le(FORMAT_VERSION);
    buf.put_u8(engine as u8);
    buf.put_u64_le(payload.len() as u64);
    buf.put_u32_le(crc32fast::hash(&payload));
    buf.put_slice(&payload);

    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&buf)?;
        if sync {
            file.sync_all()?;
        }
    }
    fs::rename(&tmp, path)?;

    debug!(
        path = %path.display(),
        engine = ?engine,
        bytes = payload.len(),
        "Wrote snapshot"
    );
    Ok(())
}

/// Load and verify the snapshot at `path`
pub fn read_snapshot<T: DeserializeOwned>(path: &Path, engine: EngineType) -> Result<T> {
    let mut raw = Vec::new();
    File::open(path)?.read_to_end(&mut raw)?;

    if raw.len() < SNAPSHOT_HEADER_SIZE {
        return Err(CairnError::Corruption(format!(
            "snapshot {} is truncated",
            path.display()
        )));
    }

    let mut header = &raw[..SNAPSHOT_HEADER_SIZE];
    let mut magic = [0u8; 4];
    header.copy_to_slice(&mut magic);
    if &magic != SNAPSHOT_MAGIC {
        return Err(CairnError::Corruption(format!(
            "{} is not a snapshot file",
            path.display()
        )));
    }

    let version = header.get_u16_le();
    if version != FORMAT_VERSION {
        return Err(CairnError::Corruption(format!(
            "unsupported snapshot version: {}",
            version
        )));
    }

    let stored_engine = EngineType::from_u8(header.get_u8())?;
    if stored_engine != engine {
        return Err(CairnError::Corruption(format!(
            "snapshot holds a {:?}, expected {:?}",
            stored_engine, engine
        )));
    }

    let len = header.get_u64_le() as usize;
    let crc = header.get_u32_le();
    let payload = &raw[SNAPSHOT_HEADER_SIZE..];
    if payload.len() != len {
        return Err(CairnError::Corruption(format!(
            "snapshot payload is {} bytes, header says {}",
            payload.len(),
            len
        )));
    }
    if crc32fast::hash(payload) != crc {
        return Err(CairnError::Corruption("snapshot checksum mismatch".to_string()));
    }

    Ok(bincode::deserialize(payload)?)
}
