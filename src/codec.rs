//! Record codec
//!
//! Fixed-size key/value size accounting and helpers for turning primitive
//! values into the little-endian byte keys the engines store.

use serde::{Deserialize, Serialize};

use crate::error::{CairnError, Result};
use crate::types::KeyType;

/// Widest numeric key the ordering functions understand
pub const MAX_NUMERIC_KEY_SIZE: usize = 8;

/// Record layout of one dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInfo {
    pub key_type: KeyType,
    pub key_size: usize,
    pub value_size: usize,
}

impl RecordInfo {
    pub fn new(key_type: KeyType, key_size: usize, value_size: usize) -> Result<Self> {
        if key_size == 0 || value_size == 0 {
            return Err(CairnError::invalid("key and value sizes must be positive"));
        }
        if key_type.is_numeric() && key_size > MAX_NUMERIC_KEY_SIZE {
            return Err(CairnError::invalid(format!(
                "numeric keys are at most {} bytes, got {}",
                MAX_NUMERIC_KEY_SIZE, key_size
            )));
        }
        Ok(Self {
            key_type,
            key_size,
            value_size,
        })
    }

    /// Bytes taken by one key/value pair
    pub fn record_size(&self) -> usize {
        self.key_size + self.value_size
    }

    pub fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(CairnError::invalid(format!(
                "key must be {} bytes, got {}",
                self.key_size,
                key.len()
            )));
        }
        Ok(())
    }

    pub fn check_value(&self, value: &[u8]) -> Result<()> {
        if value.len() != self.value_size {
            return Err(CairnError::invalid(format!(
                "value must be {} bytes, got {}",
                self.value_size,
                value.len()
            )));
        }
        Ok(())
    }

    pub fn check_record(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_key(key)?;
        self.check_value(value)
    }
}

/// Primitive integers that encode to fixed-width little-endian keys
pub trait FixedCodec: Sized {
    /// Encode into exactly `size` bytes, failing if the value does not fit
    fn encode_key(self, size: usize) -> Result<Vec<u8>>;

    /// Decode from little-endian bytes of any width up to 8
    fn decode(bytes: &[u8]) -> Result<Self>;
}

macro_rules! impl_fixed_codec {
    ($($ty:ty => $wide:ty, $decode:path);* $(;)?) => {
        $(
            impl FixedCodec for $ty {
                fn encode_key(self, size: usize) -> Result<Vec<u8>> {
                    if size == 0 || size > MAX_NUMERIC_KEY_SIZE {
                        return Err(CairnError::invalid(format!("unsupported key width {}", size)));
                    }
                    let wide = self as $wide;
                    let bytes = wide.to_le_bytes();
                    let encoded = bytes[..size].to_vec();
                    // Reject values that lose information when narrowed
                    if <$ty>::decode(&encoded)? != self {
                        return Err(CairnError::invalid(format!(
                            "{} does not fit in {} bytes",
                            self, size
                        )));
                    }
                    Ok(encoded)
                }

                fn decode(bytes: &[u8]) -> Result<Self> {
                    if bytes.is_empty() || bytes.len() > MAX_NUMERIC_KEY_SIZE {
                        return Err(CairnError::invalid(format!(
                            "cannot decode a {}-byte integer",
                            bytes.len()
                        )));
                    }
                    <$ty>::try_from($decode(bytes)).map_err(|_| {
                        CairnError::invalid(format!("value out of range for {}", stringify!($ty)))
                    })
                }
            }
        )*
    };
}

impl_fixed_codec! {
    i8 => i64, crate::types::decode_signed;
    i16 => i64, crate::types::decode_signed;
    i32 => i64, crate::types::decode_signed;
    i64 => i64, crate::types::decode_signed;
    u8 => u64, crate::types::decode_unsigned;
    u16 => u64, crate::types::decode_unsigned;
    u32 => u64, crate::types::decode_unsigned;
    u64 => u64, crate::types::decode_unsigned;
}

/// Zero-pad (or truncate) a string into a fixed-size field
pub fn encode_str(s: &str, size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size];
    let bytes = s.as_bytes();
    let n = bytes.len().min(size);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Inverse of `encode_str`: strip trailing zero padding
pub fn decode_str(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
