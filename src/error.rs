//! Error types for cairnkv
//!
//! Provides a unified error type for all dictionary, engine and master table
//! operations, plus the status codes surfaced across the library boundary.

use thiserror::Error;

/// Result type alias using CairnError
pub type Result<T> = std::result::Result<T, CairnError>;

/// Unified error type for cairnkv operations
#[derive(Debug, Error)]
pub enum CairnError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Item not found")]
    ItemNotFound,

    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Dictionary is full")]
    DictionaryFull,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Dictionary is closed")]
    DictionaryClosed,

    #[error("Master table is not open")]
    MasterTableClosed,
}

/// Status codes reported across the library boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok,
    ItemNotFound,
    DuplicateKey,
    DictionaryFull,
    InvalidArgument,
    FileError,
}

impl CairnError {
    /// Map this error onto its boundary status code
    pub fn code(&self) -> ErrorCode {
        match self {
            CairnError::ItemNotFound => ErrorCode::ItemNotFound,
            CairnError::DuplicateKey => ErrorCode::DuplicateKey,
            CairnError::DictionaryFull => ErrorCode::DictionaryFull,
            CairnError::InvalidArgument(_) | CairnError::DictionaryClosed => {
                ErrorCode::InvalidArgument
            }
            CairnError::Io(_)
            | CairnError::Corruption(_)
            | CairnError::Serialization(_)
            | CairnError::MasterTableClosed => ErrorCode::FileError,
        }
    }

    /// Shorthand for building an `InvalidArgument` error
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CairnError::InvalidArgument(msg.into())
    }
}

impl From<bincode::Error> for CairnError {
    fn from(e: bincode::Error) -> Self {
        CairnError::Serialization(e.to_string())
    }
}

/// Status code of an operation result, `Ok` on success
pub fn status_of<T>(result: &Result<T>) -> ErrorCode {
    match result {
        Ok(_) => ErrorCode::Ok,
        Err(e) => e.code(),
    }
}
