//! # cairnkv
//!
//! An embedded key-value library with interchangeable storage engines:
//! - B+ tree and skip list for ordered access
//! - Open-address hashing in memory or on file, plus linear hashing
//! - A flat record file for the simplest possible layout
//! - A master table that catalogs dictionaries across restarts
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Master Table                          │
//! │            (catalog dictionary, id allocation)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ rows
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Dictionary Facade                         │
//! │        (insert / get / update / delete / find)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Box<dyn StorageEngine>
//!     ┌────────┬────────┼─────────┬──────────┬──────────┐
//!     ▼        ▼        ▼         ▼          ▼          ▼
//!  BppTree  SkipList  OA Hash  OA File   LinearHash  FlatFile
//!     │        │        │      Hash          │          │
//!     └────────┴────────┴───┐     │    ┌─────┘          │
//!                           ▼     ▼    ▼                ▼
//!                       snapshots   paged files (header + pages)
//! ```
//!
//! Queries build a `Predicate` and return a `Cursor` borrowing the engine.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod types;
pub mod codec;
pub mod predicate;
pub mod cursor;
pub mod storage;
pub mod engine;
pub mod dictionary;
pub mod master;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{status_of, CairnError, ErrorCode, Result};
pub use config::Config;
pub use codec::{decode_str, encode_str, FixedCodec, RecordInfo};
pub use cursor::{collect_records, Cursor, CursorStatus};
pub use dictionary::Dictionary;
pub use engine::StorageEngine;
pub use master::MasterTable;
pub use predicate::Predicate;
pub use types::{
    DictionaryConfig, DictionaryId, DictionaryStatus, EngineType, KeyType, Record, WriteConcern,
    MASTER_TABLE_ID, UNASSIGNED_ID,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of cairnkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
