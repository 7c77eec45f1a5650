//! Linear Hash
//!
//! A hash table that grows one bucket at a time.
//!
//! ## Addressing
//! With `N` initial buckets, split `level` and split pointer `next_split`:
//! ```text
//!   b = hash(key) mod (N * 2^level)
//!   if b < next_split { b = hash(key) mod (N * 2^(level + 1)) }
//! ```
//! Once the load factor `records / (buckets * records_per_bucket)` reaches
//! the split threshold, bucket `next_split` is split into a new bucket
//! appended at `N * 2^level + next_split`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ensure_layout, remove_storage, StorageEngine};
use crate::codec::RecordInfo;
use crate::config::Config;
use crate::cursor::{Cursor, EngineCursor, RecordSource};
use crate::error::{CairnError, Result};
use crate::predicate::Predicate;
use crate::storage::{read_snapshot, write_snapshot};
use crate::types::{hash_key, EngineType, KeyType, Record, WriteConcern};

/// Persistent table state (also the snapshot image)
#[derive(Debug, Serialize, Deserialize)]
struct LinearHashState {
    info: RecordInfo,
    write_concern: WriteConcern,
    initial_buckets: u64,
    level: u32,
    next_split: u64,
    records: u64,
    buckets: Vec<Vec<Record>>,
}

/// In-memory linear hash persisted by snapshot
pub struct LinearHash {
    state: LinearHashState,
    path: PathBuf,
    records_per_bucket: usize,
    split_threshold: usize,
    sync: bool,
}

impl LinearHash {
    /// Fresh table of `initial_buckets` (at least one) empty buckets
    pub fn create(path: &Path, info: RecordInfo, initial_buckets: u64, config: &Config) -> Result<Self> {
        remove_storage(path)?;
        let initial_buckets = initial_buckets.max(1);
        let state = LinearHashState {
            info,
            write_concern: EngineType::LinearHash.default_write_concern(),
            initial_buckets,
            level: 0,
            next_split: 0,
            records: 0,
            buckets: vec![Vec::new(); initial_buckets as usize],
        };
        Ok(Self::with_state(state, path, config))
    }

    /// Restore from snapshot, or start fresh if there is none
    pub fn open(path: &Path, info: RecordInfo, initial_buckets: u64, config: &Config) -> Result<Self> {
        if !path.exists() {
            return Self::create(path, info, initial_buckets, config);
        }

        let state: LinearHashState = read_snapshot(path, EngineType::LinearHash)?;
        ensure_layout(path, &state.info, &info)?;

        let expected = state.span() + state.next_split;
        if state.buckets.len() as u64 != expected {
            return Err(CairnError::Corruption(format!(
                "{} has {} buckets, split state implies {}",
                path.display(),
                state.buckets.len(),
                expected
            )));
        }
        Ok(Self::with_state(state, path, config))
    }

    fn with_state(state: LinearHashState, path: &Path, config: &Config) -> Self {
        Self {
            state,
            path: path.to_path_buf(),
            records_per_bucket: config.linear_hash_records_per_bucket.max(1),
            split_threshold: config.linear_hash_split_threshold.max(1),
            sync: config.sync_writes,
        }
    }

    /// Number of buckets currently allocated
    pub fn bucket_count(&self) -> usize {
        self.state.buckets.len()
    }

    /// Current split level
    pub fn level(&self) -> u32 {
        self.state.level
    }

    fn store(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        let bucket = self.state.bucket_for(key);
        if self.state.write_concern == WriteConcern::Unique
            && self.state.buckets[bucket].iter().any(|r| r.key == key)
        {
            return Err(CairnError::DuplicateKey);
        }

        self.state.buckets[bucket].push(Record::new(key, value));
        self.state.records += 1;

        if self.load_percent() >= self.split_threshold as u64 {
            self.split();
        }
        Ok(1)
    }

    fn load_percent(&self) -> u64 {
        let slots = self.state.buckets.len() as u64 * self.records_per_bucket as u64;
        self.state.records * 100 / slots
    }

    /// Split bucket `next_split`, redistributing with the next-level hash
    fn split(&mut self) {
        let state = &mut self.state;
        let span = state.span();
        let source = state.next_split as usize;
        let modulus = span * 2;

        state.buckets.push(Vec::new());
        let moving = std::mem::take(&mut state.buckets[source]);
        for record in moving {
            let target = (hash_key(state.info.key_type, &record.key) % modulus) as usize;
            state.buckets[target].push(record);
        }

        state.next_split += 1;
        if state.next_split == span {
            state.level += 1;
            state.next_split = 0;
        }

        tracing::debug!(
            "Linear hash split bucket {} (level {}, {} buckets)",
            source,
            state.level,
            state.buckets.len()
        );
    }
}

impl LinearHashState {
    /// Bucket count at the start of the current level
    fn span(&self) -> u64 {
        self.initial_buckets << self.level
    }

    fn bucket_for(&self, key: &[u8]) -> usize {
        let hash = hash_key(self.info.key_type, key);
        let span = self.span();
        let mut bucket = hash % span;
        if bucket < self.next_split {
            bucket = hash % (span * 2);
        }
        bucket as usize
    }
}

impl StorageEngine for LinearHash {
    fn engine_type(&self) -> EngineType {
        EngineType::LinearHash
    }

    fn record_info(&self) -> RecordInfo {
        self.state.info
    }

    fn write_concern(&self) -> WriteConcern {
        self.state.write_concern
    }

    fn set_write_concern(&mut self, write_concern: WriteConcern) -> Result<()> {
        self.state.write_concern = write_concern;
        Ok(())
    }

    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.state.info.check_record(key, value)?;
        self.store(key, value)
    }

    fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.state.info.check_key(key)?;
        let bucket = self.state.bucket_for(key);
        self.state.buckets[bucket]
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.value.clone())
            .ok_or(CairnError::ItemNotFound)
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.state.info.check_record(key, value)?;
        let unique = self.state.write_concern == WriteConcern::Unique;
        let bucket = self.state.bucket_for(key);

        let mut count = 0;
        for record in self.state.buckets[bucket].iter_mut().filter(|r| r.key == key) {
            record.value = value.to_vec();
            count += 1;
            if unique {
                break;
            }
        }

        if count == 0 {
            return self.store(key, value);
        }
        Ok(count)
    }

    fn delete(&mut self, key: &[u8]) -> Result<usize> {
        self.state.info.check_key(key)?;
        let bucket = self.state.bucket_for(key);
        let records = &mut self.state.buckets[bucket];
        let before = records.len();
        records.retain(|r| r.key != key);
        let count = before - records.len();

        if count == 0 {
            return Err(CairnError::ItemNotFound);
        }
        self.state.records -= count as u64;
        Ok(count)
    }

    fn find<'a>(&'a mut self, predicate: Predicate) -> Result<Box<dyn Cursor + 'a>> {
        predicate.validate(&self.state.info)?;
        let (bucket, last) = match &predicate {
            Predicate::Equality(key) => {
                let b = self.state.bucket_for(key);
                (b, b + 1)
            }
            _ => (0, self.state.buckets.len()),
        };

        let scan = BucketScan {
            buckets: &self.state.buckets,
            key_type: self.state.info.key_type,
            predicate,
            bucket,
            last,
            offset: 0,
        };
        Ok(Box::new(EngineCursor::start(scan)?))
    }

    fn len(&self) -> u64 {
        self.state.records
    }

    fn flush(&mut self) -> Result<()> {
        write_snapshot(&self.path, EngineType::LinearHash, &self.state, self.sync)
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        remove_storage(&self.path)
    }
}

/// Cursor source walking buckets `bucket..last` in index order
struct BucketScan<'a> {
    buckets: &'a [Vec<Record>],
    key_type: KeyType,
    predicate: Predicate,
    bucket: usize,
    last: usize,
    offset: usize,
}

impl RecordSource for BucketScan<'_> {
    fn next_match(&mut self) -> Result<Option<Record>> {
        while self.bucket < self.last {
            let records = &self.buckets[self.bucket];
            while self.offset < records.len() {
                let record = &records[self.offset];
                self.offset += 1;
                if self.predicate.matches(self.key_type, &record.key) {
                    return Ok(Some(record.clone()));
                }
            }
            self.bucket += 1;
            self.offset = 0;
        }
        Ok(None)
    }
}
