//! Skip List
//!
//! Ordered in-memory list with probabilistic express lanes.
//!
//! ```text
//! level 2: head ──────────────► 25 ─────────────────────► nil
//! level 1: head ──► 3 ────────► 25 ──────► 50 ──────────► nil
//! level 0: head ──► 3 ──► 10 ──► 25 ──► 30 ──► 50 ──► 70 ► nil
//! ```
//! Each node is promoted one level with probability 1/4, up to
//! `max_level`. Nodes sit in an arena addressed by index; the snapshot
//! keeps only the records in order and towers are rebuilt on open.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{ensure_layout, remove_storage, StorageEngine};
use crate::codec::RecordInfo;
use crate::config::Config;
use crate::cursor::{Cursor, EngineCursor, RecordSource};
use crate::error::{CairnError, Result};
use crate::predicate::Predicate;
use crate::storage::{read_snapshot, write_snapshot};
use crate::types::{EngineType, KeyType, Record, WriteConcern};

const DEFAULT_MAX_LEVEL: usize = 7;
const MAX_LEVEL_CAP: usize = 32;

#[derive(Debug, Default)]
struct SkipNode {
    key: Vec<u8>,
    value: Vec<u8>,
    forward: Vec<Option<usize>>,
}

#[derive(Serialize, Deserialize)]
struct SkipListImage {
    info: RecordInfo,
    write_concern: WriteConcern,
    max_level: usize,
    records: Vec<Record>,
}

/// In-memory skip list persisted by snapshot
pub struct SkipList {
    info: RecordInfo,
    write_concern: WriteConcern,
    max_level: usize,
    /// Levels currently in use (at least 1)
    level: usize,
    head: Vec<Option<usize>>,
    nodes: Vec<SkipNode>,
    free: Vec<usize>,
    len: u64,
    rng: StdRng,
    path: PathBuf,
    sync: bool,
}

impl SkipList {
    /// Empty list; `max_level` 0 picks the default height
    pub fn create(path: &Path, info: RecordInfo, max_level: u64, config: &Config) -> Result<Self> {
        remove_storage(path)?;
        let max_level = match max_level as usize {
            0 => DEFAULT_MAX_LEVEL,
            n => n.min(MAX_LEVEL_CAP),
        };
        Ok(Self::empty(
            path,
            info,
            EngineType::SkipList.default_write_concern(),
            max_level,
            config,
        ))
    }

    /// Restore from snapshot, or start empty if there is none
    pub fn open(path: &Path, info: RecordInfo, max_level: u64, config: &Config) -> Result<Self> {
        if !path.exists() {
            return Self::create(path, info, max_level, config);
        }

        let image: SkipListImage = read_snapshot(path, EngineType::SkipList)?;
        ensure_layout(path, &image.info, &info)?;
        if image.max_level == 0 || image.max_level > MAX_LEVEL_CAP {
            return Err(CairnError::Corruption(format!(
                "{} has skip list height {}",
                path.display(),
                image.max_level
            )));
        }

        let mut list = Self::empty(path, info, image.write_concern, image.max_level, config);
        for record in image.records {
            list.link(record.key, record.value);
        }
        Ok(list)
    }

    fn empty(
        path: &Path,
        info: RecordInfo,
        write_concern: WriteConcern,
        max_level: usize,
        config: &Config,
    ) -> Self {
        let rng = match config.skip_list_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            info,
            write_concern,
            max_level,
            level: 1,
            head: vec![None; max_level],
            nodes: Vec::new(),
            free: Vec::new(),
            len: 0,
            rng,
            path: path.to_path_buf(),
            sync: config.sync_writes,
        }
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < self.max_level && self.rng.gen_range(0..4) == 0 {
            level += 1;
        }
        level
    }

    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.info.key_type.compare(a, b)
    }

    /// Successor of `at` on `level`; `None` for `at` means the head
    fn next_of(&self, at: Option<usize>, level: usize) -> Option<usize> {
        match at {
            None => self.head[level],
            Some(index) => self.nodes[index].forward[level],
        }
    }

    fn set_next(&mut self, at: Option<usize>, level: usize, target: Option<usize>) {
        match at {
            None => self.head[level] = target,
            Some(index) => self.nodes[index].forward[level] = target,
        }
    }

    /// Rightmost node per level whose key is before `key`.
    ///
    /// With `inclusive`, equal keys count as before, so new duplicates land
    /// after existing ones.
    fn predecessors(&self, key: &[u8], inclusive: bool) -> Vec<Option<usize>> {
        let mut update = vec![None; self.max_level];
        let mut at = None;
        for level in (0..self.level).rev() {
            while let Some(next) = self.next_of(at, level) {
                let order = self.cmp(&self.nodes[next].key, key);
                if order == Ordering::Less || (inclusive && order == Ordering::Equal) {
                    at = Some(next);
                } else {
                    break;
                }
            }
            update[level] = at;
        }
        update
    }

    /// First node with a key not less than `key` (leftmost when `None`)
    fn seek(&self, key: Option<&[u8]>) -> Option<usize> {
        match key {
            Some(key) => {
                let update = self.predecessors(key, false);
                self.next_of(update[0], 0)
            }
            None => self.head[0],
        }
    }

    /// Splice a record in after any equal keys
    fn link(&mut self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let update = self.predecessors(&key, true);
        let height = self.random_level();
        if height > self.level {
            // update[] already holds the head for levels above the old top
            self.level = height;
        }

        let node = SkipNode {
            key,
            value,
            forward: vec![None; height],
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        for (level, &before) in update.iter().enumerate().take(height) {
            let after = self.next_of(before, level);
            self.nodes[index].forward[level] = after;
            self.set_next(before, level, Some(index));
        }

        self.len += 1;
        index
    }

    fn insert_record(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        if self.write_concern == WriteConcern::Unique {
            if let Some(found) = self.seek(Some(key)) {
                if self.cmp(&self.nodes[found].key, key) == Ordering::Equal {
                    return Err(CairnError::DuplicateKey);
                }
            }
        }
        self.link(key.to_vec(), value.to_vec());
        Ok(1)
    }

    /// Unlink the first node equal to `key`, if any
    fn unlink_first(&mut self, key: &[u8]) -> bool {
        let update = self.predecessors(key, false);
        let target = match self.next_of(update[0], 0) {
            Some(index) if self.cmp(&self.nodes[index].key, key) == Ordering::Equal => index,
            _ => return false,
        };

        for level in 0..self.level {
            if self.next_of(update[level], level) != Some(target) {
                break;
            }
            let after = self.nodes[target].forward[level];
            self.set_next(update[level], level, after);
        }

        self.nodes[target] = SkipNode::default();
        self.free.push(target);
        while self.level > 1 && self.head[self.level - 1].is_none() {
            self.level -= 1;
        }
        self.len -= 1;
        true
    }
}

impl StorageEngine for SkipList {
    fn engine_type(&self) -> EngineType {
        EngineType::SkipList
    }

    fn record_info(&self) -> RecordInfo {
        self.info
    }

    fn write_concern(&self) -> WriteConcern {
        self.write_concern
    }

    fn set_write_concern(&mut self, write_concern: WriteConcern) -> Result<()> {
        self.write_concern = write_concern;
        Ok(())
    }

    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.info.check_record(key, value)?;
        self.insert_record(key, value)
    }

    fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.info.check_key(key)?;
        match self.seek(Some(key)) {
            Some(index) if self.cmp(&self.nodes[index].key, key) == Ordering::Equal => {
                Ok(self.nodes[index].value.clone())
            }
            _ => Err(CairnError::ItemNotFound),
        }
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.info.check_record(key, value)?;
        let unique = self.write_concern == WriteConcern::Unique;
        let mut count = 0;
        let mut at = self.seek(Some(key));

        while let Some(index) = at {
            if self.cmp(&self.nodes[index].key, key) != Ordering::Equal {
                break;
            }
            self.nodes[index].value = value.to_vec();
            count += 1;
            if unique {
                break;
            }
            at = self.nodes[index].forward[0];
        }

        if count == 0 {
            return self.insert_record(key, value);
        }
        Ok(count)
    }

    fn delete(&mut self, key: &[u8]) -> Result<usize> {
        self.info.check_key(key)?;
        let mut count = 0;
        while self.unlink_first(key) {
            count += 1;
        }
        if count == 0 {
            return Err(CairnError::ItemNotFound);
        }
        Ok(count)
    }

    fn find<'a>(&'a mut self, predicate: Predicate) -> Result<Box<dyn Cursor + 'a>> {
        predicate.validate(&self.info)?;
        let start = self.seek(predicate.lower_bound());
        let walk = LevelZeroWalk {
            nodes: &self.nodes,
            key_type: self.info.key_type,
            predicate,
            at: start,
        };
        Ok(Box::new(EngineCursor::start(walk)?))
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn flush(&mut self) -> Result<()> {
        let mut records = Vec::with_capacity(self.len as usize);
        let mut at = self.head[0];
        while let Some(index) = at {
            let node = &self.nodes[index];
            records.push(Record::new(node.key.clone(), node.value.clone()));
            at = node.forward[0];
        }

        let image = SkipListImage {
            info: self.info,
            write_concern: self.write_concern,
            max_level: self.max_level,
            records,
        };
        write_snapshot(&self.path, EngineType::SkipList, &image, self.sync)
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        remove_storage(&self.path)
    }
}

/// Cursor source walking level 0 from a seek position
struct LevelZeroWalk<'a> {
    nodes: &'a [SkipNode],
    key_type: KeyType,
    predicate: Predicate,
    at: Option<usize>,
}

impl RecordSource for LevelZeroWalk<'_> {
    fn next_match(&mut self) -> Result<Option<Record>> {
        while let Some(index) = self.at {
            let node = &self.nodes[index];
            if self.predicate.is_past_end(self.key_type, &node.key) {
                self.at = None;
                break;
            }
            self.at = node.forward[0];
            if self.predicate.matches(self.key_type, &node.key) {
                return Ok(Some(Record::new(node.key.clone(), node.value.clone())));
            }
        }
        Ok(None)
    }
}
