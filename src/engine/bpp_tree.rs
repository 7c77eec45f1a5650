//! B+ Tree
//!
//! Ordered in-memory tree with all records in linked leaves.
//!
//! ## Layout
//! ```text
//!                 [ 25 | 50 ]                 internal: separators
//!                /     |     \
//!        [3 10] ──► [25 30] ──► [50 70]       leaves: keys + values, `next` links
//! ```
//! Child `i` of an internal node holds keys in `[sep[i-1], sep[i]]`;
//! duplicates may sit on both sides of an equal separator.
//!
//! Nodes live in an arena (`Vec<Node>`) addressed by index, with a free
//! list for recycled slots. The whole arena is saved as a snapshot on close.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ensure_layout, remove_storage, StorageEngine};
use crate::codec::RecordInfo;
use crate::config::Config;
use crate::cursor::{Cursor, EngineCursor, RecordSource};
use crate::error::{CairnError, Result};
use crate::predicate::Predicate;
use crate::storage::{read_snapshot, write_snapshot};
use crate::types::{EngineType, KeyType, Record, WriteConcern};

/// Smallest order that still allows a split
const MIN_ORDER: usize = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Node {
    leaf: bool,
    keys: Vec<Vec<u8>>,
    /// Leaf only, parallel to `keys`
    values: Vec<Vec<u8>>,
    /// Internal only, `keys.len() + 1` entries
    children: Vec<usize>,
    /// Leaf only
    next: Option<usize>,
}

impl Node {
    fn leaf() -> Self {
        Self {
            leaf: true,
            ..Self::default()
        }
    }
}

/// Persistent tree state (also the snapshot image)
#[derive(Debug, Serialize, Deserialize)]
struct TreeState {
    info: RecordInfo,
    write_concern: WriteConcern,
    order: usize,
    root: usize,
    nodes: Vec<Node>,
    free: Vec<usize>,
    len: u64,
}

/// In-memory B+ tree persisted by snapshot
pub struct BppTree {
    state: TreeState,
    path: PathBuf,
    sync: bool,
}

impl BppTree {
    /// Empty tree; any old snapshot is discarded
    pub fn create(path: &Path, info: RecordInfo, config: &Config) -> Result<Self> {
        remove_storage(path)?;
        let state = TreeState {
            info,
            write_concern: EngineType::BppTree.default_write_concern(),
            order: config.bpp_tree_order.max(MIN_ORDER),
            root: 0,
            nodes: vec![Node::leaf()],
            free: Vec::new(),
            len: 0,
        };
        Ok(Self {
            state,
            path: path.to_path_buf(),
            sync: config.sync_writes,
        })
    }

    /// Restore from snapshot, or start empty if there is none
    pub fn open(path: &Path, info: RecordInfo, config: &Config) -> Result<Self> {
        if !path.exists() {
            return Self::create(path, info, config);
        }

        let state: TreeState = read_snapshot(path, EngineType::BppTree)?;
        ensure_layout(path, &state.info, &info)?;
        if state.root >= state.nodes.len() || state.order < MIN_ORDER {
            return Err(CairnError::Corruption(format!(
                "{} holds an invalid tree (root {}, {} nodes, order {})",
                path.display(),
                state.root,
                state.nodes.len(),
                state.order
            )));
        }

        Ok(Self {
            state,
            path: path.to_path_buf(),
            sync: config.sync_writes,
        })
    }

    /// Number of levels from root to leaves
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = self.state.root;
        while !self.state.nodes[node].leaf {
            node = self.state.nodes[node].children[0];
            height += 1;
        }
        height
    }

    fn max_keys(&self) -> usize {
        self.state.order - 1
    }

    fn min_keys(&self) -> usize {
        self.max_keys() / 2
    }

    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.state.info.key_type.compare(a, b)
    }

    /// Index of the first key greater than `key`
    fn upper_bound(&self, keys: &[Vec<u8>], key: &[u8]) -> usize {
        keys.partition_point(|k| self.cmp(k, key) != Ordering::Greater)
    }

    /// Index of the first key not less than `key`
    fn lower_bound(&self, keys: &[Vec<u8>], key: &[u8]) -> usize {
        keys.partition_point(|k| self.cmp(k, key) == Ordering::Less)
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.state.free.pop() {
            Some(index) => {
                self.state.nodes[index] = node;
                index
            }
            None => {
                self.state.nodes.push(node);
                self.state.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, index: usize) {
        self.state.nodes[index] = Node::default();
        self.state.free.push(index);
    }

    /// Leaf and position of the first record with the key
    fn locate(&self, key: &[u8]) -> Option<(usize, usize)> {
        let (mut leaf, mut index) = self.seek(Some(key));
        loop {
            let node = &self.state.nodes[leaf];
            if index < node.keys.len() {
                return match self.cmp(&node.keys[index], key) {
                    Ordering::Equal => Some((leaf, index)),
                    _ => None,
                };
            }
            leaf = node.next?;
            index = 0;
        }
    }

    /// Leaf and position of the first key `>= lower` (leftmost when `None`)
    fn seek(&self, lower: Option<&[u8]>) -> (usize, usize) {
        let mut node = self.state.root;
        while !self.state.nodes[node].leaf {
            let current = &self.state.nodes[node];
            let child = match lower {
                Some(key) => self.lower_bound(&current.keys, key),
                None => 0,
            };
            node = current.children[child];
        }
        let index = match lower {
            Some(key) => self.lower_bound(&self.state.nodes[node].keys, key),
            None => 0,
        };
        (node, index)
    }

    // =========================================================================
    // Insert
    // =========================================================================

    fn insert_record(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        if self.state.write_concern == WriteConcern::Unique && self.locate(key).is_some() {
            return Err(CairnError::DuplicateKey);
        }

        let root = self.state.root;
        if let Some((separator, right)) = self.insert_into(root, key, value) {
            let new_root = self.alloc(Node {
                leaf: false,
                keys: vec![separator],
                children: vec![root, right],
                ..Node::default()
            });
            self.state.root = new_root;
            tracing::debug!("B+ tree root split, height now {}", self.height());
        }

        self.state.len += 1;
        Ok(1)
    }

    /// Insert below `index`; returns the separator and new right sibling on split
    fn insert_into(&mut self, index: usize, key: &[u8], value: &[u8]) -> Option<(Vec<u8>, usize)> {
        if self.state.nodes[index].leaf {
            let position = self.upper_bound(&self.state.nodes[index].keys, key);
            let node = &mut self.state.nodes[index];
            node.keys.insert(position, key.to_vec());
            node.values.insert(position, value.to_vec());
            if node.keys.len() > self.max_keys() {
                return Some(self.split_leaf(index));
            }
            return None;
        }

        let slot = self.upper_bound(&self.state.nodes[index].keys, key);
        let child = self.state.nodes[index].children[slot];
        let (separator, right) = self.insert_into(child, key, value)?;

        let node = &mut self.state.nodes[index];
        node.keys.insert(slot, separator);
        node.children.insert(slot + 1, right);
        if node.keys.len() > self.max_keys() {
            return Some(self.split_internal(index));
        }
        None
    }

    fn split_leaf(&mut self, index: usize) -> (Vec<u8>, usize) {
        let node = &mut self.state.nodes[index];
        let mid = node.keys.len() / 2;
        let right = Node {
            leaf: true,
            keys: node.keys.split_off(mid),
            values: node.values.split_off(mid),
            children: Vec::new(),
            next: node.next,
        };
        let separator = right.keys[0].clone();

        let right_index = self.alloc(right);
        self.state.nodes[index].next = Some(right_index);
        (separator, right_index)
    }

    fn split_internal(&mut self, index: usize) -> (Vec<u8>, usize) {
        let node = &mut self.state.nodes[index];
        let mid = node.keys.len() / 2;
        let right_keys = node.keys.split_off(mid + 1);
        let right_children = node.children.split_off(mid + 1);
        // Middle key moves up rather than staying in either half
        let separator = node.keys.pop().unwrap_or_default();

        let right_index = self.alloc(Node {
            leaf: false,
            keys: right_keys,
            children: right_children,
            ..Node::default()
        });
        (separator, right_index)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove one occurrence of `key` from the subtree at `index`
    fn remove_one(&mut self, index: usize, key: &[u8]) -> bool {
        if self.state.nodes[index].leaf {
            let keys = &self.state.nodes[index].keys;
            let position = self.lower_bound(keys, key);
            if position >= keys.len() || self.cmp(&keys[position], key) != Ordering::Equal {
                return false;
            }
            let node = &mut self.state.nodes[index];
            node.keys.remove(position);
            node.values.remove(position);
            return true;
        }

        let mut slot = self.lower_bound(&self.state.nodes[index].keys, key);
        loop {
            let child = self.state.nodes[index].children[slot];
            if self.remove_one(child, key) {
                self.rebalance(index, slot);
                return true;
            }
            // Equal keys may continue past an equal separator
            let keys = &self.state.nodes[index].keys;
            if slot < keys.len() && self.cmp(&keys[slot], key) == Ordering::Equal {
                slot += 1;
            } else {
                return false;
            }
        }
    }

    /// Restore the minimum fill of child `slot` of `parent`
    fn rebalance(&mut self, parent: usize, slot: usize) {
        let child = self.state.nodes[parent].children[slot];
        if self.state.nodes[child].keys.len() >= self.min_keys() && !self.state.nodes[child].keys.is_empty() {
            return;
        }

        let sibling_count = self.state.nodes[parent].children.len();
        if slot > 0 {
            let left = self.state.nodes[parent].children[slot - 1];
            if self.state.nodes[left].keys.len() > self.min_keys() {
                self.borrow_from_left(parent, slot);
                return;
            }
        }
        if slot + 1 < sibling_count {
            let right = self.state.nodes[parent].children[slot + 1];
            if self.state.nodes[right].keys.len() > self.min_keys() {
                self.borrow_from_right(parent, slot);
                return;
            }
        }

        if slot > 0 {
            self.merge(parent, slot - 1);
        } else if slot + 1 < sibling_count {
            self.merge(parent, slot);
        }
    }

    fn borrow_from_left(&mut self, parent: usize, slot: usize) {
        let left = self.state.nodes[parent].children[slot - 1];
        let child = self.state.nodes[parent].children[slot];

        if self.state.nodes[child].leaf {
            let key = self.state.nodes[left].keys.pop().unwrap_or_default();
            let value = self.state.nodes[left].values.pop().unwrap_or_default();
            let node = &mut self.state.nodes[child];
            node.keys.insert(0, key.clone());
            node.values.insert(0, value);
            self.state.nodes[parent].keys[slot - 1] = key;
        } else {
            let key = self.state.nodes[left].keys.pop().unwrap_or_default();
            let moved_child = self.state.nodes[left].children.pop().unwrap_or_default();
            let separator = std::mem::replace(&mut self.state.nodes[parent].keys[slot - 1], key);
            let node = &mut self.state.nodes[child];
            node.keys.insert(0, separator);
            node.children.insert(0, moved_child);
        }
    }

    fn borrow_from_right(&mut self, parent: usize, slot: usize) {
        let right = self.state.nodes[parent].children[slot + 1];
        let child = self.state.nodes[parent].children[slot];

        if self.state.nodes[child].leaf {
            let key = self.state.nodes[right].keys.remove(0);
            let value = self.state.nodes[right].values.remove(0);
            let node = &mut self.state.nodes[child];
            node.keys.push(key);
            node.values.push(value);
            let new_first = self.state.nodes[right].keys[0].clone();
            self.state.nodes[parent].keys[slot] = new_first;
        } else {
            let key = self.state.nodes[right].keys.remove(0);
            let moved_child = self.state.nodes[right].children.remove(0);
            let separator = std::mem::replace(&mut self.state.nodes[parent].keys[slot], key);
            let node = &mut self.state.nodes[child];
            node.keys.push(separator);
            node.children.push(moved_child);
        }
    }

    /// Fold child `slot + 1` of `parent` into child `slot`
    fn merge(&mut self, parent: usize, slot: usize) {
        let left = self.state.nodes[parent].children[slot];
        let right = self.state.nodes[parent].children[slot + 1];
        let separator = self.state.nodes[parent].keys.remove(slot);
        self.state.nodes[parent].children.remove(slot + 1);

        let right_node = std::mem::take(&mut self.state.nodes[right]);
        let node = &mut self.state.nodes[left];
        if node.leaf {
            node.keys.extend(right_node.keys);
            node.values.extend(right_node.values);
            node.next = right_node.next;
        } else {
            node.keys.push(separator);
            node.keys.extend(right_node.keys);
            node.children.extend(right_node.children);
        }
        self.release(right);
    }

    fn delete_all(&mut self, key: &[u8]) -> usize {
        let mut count = 0;
        loop {
            let root = self.state.root;
            if !self.remove_one(root, key) {
                break;
            }
            count += 1;

            let root_node = &self.state.nodes[root];
            if !root_node.leaf && root_node.keys.is_empty() {
                let only_child = root_node.children[0];
                self.release(root);
                self.state.root = only_child;
            }
        }
        count
    }

    /// Check ordering, fill and link invariants (used by tests)
    #[cfg(test)]
    fn check_invariants(&self) {
        let mut leaves = Vec::new();
        self.check_node(self.state.root, None, None, true, &mut leaves);

        let (mut leaf, _) = self.seek(None);
        let mut walked = vec![leaf];
        while let Some(next) = self.state.nodes[leaf].next {
            walked.push(next);
            leaf = next;
        }
        assert_eq!(walked, leaves, "leaf chain does not match tree order");
    }

    #[cfg(test)]
    fn check_node(
        &self,
        index: usize,
        low: Option<&[u8]>,
        high: Option<&[u8]>,
        is_root: bool,
        leaves: &mut Vec<usize>,
    ) {
        let node = &self.state.nodes[index];
        if !is_root {
            assert!(node.keys.len() >= self.min_keys().max(1), "underfull node {}", index);
        }
        assert!(node.keys.len() <= self.max_keys(), "overfull node {}", index);
        for pair in node.keys.windows(2) {
            assert_ne!(self.cmp(&pair[0], &pair[1]), Ordering::Greater);
        }
        for key in &node.keys {
            if let Some(low) = low {
                assert_ne!(self.cmp(key, low), Ordering::Less);
            }
            if let Some(high) = high {
                assert_ne!(self.cmp(key, high), Ordering::Greater);
            }
        }

        if node.leaf {
            assert_eq!(node.keys.len(), node.values.len());
            leaves.push(index);
            return;
        }

        assert_eq!(node.children.len(), node.keys.len() + 1);
        for (i, &child) in node.children.iter().enumerate() {
            let child_low = if i == 0 { low } else { Some(node.keys[i - 1].as_slice()) };
            let child_high = if i == node.keys.len() { high } else { Some(node.keys[i].as_slice()) };
            self.check_node(child, child_low, child_high, false, leaves);
        }
    }
}

impl StorageEngine for BppTree {
    fn engine_type(&self) -> EngineType {
        EngineType::BppTree
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
        self.insert_record(key, value)
    }

    fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.state.info.check_key(key)?;
        let (leaf, index) = self.locate(key).ok_or(CairnError::ItemNotFound)?;
        Ok(self.state.nodes[leaf].values[index].clone())
    }

    fn update(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        self.state.info.check_record(key, value)?;
        let (mut leaf, mut index) = match self.locate(key) {
            Some(position) => position,
            None => return self.insert_record(key, value),
        };

        let unique = self.state.write_concern == WriteConcern::Unique;
        let mut count = 0;
        loop {
            if index >= self.state.nodes[leaf].keys.len() {
                match self.state.nodes[leaf].next {
                    Some(next) => {
                        leaf = next;
                        index = 0;
                        continue;
                    }
                    None => break,
                }
            }
            if self.cmp(&self.state.nodes[leaf].keys[index], key) != Ordering::Equal {
                break;
            }
            self.state.nodes[leaf].values[index] = value.to_vec();
            count += 1;
            if unique {
                break;
            }
            index += 1;
        }
        Ok(count)
    }

    fn delete(&mut self, key: &[u8]) -> Result<usize> {
        self.state.info.check_key(key)?;
        let count = self.delete_all(key);
        if count == 0 {
            return Err(CairnError::ItemNotFound);
        }
        self.state.len -= count as u64;
        Ok(count)
    }

    fn find<'a>(&'a mut self, predicate: Predicate) -> Result<Box<dyn Cursor + 'a>> {
        predicate.validate(&self.state.info)?;
        let (leaf, index) = self.seek(predicate.lower_bound());
        let scan = LeafScan {
            nodes: &self.state.nodes,
            key_type: self.state.info.key_type,
            predicate,
            leaf: Some(leaf),
            index,
        };
        Ok(Box::new(EngineCursor::start(scan)?))
    }

    fn len(&self) -> u64 {
        self.state.len
    }

    fn flush(&mut self) -> Result<()> {
        write_snapshot(&self.path, EngineType::BppTree, &self.state, self.sync)
    }

    fn destroy(self: Box<Self>) -> Result<()> {
        remove_storage(&self.path)
    }
}

/// Cursor source walking the leaf chain from a seek position
struct LeafScan<'a> {
    nodes: &'a [Node],
    key_type: KeyType,
    predicate: Predicate,
    leaf: Option<usize>,
    index: usize,
}

impl RecordSource for LeafScan<'_> {
    fn next_match(&mut self) -> Result<Option<Record>> {
        while let Some(leaf) = self.leaf {
            let node = &self.nodes[leaf];
            if self.index >= node.keys.len() {
                self.leaf = node.next;
                self.index = 0;
                continue;
            }

            let key = &node.keys[self.index];
            if self.predicate.is_past_end(self.key_type, key) {
                self.leaf = None;
                return Ok(None);
            }
            let position = self.index;
            self.index += 1;
            if self.predicate.matches(self.key_type, key) {
                return Ok(Some(Record::new(key.clone(), node.values[position].clone())));
            }
        }
        Ok(None)
    }
}
