//! Tests for the B+ tree engine
//!
//! These tests verify:
//! - Range and equality queries return records in key order
//! - Signed, unsigned and byte-string ordering
//! - Growth and shrinkage through splits, borrows and merges
//! - Duplicate keys spanning several leaves
//! - Snapshot persistence across close/open

use std::path::PathBuf;

use cairnkv::engine::BppTree;
use cairnkv::{
    collect_records, CairnError, Config, KeyType, Predicate, Record, RecordInfo, StorageEngine,
    WriteConcern,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn key(k: i32) -> Vec<u8> {
    k.to_le_bytes().to_vec()
}

fn as_int(raw: &[u8]) -> i32 {
    i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}

fn info() -> RecordInfo {
    RecordInfo::new(KeyType::Signed, 4, 4).unwrap()
}

fn setup_temp_tree(order: usize) -> (TempDir, PathBuf, Config) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("1.bpt");
    let config = Config::builder().bpp_tree_order(order).build();
    (temp, path, config)
}

fn query(tree: &mut BppTree, predicate: Predicate) -> Vec<Record> {
    let mut cursor = tree.find(predicate).unwrap();
    let records = collect_records(cursor.as_mut()).unwrap();
    records
}

fn keys(records: &[Record]) -> Vec<i32> {
    records.iter().map(|r| as_int(&r.key)).collect()
}

/// Deterministic permutation of 0..n
fn scrambled(n: i32) -> Vec<i32> {
    (0..n).map(|i| (i * 37) % n).collect()
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_range_returns_keys_in_order() {
    let (_temp, path, config) = setup_temp_tree(4);
    let mut tree = BppTree::create(&path, info(), &config).unwrap();
    for k in [70, 50, 25, 10, 3] {
        tree.insert(&key(k), &key(k * 10)).unwrap();
    }

    let records = query(&mut tree, Predicate::range(key(15), key(55)));
    assert_eq!(keys(&records), vec![25, 50]);
    assert_eq!(records[1].value, key(500));
}

#[test]
fn test_range_with_negative_keys() {
    let (_temp, path, config) = setup_temp_tree(4);
    let mut tree = BppTree::create(&path, info(), &config).unwrap();
    for k in -20..=20 {
        tree.insert(&key(k), &key(0)).unwrap();
    }

    let records = query(&mut tree, Predicate::range(key(-1), key(1)));
    assert_eq!(keys(&records), vec![-1, 0, 1]);

    let all = query(&mut tree, Predicate::AllRecords);
    assert_eq!(keys(&all), (-20..=20).collect::<Vec<_>>());
}

#[test]
fn test_unsigned_keys_order_numerically() {
    let (_temp, path, config) = setup_temp_tree(4);
    let info = RecordInfo::new(KeyType::Unsigned, 2, 1).unwrap();
    let mut tree = BppTree::create(&path, info, &config).unwrap();
    for k in [256u16, 1, 513, 2, 255] {
        tree.insert(&k.to_le_bytes(), &[0]).unwrap();
    }

    let records = query(&mut tree, Predicate::range(0u16.to_le_bytes().to_vec(), 300u16.to_le_bytes().to_vec()));
    let found: Vec<u16> = records
        .iter()
        .map(|r| u16::from_le_bytes([r.key[0], r.key[1]]))
        .collect();
    assert_eq!(found, vec![1, 2, 255, 256]);
}

#[test]
fn test_byte_keys_order_lexicographically() {
    let (_temp, path, config) = setup_temp_tree(4);
    let info = RecordInfo::new(KeyType::VariableLength, 3, 1).unwrap();
    let mut tree = BppTree::create(&path, info, &config).unwrap();
    for k in [b"pear", b"figs", b"appl", b"kiwi"] {
        tree.insert(&k[..3], &[1]).unwrap();
    }

    let records = query(&mut tree, Predicate::AllRecords);
    let found: Vec<&[u8]> = records.iter().map(|r| r.key.as_slice()).collect();
    assert_eq!(found, vec![&b"app"[..], &b"fig"[..], &b"kiw"[..], &b"pea"[..]]);
}

#[test]
fn test_equality_on_missing_key_is_empty() {
    let (_temp, path, config) = setup_temp_tree(4);
    let mut tree = BppTree::create(&path, info(), &config).unwrap();
    for k in (0..40).step_by(2) {
        tree.insert(&key(k), &key(k)).unwrap();
    }
    assert!(query(&mut tree, Predicate::equality(key(7))).is_empty());
    assert!(matches!(tree.get(&key(7)), Err(CairnError::ItemNotFound)));
}

// =============================================================================
// Structure Tests
// =============================================================================

#[test]
fn test_tree_grows_and_shrinks() {
    let (_temp, path, config) = setup_temp_tree(3);
    let mut tree = BppTree::create(&path, info(), &config).unwrap();
    assert_eq!(tree.height(), 1);

    for k in scrambled(200) {
        tree.insert(&key(k), &key(k)).unwrap();
    }
    let grown = tree.height();
    assert!(grown >= 5, "height {} too small for 200 keys at order 3", grown);

    for k in scrambled(200).into_iter().filter(|k| k % 4 != 0) {
        assert_eq!(tree.delete(&key(k)).unwrap(), 1);
    }
    assert_eq!(tree.len(), 50);
    assert!(tree.height() <= grown);

    let remaining = query(&mut tree, Predicate::AllRecords);
    assert_eq!(keys(&remaining), (0..200).step_by(4).collect::<Vec<_>>());
    for k in (0..200).step_by(4) {
        assert_eq!(tree.get(&key(k)).unwrap(), key(k));
    }
}

#[test]
fn test_draining_leaves_an_empty_usable_tree() {
    let (_temp, path, config) = setup_temp_tree(4);
    let mut tree = BppTree::create(&path, info(), &config).unwrap();
    for k in 0..64 {
        tree.insert(&key(k), &key(k)).unwrap();
    }
    for k in (0..64).rev() {
        tree.delete(&key(k)).unwrap();
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    assert!(query(&mut tree, Predicate::AllRecords).is_empty());

    tree.insert(&key(5), &key(6)).unwrap();
    assert_eq!(tree.get(&key(5)).unwrap(), key(6));
}

// =============================================================================
// Duplicate Tests
// =============================================================================

#[test]
fn test_duplicates_allowed_by_default() {
    let (_temp, path, config) = setup_temp_tree(3);
    let mut tree = BppTree::create(&path, info(), &config).unwrap();
    assert_eq!(tree.write_concern(), WriteConcern::AllowDuplicates);

    for k in 0..10 {
        tree.insert(&key(k), &key(0)).unwrap();
    }
    // Enough copies to span several leaves at order 3
    for copy in 0..9 {
        tree.insert(&key(5), &key(copy + 1)).unwrap();
    }

    let records = query(&mut tree, Predicate::equality(key(5)));
    assert_eq!(records.len(), 10);
    assert_eq!(tree.update(&key(5), &key(77)).unwrap(), 10);
    assert!(query(&mut tree, Predicate::equality(key(5)))
        .iter()
        .all(|r| r.value == key(77)));

    assert_eq!(tree.delete(&key(5)).unwrap(), 10);
    assert_eq!(tree.len(), 9);
    assert_eq!(keys(&query(&mut tree, Predicate::AllRecords)), vec![0, 1, 2, 3, 4, 6, 7, 8, 9]);
}

#[test]
fn test_unique_rejects_duplicates() {
    let (_temp, path, config) = setup_temp_tree(4);
    let mut tree = BppTree::create(&path, info(), &config).unwrap();
    tree.set_write_concern(WriteConcern::Unique).unwrap();
    tree.insert(&key(1), &key(1)).unwrap();
    assert!(matches!(
        tree.insert(&key(1), &key(2)),
        Err(CairnError::DuplicateKey)
    ));
    assert_eq!(tree.update(&key(1), &key(3)).unwrap(), 1);
    assert_eq!(tree.get(&key(1)).unwrap(), key(3));
}

#[test]
fn test_update_inserts_missing_key() {
    let (_temp, path, config) = setup_temp_tree(4);
    let mut tree = BppTree::create(&path, info(), &config).unwrap();
    assert_eq!(tree.update(&key(12), &key(1)).unwrap(), 1);
    assert_eq!(tree.len(), 1);
    assert!(matches!(tree.delete(&key(13)), Err(CairnError::ItemNotFound)));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_snapshot_survives_reopen() {
    let (_temp, path, config) = setup_temp_tree(4);
    let mut tree = BppTree::create(&path, info(), &config).unwrap();
    for k in scrambled(100) {
        tree.insert(&key(k), &key(-k)).unwrap();
    }
    tree.set_write_concern(WriteConcern::Unique).unwrap();
    let height = tree.height();
    Box::new(tree).close().unwrap();

    let mut tree = BppTree::open(&path, info(), &config).unwrap();
    assert_eq!(tree.len(), 100);
    assert_eq!(tree.height(), height);
    assert_eq!(tree.write_concern(), WriteConcern::Unique);
    assert_eq!(keys(&query(&mut tree, Predicate::range(key(40), key(44)))), vec![40, 41, 42, 43, 44]);
    assert_eq!(tree.get(&key(99)).unwrap(), key(-99));
}

#[test]
fn test_snapshot_of_other_engine_is_corruption() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("1.bpt");
    let skip = cairnkv::engine::SkipList::create(&path, info(), 0, &Config::default()).unwrap();
    Box::new(skip).close().unwrap();

    assert!(matches!(
        BppTree::open(&path, info(), &Config::default()),
        Err(CairnError::Corruption(_))
    ));
}
