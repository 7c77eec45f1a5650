//! Tests for the linear hash engine
//!
//! These tests verify:
//! - Incremental bucket splits driven by the load threshold
//! - Lookups across splits and level changes
//! - Duplicate handling under both write concerns
//! - Snapshot persistence of the split state

use std::path::PathBuf;

use cairnkv::engine::LinearHash;
use cairnkv::{
    collect_records, CairnError, Config, KeyType, Predicate, RecordInfo, StorageEngine,
    WriteConcern,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn key(k: u64) -> Vec<u8> {
    k.to_le_bytes().to_vec()
}

fn info() -> RecordInfo {
    RecordInfo::new(KeyType::Unsigned, 8, 8).unwrap()
}

fn setup_temp_table() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("5.lhs");
    (temp, path)
}

/// Two records per bucket, split at half load
fn eager_config() -> Config {
    Config::builder()
        .linear_hash_records_per_bucket(2)
        .linear_hash_split_threshold(50)
        .build()
}

// =============================================================================
// Split Tests
// =============================================================================

#[test]
fn test_buckets_grow_one_at_a_time() {
    let (_temp, path) = setup_temp_table();
    let mut table = LinearHash::create(&path, info(), 2, &eager_config()).unwrap();
    assert_eq!(table.bucket_count(), 2);

    // 2 buckets * 2 slots: the second record reaches 50%
    table.insert(&key(0), &key(0)).unwrap();
    assert_eq!(table.bucket_count(), 2);
    table.insert(&key(1), &key(1)).unwrap();
    assert_eq!(table.bucket_count(), 3);

    for k in 2..40 {
        table.insert(&key(k), &key(k)).unwrap();
    }
    assert!(table.bucket_count() >= 20);
    assert!(table.level() >= 3);
}

#[test]
fn test_every_record_addressable_after_splits() {
    let (_temp, path) = setup_temp_table();
    let mut table = LinearHash::create(&path, info(), 1, &eager_config()).unwrap();
    for k in 0..500 {
        table.insert(&key(k * 7), &key(k)).unwrap();
    }
    assert_eq!(table.len(), 500);
    for k in 0..500 {
        assert_eq!(table.get(&key(k * 7)).unwrap(), key(k));
    }
    assert!(matches!(table.get(&key(3)), Err(CairnError::ItemNotFound)));
}

#[test]
fn test_zero_initial_buckets_is_rejected_by_config() {
    let config = cairnkv::DictionaryConfig::new(1, KeyType::Unsigned, 8, 8, 0, cairnkv::EngineType::LinearHash);
    assert!(matches!(config.validate(), Err(CairnError::InvalidArgument(_))));
}

// =============================================================================
// Write Concern Tests
// =============================================================================

#[test]
fn test_unique_by_default() {
    let (_temp, path) = setup_temp_table();
    let mut table = LinearHash::create(&path, info(), 4, &Config::default()).unwrap();
    assert_eq!(table.write_concern(), WriteConcern::Unique);
    table.insert(&key(8), &key(1)).unwrap();
    assert!(matches!(
        table.insert(&key(8), &key(2)),
        Err(CairnError::DuplicateKey)
    ));
}

#[test]
fn test_duplicates_follow_their_bucket_through_splits() {
    let (_temp, path) = setup_temp_table();
    let mut table = LinearHash::create(&path, info(), 1, &eager_config()).unwrap();
    table.set_write_concern(WriteConcern::AllowDuplicates).unwrap();

    for copy in 0..3 {
        table.insert(&key(42), &key(copy)).unwrap();
    }
    for k in 0..50 {
        table.insert(&key(k + 100), &key(k)).unwrap();
    }

    let mut cursor = table.find(Predicate::equality(key(42))).unwrap();
    let records = collect_records(cursor.as_mut()).unwrap();
    drop(cursor);
    assert_eq!(records.len(), 3);

    assert_eq!(table.update(&key(42), &key(9)).unwrap(), 3);
    assert_eq!(table.delete(&key(42)).unwrap(), 3);
    assert_eq!(table.len(), 50);
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_range_visits_all_buckets() {
    let (_temp, path) = setup_temp_table();
    let mut table = LinearHash::create(&path, info(), 2, &eager_config()).unwrap();
    for k in 0..30 {
        table.insert(&key(k), &key(k)).unwrap();
    }

    let mut cursor = table.find(Predicate::range(key(10), key(19))).unwrap();
    let mut found: Vec<u64> = collect_records(cursor.as_mut())
        .unwrap()
        .iter()
        .map(|r| u64::from_le_bytes(r.key[..].try_into().unwrap()))
        .collect();
    found.sort_unstable();
    assert_eq!(found, (10..20).collect::<Vec<_>>());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_split_state_survives_reopen() {
    let (_temp, path) = setup_temp_table();
    let mut table = LinearHash::create(&path, info(), 2, &eager_config()).unwrap();
    for k in 0..25 {
        table.insert(&key(k), &key(k + 1)).unwrap();
    }
    let buckets = table.bucket_count();
    let level = table.level();
    Box::new(table).close().unwrap();

    let mut table = LinearHash::open(&path, info(), 2, &eager_config()).unwrap();
    assert_eq!(table.bucket_count(), buckets);
    assert_eq!(table.level(), level);
    assert_eq!(table.len(), 25);
    for k in 0..25 {
        assert_eq!(table.get(&key(k)).unwrap(), key(k + 1));
    }
}

#[test]
fn test_garbage_snapshot_is_corruption() {
    let (_temp, path) = setup_temp_table();
    std::fs::write(&path, b"definitely not a snapshot").unwrap();
    assert!(matches!(
        LinearHash::open(&path, info(), 2, &Config::default()),
        Err(CairnError::Corruption(_))
    ));
}
