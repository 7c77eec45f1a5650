//! Tests for the MasterTable catalog
//!
//! These tests verify:
//! - Identifier allocation starts at 1 and never reuses ids
//! - Rows persist across close/initialize cycles
//! - Dictionaries can be reopened from their stored rows
//! - Registration of externally built dictionaries
//! - Every engine can back the catalog itself

use std::fs;
use std::path::PathBuf;

use cairnkv::{
    CairnError, Config, Dictionary, DictionaryConfig, EngineType, KeyType, MasterTable,
    MASTER_TABLE_ID, UNASSIGNED_ID,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_master(engine: EngineType) -> (TempDir, PathBuf, MasterTable) {
    let temp = TempDir::new().unwrap();
    let data_dir = temp.path().join("data");
    let config = Config::builder()
        .data_dir(&data_dir)
        .master_engine(engine)
        .build();
    let mut master = MasterTable::new(config);
    master.initialize().unwrap();
    (temp, data_dir, master)
}

fn key(k: i32) -> Vec<u8> {
    k.to_le_bytes().to_vec()
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_initialize_creates_data_dir_and_catalog() {
    let (_temp, data_dir, master) = setup_temp_master(EngineType::FlatFile);
    assert!(data_dir.is_dir());
    assert!(data_dir.join("0.ffs").exists());
    assert!(master.is_open());
    assert_eq!(master.next_id().unwrap(), 1);
}

#[test]
fn test_closed_master_rejects_use() {
    let (_temp, _data_dir, mut master) = setup_temp_master(EngineType::FlatFile);
    master.close().unwrap();

    assert!(!master.is_open());
    assert!(matches!(master.next_id(), Err(CairnError::MasterTableClosed)));
    assert!(matches!(
        master.initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::BppTree),
        Err(CairnError::MasterTableClosed)
    ));
    assert!(matches!(master.lookup(1), Err(CairnError::MasterTableClosed)));
    assert!(matches!(master.close(), Err(CairnError::MasterTableClosed)));
}

// =============================================================================
// Identifier Allocation Tests
// =============================================================================

#[test]
fn test_ids_start_at_one_and_increase() {
    let (_temp, _data_dir, mut master) = setup_temp_master(EngineType::FlatFile);
    for expected in 1..=3 {
        let mut dictionary = master
            .initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::BppTree)
            .unwrap();
        assert_eq!(dictionary.id(), expected);
        dictionary.close().unwrap();
    }
    assert_eq!(master.next_id().unwrap(), 4);
}

#[test]
fn test_ids_persist_across_restart() {
    let (_temp, _data_dir, mut master) = setup_temp_master(EngineType::FlatFile);
    let first = master
        .initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::BppTree)
        .unwrap();
    assert_eq!(first.id(), 1);
    master.close().unwrap();

    master.initialize().unwrap();
    let second = master
        .initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::BppTree)
        .unwrap();
    assert_eq!(second.id(), 2);
}

#[test]
fn test_deleted_ids_are_never_reused() {
    let (_temp, data_dir, mut master) = setup_temp_master(EngineType::FlatFile);
    let _one = master
        .initialize_dictionary(KeyType::Signed, 4, 4, 8, EngineType::OpenAddressFileHash)
        .unwrap();
    let two = master
        .initialize_dictionary(KeyType::Signed, 4, 4, 8, EngineType::OpenAddressFileHash)
        .unwrap();
    assert_eq!(two.id(), 2);

    master.delete_dictionary(two).unwrap();
    assert!(!data_dir.join("2.oaf").exists());
    assert!(matches!(master.lookup(2), Err(CairnError::ItemNotFound)));

    master.close().unwrap();
    master.initialize().unwrap();
    let three = master
        .initialize_dictionary(KeyType::Signed, 4, 4, 8, EngineType::OpenAddressFileHash)
        .unwrap();
    assert_eq!(three.id(), 3);
}

#[test]
fn test_invalid_dictionary_does_not_consume_an_id() {
    let (_temp, _data_dir, mut master) = setup_temp_master(EngineType::FlatFile);
    assert!(matches!(
        master.initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::OpenAddressHash),
        Err(CairnError::InvalidArgument(_))
    ));
    assert_eq!(master.next_id().unwrap(), 1);
}

// =============================================================================
// Row Lookup and Reopen Tests
// =============================================================================

#[test]
fn test_lookup_returns_stored_configuration() {
    let (_temp, _data_dir, mut master) = setup_temp_master(EngineType::FlatFile);
    let dictionary = master
        .initialize_dictionary(KeyType::VariableLength, 16, 32, 7, EngineType::LinearHash)
        .unwrap();

    let config = master.lookup(dictionary.id()).unwrap();
    assert_eq!(config, *dictionary.config());
    assert_eq!(config.key_type, KeyType::VariableLength);
    assert_eq!(config.key_size, 16);
    assert_eq!(config.value_size, 32);
    assert_eq!(config.capacity, 7);
    assert_eq!(config.engine_type, EngineType::LinearHash);

    assert!(matches!(master.lookup(MASTER_TABLE_ID), Err(CairnError::ItemNotFound)));
    assert!(matches!(master.lookup(99), Err(CairnError::ItemNotFound)));
}

#[test]
fn test_records_survive_full_restart() {
    let (_temp, _data_dir, mut master) = setup_temp_master(EngineType::BppTree);
    let id = {
        let mut dictionary = master
            .initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::SkipList)
            .unwrap();
        for k in 0..10 {
            dictionary.insert(&key(k), &key(k * k)).unwrap();
        }
        master.close_dictionary(&mut dictionary).unwrap();
        dictionary.id()
    };
    master.close().unwrap();

    master.initialize().unwrap();
    let mut dictionary = master.load_dictionary(id).unwrap();
    assert_eq!(dictionary.config().engine_type, EngineType::SkipList);
    assert_eq!(dictionary.len().unwrap(), 10);
    assert_eq!(dictionary.get(&key(9)).unwrap(), key(81));
}

#[test]
fn test_open_dictionary_rebinds_a_handle() {
    let (_temp, _data_dir, mut master) = setup_temp_master(EngineType::FlatFile);
    let mut first = master
        .initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::BppTree)
        .unwrap();
    first.insert(&key(1), &key(10)).unwrap();
    first.close().unwrap();

    let mut second = master
        .initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::FlatFile)
        .unwrap();
    second.insert(&key(2), &key(20)).unwrap();

    // Point the second handle at the first dictionary
    master.open_dictionary(&mut second, 1).unwrap();
    assert_eq!(second.id(), 1);
    assert_eq!(second.get(&key(1)).unwrap(), key(10));
}

#[test]
fn test_entries_list_rows_in_id_order() {
    let (_temp, _data_dir, mut master) = setup_temp_master(EngineType::OpenAddressHash);
    for engine in [EngineType::FlatFile, EngineType::BppTree, EngineType::SkipList] {
        master
            .initialize_dictionary(KeyType::Unsigned, 8, 8, 0, engine)
            .unwrap();
    }
    master.delete_entry(2).unwrap();

    let entries = master.entries().unwrap();
    let ids: Vec<u64> = entries.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(entries[1].engine_type, EngineType::SkipList);

    assert!(matches!(
        master.delete_entry(MASTER_TABLE_ID),
        Err(CairnError::InvalidArgument(_))
    ));
    assert!(matches!(master.delete_entry(2), Err(CairnError::ItemNotFound)));
}

// =============================================================================
// Registration Tests
// =============================================================================

#[test]
fn test_add_registers_an_external_dictionary() {
    let (_temp, data_dir, mut master) = setup_temp_master(EngineType::FlatFile);
    master
        .initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::BppTree)
        .unwrap();

    let config = DictionaryConfig::new(UNASSIGNED_ID, KeyType::Signed, 4, 4, 16, EngineType::OpenAddressFileHash);
    let mut dictionary = Dictionary::create(&data_dir, config, master.config()).unwrap();
    dictionary.insert(&key(3), &key(30)).unwrap();

    let id = master.add(&mut dictionary, 16).unwrap();
    assert_eq!(id, 2);
    assert_eq!(dictionary.id(), 2);
    assert!(data_dir.join("2.oaf").exists());
    assert!(!data_dir.join(format!("{}.oaf", UNASSIGNED_ID)).exists());

    // Records moved with the file
    assert_eq!(dictionary.get(&key(3)).unwrap(), key(30));
    assert_eq!(master.lookup(2).unwrap().capacity, 16);
}

#[test]
fn test_add_registers_several_external_dictionaries() {
    let (_temp, data_dir, mut master) = setup_temp_master(EngineType::FlatFile);
    let config = DictionaryConfig::new(UNASSIGNED_ID, KeyType::Signed, 4, 4, 8, EngineType::FlatFile);

    let mut first = Dictionary::create(&data_dir, config, master.config()).unwrap();
    first.insert(&key(1), &key(10)).unwrap();
    let mut second = Dictionary::create(&data_dir, config, master.config()).unwrap();
    second.insert(&key(2), &key(20)).unwrap();
    let placeholders = [first.storage_path(), second.storage_path()];

    assert_eq!(master.add(&mut first, 8).unwrap(), 1);
    assert_eq!(master.add(&mut second, 8).unwrap(), 2);
    for placeholder in &placeholders {
        assert!(!placeholder.exists());
    }

    assert_eq!(first.storage_path(), data_dir.join("1.ffs"));
    assert_eq!(second.storage_path(), data_dir.join("2.ffs"));
    assert_eq!(first.get(&key(1)).unwrap(), key(10));
    assert_eq!(second.get(&key(2)).unwrap(), key(20));
    assert!(matches!(first.get(&key(2)), Err(CairnError::ItemNotFound)));

    first.close().unwrap();
    let mut reloaded = master.load_dictionary(1).unwrap();
    assert_eq!(reloaded.len().unwrap(), 1);
}

#[test]
fn test_delete_unregistered_dictionary_keeps_storage() {
    let (_temp, data_dir, mut master) = setup_temp_master(EngineType::FlatFile);
    let config = DictionaryConfig::new(UNASSIGNED_ID, KeyType::Signed, 4, 4, 8, EngineType::FlatFile);
    let mut dictionary = Dictionary::create(&data_dir, config, master.config()).unwrap();
    dictionary.insert(&key(1), &key(10)).unwrap();
    let path = dictionary.storage_path();
    let size = fs::metadata(&path).unwrap().len();

    assert!(matches!(
        master.delete_dictionary(dictionary),
        Err(CairnError::ItemNotFound)
    ));
    assert!(path.exists());
    assert_eq!(fs::metadata(&path).unwrap().len(), size);
}

// =============================================================================
// Catalog Engine Tests
// =============================================================================

#[test]
fn test_every_engine_can_back_the_catalog() {
    for engine in EngineType::ALL {
        let (_temp, data_dir, mut master) = setup_temp_master(engine);
        for _ in 0..3 {
            master
                .initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::FlatFile)
                .unwrap();
        }
        master.delete_entry(1).unwrap();
        master.close().unwrap();
        assert!(engine.storage_path(&data_dir, MASTER_TABLE_ID).exists(), "{:?}", engine);

        master.initialize().unwrap();
        assert_eq!(master.next_id().unwrap(), 4, "{:?}", engine);
        let ids: Vec<u64> = master.entries().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 3], "{:?}", engine);
        master.close().unwrap();
    }
}

#[test]
fn test_initialize_twice_reopens_cleanly() {
    let (_temp, _data_dir, mut master) = setup_temp_master(EngineType::LinearHash);
    master
        .initialize_dictionary(KeyType::Signed, 4, 4, 0, EngineType::BppTree)
        .unwrap();
    master.initialize().unwrap();
    assert_eq!(master.next_id().unwrap(), 2);
}
