//! Tests for the Dictionary facade
//!
//! These tests verify:
//! - The same operations behave alike on every engine
//! - Closed dictionaries reject use
//! - Reopening restores records for every engine
//! - Destroy removes backing storage
//! - Unregistered dictionaries never share a backing file
//! - A failed close leaves the dictionary open

use std::fs;
use std::path::Path;

use cairnkv::{
    collect_records, CairnError, Config, Dictionary, DictionaryConfig, DictionaryStatus,
    EngineType, ErrorCode, KeyType, WriteConcern, UNASSIGNED_ID,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn key(k: i32) -> Vec<u8> {
    k.to_le_bytes().to_vec()
}

fn value(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn config_for(id: u64, engine: EngineType) -> DictionaryConfig {
    DictionaryConfig::new(id, KeyType::Signed, 4, 4, 64, engine)
}

fn create(dir: &Path, id: u64, engine: EngineType) -> Dictionary {
    Dictionary::create(dir, config_for(id, engine), &Config::default()).unwrap()
}

// =============================================================================
// Cross-Engine Tests
// =============================================================================

#[test]
fn test_basic_operations_on_every_engine() {
    let temp = TempDir::new().unwrap();
    for (id, engine) in EngineType::ALL.into_iter().enumerate() {
        let mut dictionary = create(temp.path(), id as u64 + 1, engine);
        dictionary.set_write_concern(WriteConcern::Unique).unwrap();

        for k in 0..20 {
            assert_eq!(dictionary.insert(&key(k), &value(k * 2)).unwrap(), 1, "{:?}", engine);
        }
        assert_eq!(dictionary.len().unwrap(), 20, "{:?}", engine);
        assert_eq!(dictionary.get(&key(7)).unwrap(), value(14), "{:?}", engine);

        let duplicate = dictionary.insert(&key(7), &value(0));
        assert!(matches!(duplicate, Err(CairnError::DuplicateKey)), "{:?}", engine);

        assert_eq!(dictionary.update(&key(7), &value(-1)).unwrap(), 1, "{:?}", engine);
        assert_eq!(dictionary.get(&key(7)).unwrap(), value(-1), "{:?}", engine);

        assert_eq!(dictionary.delete(&key(7)).unwrap(), 1, "{:?}", engine);
        let missing = dictionary.get(&key(7));
        assert!(matches!(missing, Err(CairnError::ItemNotFound)), "{:?}", engine);
        assert_eq!(dictionary.len().unwrap(), 19, "{:?}", engine);

        dictionary.close().unwrap();
    }
}

#[test]
fn test_range_matches_on_every_engine() {
    let temp = TempDir::new().unwrap();
    for (id, engine) in EngineType::ALL.into_iter().enumerate() {
        let mut dictionary = create(temp.path(), id as u64 + 1, engine);
        for k in -10..10 {
            dictionary.insert(&key(k), &value(k)).unwrap();
        }

        let mut records = {
            let mut cursor = dictionary.range(key(-1), key(1)).unwrap();
            collect_records(cursor.as_mut()).unwrap()
        };
        if !engine.is_ordered() {
            records.sort_by(|a, b| KeyType::Signed.compare(&a.key, &b.key));
        }
        let keys: Vec<Vec<u8>> = records.into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![key(-1), key(0), key(1)], "{:?}", engine);
    }
}

#[test]
fn test_every_engine_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let tunables = Config::default();
    for (id, engine) in EngineType::ALL.into_iter().enumerate() {
        let config = config_for(id as u64 + 10, engine);
        let mut dictionary = Dictionary::create(temp.path(), config, &tunables).unwrap();
        for k in 0..30 {
            dictionary.insert(&key(k), &value(k + 100)).unwrap();
        }
        dictionary.delete(&key(4)).unwrap();
        dictionary.close().unwrap();

        let mut dictionary = Dictionary::open_existing(temp.path(), config, &tunables).unwrap();
        assert_eq!(dictionary.len().unwrap(), 29, "{:?}", engine);
        assert_eq!(dictionary.get(&key(29)).unwrap(), value(129), "{:?}", engine);
        assert!(
            matches!(dictionary.get(&key(4)), Err(CairnError::ItemNotFound)),
            "{:?}",
            engine
        );
        dictionary.close().unwrap();
    }
}

#[test]
fn test_default_write_concern_per_engine() {
    let temp = TempDir::new().unwrap();
    for (id, engine) in EngineType::ALL.into_iter().enumerate() {
        let dictionary = create(temp.path(), id as u64 + 1, engine);
        assert_eq!(
            dictionary.write_concern().unwrap(),
            engine.default_write_concern()
        );
    }
}

#[test]
fn test_get_returns_one_of_many_duplicates() {
    let temp = TempDir::new().unwrap();
    for (id, engine) in EngineType::ALL.into_iter().enumerate() {
        let mut dictionary = create(temp.path(), id as u64 + 1, engine);
        dictionary.set_write_concern(WriteConcern::AllowDuplicates).unwrap();
        dictionary.insert(&key(3), &value(31)).unwrap();
        dictionary.insert(&key(3), &value(32)).unwrap();

        let found = dictionary.get(&key(3)).unwrap();
        assert!(found == value(31) || found == value(32), "{:?}", engine);

        // The full match count comes from an equality cursor
        let matches = {
            let mut cursor = dictionary.equality(key(3)).unwrap();
            collect_records(cursor.as_mut()).unwrap()
        };
        assert_eq!(matches.len(), 2, "{:?}", engine);
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_closed_dictionary_rejects_operations() {
    let temp = TempDir::new().unwrap();
    let mut dictionary = create(temp.path(), 1, EngineType::BppTree);
    dictionary.insert(&key(1), &value(1)).unwrap();
    dictionary.close().unwrap();

    assert_eq!(dictionary.status(), DictionaryStatus::Closed);
    let result = dictionary.get(&key(1));
    assert!(matches!(result, Err(CairnError::DictionaryClosed)));
    assert_eq!(result.unwrap_err().code(), ErrorCode::InvalidArgument);
    assert!(matches!(dictionary.insert(&key(2), &value(2)), Err(CairnError::DictionaryClosed)));
    assert!(matches!(dictionary.len(), Err(CairnError::DictionaryClosed)));
    assert!(dictionary.all_records().is_err());
    assert!(matches!(dictionary.close(), Err(CairnError::DictionaryClosed)));
}

#[test]
fn test_reopen_closed_dictionary() {
    let temp = TempDir::new().unwrap();
    let mut dictionary = create(temp.path(), 3, EngineType::SkipList);
    dictionary.insert(&key(5), &value(50)).unwrap();
    dictionary.close().unwrap();

    let config = *dictionary.config();
    dictionary.open(config).unwrap();
    assert_eq!(dictionary.status(), DictionaryStatus::Ok);
    assert_eq!(dictionary.get(&key(5)).unwrap(), value(50));
}

#[test]
fn test_open_existing_creates_missing_storage() {
    let temp = TempDir::new().unwrap();
    let config = config_for(8, EngineType::FlatFile);
    let mut dictionary = Dictionary::open_existing(temp.path(), config, &Config::default()).unwrap();
    assert_eq!(dictionary.len().unwrap(), 0);
    assert!(dictionary.storage_path().exists());
}

#[test]
fn test_storage_path_follows_id_and_engine() {
    let temp = TempDir::new().unwrap();
    let dictionary = create(temp.path(), 42, EngineType::LinearHash);
    assert_eq!(dictionary.storage_path(), temp.path().join("42.lhs"));
    assert_eq!(dictionary.id(), 42);
    assert_eq!(dictionary.data_dir(), temp.path());
}

#[test]
fn test_destroy_removes_storage() {
    let temp = TempDir::new().unwrap();
    for (id, engine) in EngineType::ALL.into_iter().enumerate() {
        let mut dictionary = create(temp.path(), id as u64 + 1, engine);
        dictionary.insert(&key(1), &value(1)).unwrap();
        // Write the snapshot so every engine has a file to remove
        dictionary.close().unwrap();
        let config = *dictionary.config();
        dictionary.open(config).unwrap();

        let path = dictionary.storage_path();
        assert!(path.exists(), "{:?}", engine);
        dictionary.destroy().unwrap();
        assert!(!path.exists(), "{:?}", engine);
    }
}

#[test]
fn test_unassigned_dictionaries_own_separate_files() {
    let temp = TempDir::new().unwrap();
    let tunables = Config::default();
    for engine in EngineType::ALL {
        let config = DictionaryConfig::new(UNASSIGNED_ID, KeyType::Signed, 4, 4, 16, engine);
        let mut first = Dictionary::create(temp.path(), config, &tunables).unwrap();
        first.insert(&key(1), &value(10)).unwrap();

        let mut second = Dictionary::create(temp.path(), config, &tunables).unwrap();
        second.insert(&key(2), &value(20)).unwrap();

        assert_ne!(first.storage_path(), second.storage_path(), "{:?}", engine);
        assert_eq!(first.get(&key(1)).unwrap(), value(10), "{:?}", engine);
        assert!(
            matches!(first.get(&key(2)), Err(CairnError::ItemNotFound)),
            "{:?}",
            engine
        );
        assert_eq!(second.len().unwrap(), 1, "{:?}", engine);

        first.close().unwrap();
        second.close().unwrap();
        assert_ne!(first.storage_path(), second.storage_path(), "{:?}", engine);
    }
}

#[test]
fn test_failed_close_keeps_dictionary_open() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("data");
    fs::create_dir_all(&dir).unwrap();

    let config = config_for(5, EngineType::BppTree);
    let mut dictionary = Dictionary::create(&dir, config, &Config::default()).unwrap();
    dictionary.insert(&key(1), &value(11)).unwrap();

    // The snapshot has nowhere to go
    fs::remove_dir_all(&dir).unwrap();
    assert!(matches!(dictionary.close(), Err(CairnError::Io(_))));
    assert_eq!(dictionary.status(), DictionaryStatus::Ok);
    assert_eq!(dictionary.get(&key(1)).unwrap(), value(11));

    fs::create_dir_all(&dir).unwrap();
    dictionary.close().unwrap();
    assert_eq!(dictionary.status(), DictionaryStatus::Closed);

    let mut dictionary = Dictionary::open_existing(&dir, config, &Config::default()).unwrap();
    assert_eq!(dictionary.get(&key(1)).unwrap(), value(11));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_invalid_configurations_are_rejected() {
    let temp = TempDir::new().unwrap();
    let tunables = Config::default();

    let zero_value = DictionaryConfig::new(1, KeyType::Signed, 4, 0, 8, EngineType::BppTree);
    assert!(matches!(
        Dictionary::create(temp.path(), zero_value, &tunables),
        Err(CairnError::InvalidArgument(_))
    ));

    let zero_slots = DictionaryConfig::new(1, KeyType::Signed, 4, 4, 0, EngineType::OpenAddressFileHash);
    assert!(matches!(
        Dictionary::create(temp.path(), zero_slots, &tunables),
        Err(CairnError::InvalidArgument(_))
    ));
}

#[test]
fn test_wrong_sized_records_are_rejected() {
    let temp = TempDir::new().unwrap();
    let mut dictionary = create(temp.path(), 1, EngineType::OpenAddressHash);
    assert!(matches!(
        dictionary.insert(&[1, 2, 3], &value(1)),
        Err(CairnError::InvalidArgument(_))
    ));
    assert!(matches!(
        dictionary.insert(&key(1), &[0; 5]),
        Err(CairnError::InvalidArgument(_))
    ));
    assert!(matches!(
        dictionary.range(key(5), key(1)).map(|_| ()),
        Err(CairnError::InvalidArgument(_))
    ));
}
