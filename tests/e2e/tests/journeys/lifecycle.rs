//! Lifecycle journey: open, misuse, close, reopen, purge.

use std::sync::Arc;

use kotoba_core::dictionary::{self, STORE_TERMS};
use kotoba_core::{Database, DictionaryDatabase, StorageError};
use kotoba_e2e_tests::fixtures::{self, JMDICT};
use kotoba_e2e_tests::harness::TestDb;
use tempfile::TempDir;

#[tokio::test]
async fn double_open_is_a_usage_error() {
    let db = TestDb::new().await;
    let err = db.dictionary.prepare().await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyOpen));
}

#[tokio::test]
async fn transactions_require_an_open_database() {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(Database::new(Some(temp_dir.path().to_path_buf())));
    let dictionary = DictionaryDatabase::new(Arc::clone(&db));

    let err = dictionary.get_dictionary_info().await.unwrap_err();
    assert!(matches!(err, StorageError::NotOpen));

    dictionary.prepare().await.unwrap();
    assert!(dictionary.get_dictionary_info().await.unwrap().is_empty());

    dictionary.close().unwrap();
    let err = dictionary.dictionary_exists(JMDICT).await.unwrap_err();
    assert!(matches!(err, StorageError::NotOpen));
}

#[tokio::test]
async fn data_survives_close_and_reopen() {
    let db = TestDb::seeded().await;
    db.dictionary.close().unwrap();

    // Reopening at the same version re-applies the upgrades idempotently
    // and finds the same records.
    db.dictionary.prepare().await.unwrap();
    assert!(db.dictionary.dictionary_exists(JMDICT).await.unwrap());

    let counts = db
        .dictionary
        .get_dictionary_counts(&[JMDICT.to_string()], false)
        .await
        .unwrap();
    assert_eq!(counts.counts[0][STORE_TERMS], fixtures::jmdict_terms().len() as u64);
}

#[tokio::test]
async fn reopening_twice_leaves_the_schema_identical() {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(Database::new(Some(temp_dir.path().to_path_buf())));
    let dictionary = DictionaryDatabase::new(Arc::clone(&db));

    dictionary.prepare().await.unwrap();
    fixtures::import_jmdict(&dictionary).await;
    dictionary.close().unwrap();
    dictionary.prepare().await.unwrap();
    dictionary.close().unwrap();
    dictionary.prepare().await.unwrap();

    // Every store is still reachable and still holds its records; a
    // broken re-upgrade would have failed or lost indices by now.
    let results = dictionary
        .find_terms_bulk(&["言葉".to_string()], &[JMDICT.to_string()])
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn deletion_is_blocked_while_open() {
    let db = TestDb::seeded().await;

    let err = db.db.delete_database(dictionary::DATABASE_NAME).await.unwrap_err();
    assert!(matches!(err, StorageError::DeleteBlocked));

    // Purge closes first, deletes, and reopens with a fresh schema.
    db.dictionary.purge().await.unwrap();
    assert!(db.db.is_open());
    assert!(!db.dictionary.dictionary_exists(JMDICT).await.unwrap());
}
