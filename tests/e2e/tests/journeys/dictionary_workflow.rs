//! Dictionary journey: import, look up, count, delete.

use std::sync::{Arc, Mutex};

use kotoba_core::dictionary::{STORE_KANJI, STORE_TAG_META, STORE_TERMS};
use kotoba_e2e_tests::fixtures::{self, JMDICT};
use kotoba_e2e_tests::harness::TestDb;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn import_then_count() {
    let db = TestDb::seeded().await;

    let result = db
        .dictionary
        .get_dictionary_counts(&strings(&[JMDICT]), true)
        .await
        .unwrap();

    let total = result.total.unwrap();
    assert_eq!(total[STORE_TERMS], 4);
    assert_eq!(total[STORE_KANJI], 2);
    assert_eq!(total[STORE_TAG_META], 2);
    // One dictionary imported, so per-title counts match the totals.
    assert_eq!(result.counts.len(), 1);
    assert_eq!(result.counts[0][STORE_TERMS], 4);
}

#[tokio::test]
async fn captured_terms_resolve_against_enabled_dictionaries() {
    let db = TestDb::seeded().await;

    // A second dictionary that is not enabled for lookups.
    db.dictionary
        .add_dictionary(fixtures::summary("other"))
        .await
        .unwrap();
    db.dictionary
        .add_terms(vec![fixtures::term(100, "other", "言葉", "ことば")], 0, 1)
        .await
        .unwrap();

    let captured = strings(&["言葉", "未知語", "先生"]);
    let matches = db
        .dictionary
        .find_terms_bulk(&captured, &strings(&[JMDICT]))
        .await
        .unwrap();

    // Two captured terms match, one by expression each; the unknown term
    // and the disabled dictionary contribute nothing.
    assert_eq!(matches.len(), 2);
    assert!(matches.iter().all(|m| m.record.dictionary == JMDICT));
    let mut item_indices: Vec<usize> = matches.iter().map(|m| m.item_index).collect();
    item_indices.sort_unstable();
    assert_eq!(item_indices, vec![0, 2]);

    // Reading lookups go through the same fan-out.
    let by_reading = db
        .dictionary
        .find_terms_bulk(&strings(&["じしょ"]), &strings(&[JMDICT]))
        .await
        .unwrap();
    assert_eq!(by_reading.len(), 1);
    assert_eq!(by_reading[0].record.expression, "辞書");
}

#[tokio::test]
async fn tag_metadata_stays_positional() {
    let db = TestDb::seeded().await;

    let tags = db
        .dictionary
        .find_tag_meta_bulk(&strings(&["n", "absent", "common"]), Some(JMDICT))
        .await
        .unwrap();
    assert_eq!(tags.len(), 3);
    assert_eq!(tags[0].as_ref().map(|t| t.category.as_str()), Some("partOfSpeech"));
    assert!(tags[1].is_none());
    assert_eq!(tags[2].as_ref().map(|t| t.category.as_str()), Some("frequency"));
}

#[tokio::test]
async fn sequence_lookup_finds_grouped_senses() {
    let db = TestDb::seeded().await;

    // Fixture terms carry sequence 1_000_000 + id.
    let matches = db
        .dictionary
        .find_terms_by_sequence_bulk(&[1_000_001, 1_000_003], JMDICT)
        .await
        .unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].record.expression, "言葉");
    assert_eq!(matches[1].record.expression, "勉強");
}

#[tokio::test]
async fn delete_dictionary_end_to_end() {
    let db = TestDb::seeded().await;
    db.dictionary
        .add_dictionary(fixtures::summary("keep"))
        .await
        .unwrap();
    db.dictionary
        .add_terms(vec![fixtures::term(200, "keep", "残る", "のこる")], 0, 1)
        .await
        .unwrap();

    let updates: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&updates);
    let deleted = db
        .dictionary
        .delete_dictionary(
            JMDICT,
            Some(3),
            Some(Arc::new(move |count| seen.lock().unwrap().push(count))),
        )
        .await
        .unwrap();

    // 4 terms + 2 kanji + 2 tags + 1 summary row.
    assert_eq!(deleted, 9);
    let updates = updates.lock().unwrap();
    assert_eq!(updates.last(), Some(&9));
    assert!(updates.windows(2).all(|w| w[0] < w[1]));

    assert!(!db.dictionary.dictionary_exists(JMDICT).await.unwrap());
    assert!(db.dictionary.dictionary_exists("keep").await.unwrap());
    let counts = db
        .dictionary
        .get_dictionary_counts(&strings(&["keep"]), true)
        .await
        .unwrap();
    assert_eq!(counts.total.unwrap()[STORE_TERMS], 1);
}

#[tokio::test]
async fn duplicate_import_is_rejected_up_front() {
    let db = TestDb::seeded().await;

    assert!(db.dictionary.dictionary_exists(JMDICT).await.unwrap());
    let err = db
        .dictionary
        .add_dictionary(fixtures::summary(JMDICT))
        .await
        .unwrap_err();
    assert!(matches!(err, kotoba_core::StorageError::Database(_)));
}
