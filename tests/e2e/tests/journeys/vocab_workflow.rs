//! Vocabulary journey: capture, dedup, export mapping, persistence.

use kotoba_core::anki::{AnkiSettings, FieldMapping, NO_VALUE_MARKER};
use kotoba_core::japanese;
use kotoba_core::{build_note, SavedWordList, NO_NOTE_ID};
use kotoba_e2e_tests::fixtures;
use kotoba_e2e_tests::harness::TestDb;
use std::sync::Arc;

fn export_settings() -> AnkiSettings {
    AnkiSettings {
        deck: "Jisho Vocab".to_string(),
        model: "Japanese".to_string(),
        fields: vec![
            FieldMapping {
                field: "Word".to_string(),
                property: "expressionWithReadings".to_string(),
            },
            FieldMapping {
                field: "Meaning".to_string(),
                property: "englishMeaning".to_string(),
            },
            FieldMapping {
                field: "Parts of speech".to_string(),
                property: "partsOfSpeech".to_string(),
            },
            FieldMapping {
                field: "Audio".to_string(),
                property: NO_VALUE_MARKER.to_string(),
            },
        ],
        tags: vec!["kotoba".to_string()],
    }
}

#[tokio::test]
async fn recapturing_a_word_updates_instead_of_duplicating() {
    let db = TestDb::new().await;
    let mut saved = db.saved_words().await;

    saved
        .set(fixtures::saved_word("緊張する", "緊[きん]張[ちょう]する", "to be nervous"))
        .unwrap();
    // Same (expression, meaning) pair captured again with richer tags.
    let mut recaptured =
        fixtures::saved_word("緊張する", "緊[きん]張[ちょう]する", "to be nervous");
    recaptured.all_tags.push("jlpt-n3".to_string());
    saved.set(recaptured).unwrap();

    assert_eq!(saved.len(), 1);
    let word = saved.get("緊張する", "to be nervous").unwrap().unwrap();
    assert!(word.all_tags.contains(&"jlpt-n3".to_string()));

    // A different meaning of the same expression is its own entry.
    saved
        .set(fixtures::saved_word("緊張する", "緊[きん]張[ちょう]する", "to be tense"))
        .unwrap();
    assert_eq!(saved.len(), 2);
}

#[tokio::test]
async fn saved_words_persist_across_sessions() {
    let db = TestDb::new().await;
    let mut saved = db.saved_words().await;
    saved
        .set(fixtures::saved_word("言葉", "言[こと]葉[ば]", "word"))
        .unwrap();
    saved.save().await.unwrap();

    // A fresh list over the same database sees the flushed map.
    let mut next_session = SavedWordList::new(Arc::clone(&db.db));
    next_session.load().await.unwrap();
    assert_eq!(next_session.len(), 1);
    assert!(next_session.get("言葉", "word").unwrap().is_some());
    assert!(!next_session.is_dirty());
}

#[tokio::test]
async fn flashcard_export_flow() {
    let db = TestDb::new().await;

    // Settings are configured once and persisted next to the words.
    let settings = export_settings();
    settings.save(&db.db).await.unwrap();
    let loaded = AnkiSettings::load(&db.db).await.unwrap().unwrap();
    assert_eq!(loaded, settings);

    let mut saved = db.saved_words().await;
    let word = fixtures::saved_word("緊張する", "緊[きん]張[ちょう]する", "to be nervous");
    saved.set(word.clone()).unwrap();

    let note = build_note(&word, &loaded).unwrap();
    assert_eq!(note.deck_name, "Jisho Vocab");
    assert_eq!(note.fields["Word"], "緊[きん]張[ちょう]する");
    assert_eq!(note.fields["Meaning"], "to be nervous");
    assert_eq!(note.fields["Parts of speech"], "Noun");
    assert_eq!(note.fields["Audio"], "");

    // The note id comes back from AnkiConnect; record it on the word.
    assert!(!saved.has_note_id("緊張する", "to be nervous").unwrap());
    saved
        .set_note_id("緊張する", "to be nervous", 1496198395707)
        .unwrap();
    assert!(saved.has_note_id("緊張する", "to be nervous").unwrap());
    saved.save().await.unwrap();

    let word = saved.get("緊張する", "to be nervous").unwrap().unwrap();
    assert_ne!(word.note_id, NO_NOTE_ID);
}

#[tokio::test]
async fn note_fields_can_use_reading_transforms() {
    let expression = "緊[きん]張[ちょう]する";
    assert_eq!(japanese::strip_readings(expression), "緊張する");
    assert_eq!(japanese::reading_form(expression), "きんちょうする");

    // The transforms feed the captured word's plain-expression field.
    let word = fixtures::saved_word(
        &japanese::strip_readings(expression),
        expression,
        "to be nervous",
    );
    assert_eq!(word.expression, "緊張する");
}
