//! Test Data Fixtures
//!
//! Realistic dictionary records and saved words for the journey tests.
//! The jmdict fixture is small but exercises every data store.

use chrono::Utc;
use kotoba_core::dictionary::{KanjiRecord, TagMetaRecord};
use kotoba_core::{DictionaryDatabase, DictionarySummary, SavedWord, TermRecord, NO_NOTE_ID};

/// Fixture dictionary title
pub const JMDICT: &str = "jmdict-test";

/// Build one term record
pub fn term(id: i64, dictionary: &str, expression: &str, reading: &str) -> TermRecord {
    TermRecord {
        id,
        dictionary: dictionary.to_string(),
        expression: expression.to_string(),
        reading: reading.to_string(),
        sequence: Some(1_000_000 + id),
        glossary: vec![format!("meaning of {expression}")],
        tags: vec!["n".to_string()],
    }
}

/// Build one kanji record
pub fn kanji(id: i64, dictionary: &str, character: &str, meaning: &str) -> KanjiRecord {
    KanjiRecord {
        id,
        dictionary: dictionary.to_string(),
        character: character.to_string(),
        onyomi: vec!["ゴ".to_string()],
        kunyomi: vec!["かた.る".to_string()],
        meanings: vec![meaning.to_string()],
        tags: Vec::new(),
    }
}

/// Build one tag metadata record
pub fn tag(id: i64, dictionary: &str, name: &str, category: &str) -> TagMetaRecord {
    TagMetaRecord {
        id,
        dictionary: dictionary.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        order: id,
        notes: format!("{name} tag"),
    }
}

/// Build an import summary dated now
pub fn summary(title: &str) -> DictionarySummary {
    DictionarySummary {
        title: title.to_string(),
        revision: "test-1".to_string(),
        version: 3,
        import_date: Utc::now(),
        counts: None,
    }
}

/// Build one saved word with no flashcard yet
pub fn saved_word(expression: &str, reading_form: &str, meaning: &str) -> SavedWord {
    SavedWord {
        expression_with_readings: reading_form.to_string(),
        expression: expression.to_string(),
        english_meaning: meaning.to_string(),
        parts_of_speech: vec!["Noun".to_string()],
        common: true,
        jlpt: Some("N4".to_string()),
        wanikani: None,
        all_tags: vec!["common".to_string()],
        note_id: NO_NOTE_ID,
    }
}

/// The jmdict fixture term set
pub fn jmdict_terms() -> Vec<TermRecord> {
    vec![
        term(1, JMDICT, "言葉", "ことば"),
        term(2, JMDICT, "辞書", "じしょ"),
        term(3, JMDICT, "勉強", "べんきょう"),
        term(4, JMDICT, "先生", "せんせい"),
    ]
}

/// Import the whole jmdict fixture: summary row, terms, kanji, and tags
pub async fn import_jmdict(dictionary: &DictionaryDatabase) {
    dictionary
        .add_dictionary(summary(JMDICT))
        .await
        .expect("failed to add dictionary summary");

    let terms = jmdict_terms();
    let count = terms.len();
    dictionary
        .add_terms(terms, 0, count)
        .await
        .expect("failed to add terms");

    dictionary
        .add_kanji(
            vec![kanji(1, JMDICT, "語", "word"), kanji(2, JMDICT, "書", "write")],
            0,
            2,
        )
        .await
        .expect("failed to add kanji");

    dictionary
        .add_tag_meta(
            vec![tag(1, JMDICT, "n", "partOfSpeech"), tag(2, JMDICT, "common", "frequency")],
            0,
            2,
        )
        .await
        .expect("failed to add tags");
}
