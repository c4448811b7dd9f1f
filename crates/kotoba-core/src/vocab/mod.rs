//! Saved-Word List - the lightweight key-value cache
//!
//! The user's personal vocabulary lives as one JSON object under a reserved
//! key in the single-bucket `local` store. The whole map is loaded into
//! memory on [`SavedWordList::load`] and flushed back on
//! [`SavedWordList::save`]; entries are keyed by a deterministic SHA-256
//! hash of `(expression, englishMeaning)` so re-capturing the same word
//! overwrites instead of duplicating.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::storage::{Database, KeyRange, Result, StorageError};

/// Single-bucket store holding serialized blobs under reserved keys
pub const LOCAL_STORE: &str = "local";

/// Reserved key of the saved-word map inside the `local` store
pub const SAVED_WORDS_KEY: &str = "japanese";

/// Sentinel meaning "no flashcard has been created for this word".
///
/// Absence is always this value, never field omission, so existence checks
/// are plain comparisons.
pub const NO_NOTE_ID: i64 = -1;

fn default_note_id() -> i64 {
    NO_NOTE_ID
}

/// One saved vocabulary item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedWord {
    /// Expression with bracketed furigana, e.g. `緊[きん]張[ちょう]する`
    pub expression_with_readings: String,
    /// Plain expression; half of the hash key
    pub expression: String,
    /// English meaning; the other half of the hash key
    pub english_meaning: String,
    /// Parts of speech
    #[serde(default)]
    pub parts_of_speech: Vec<String>,
    /// Marked as a common word by the source
    #[serde(default)]
    pub common: bool,
    /// JLPT level label, when known
    #[serde(default)]
    pub jlpt: Option<String>,
    /// WaniKani level label, when known
    #[serde(default)]
    pub wanikani: Option<String>,
    /// Every tag attached to the entry
    #[serde(default)]
    pub all_tags: Vec<String>,
    /// Id of the created flashcard, or [`NO_NOTE_ID`]
    #[serde(default = "default_note_id")]
    pub note_id: i64,
}

/// Hash key for a `(expression, englishMeaning)` pair: lowercase-hex
/// SHA-256 of their concatenation. The same pair always produces the same
/// key; a pair with both fields empty is an ambiguous lookup and is
/// rejected.
pub fn word_key(expression: &str, english_meaning: &str) -> Result<String> {
    if expression.is_empty() && english_meaning.is_empty() {
        return Err(StorageError::EmptyQuery);
    }
    let mut hasher = Sha256::new();
    hasher.update(expression.as_bytes());
    hasher.update(english_meaning.as_bytes());
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// One row of the `local` bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BucketRecord {
    pub key: String,
    pub value: serde_json::Value,
}

/// Load one reserved-key blob from the `local` bucket
pub(crate) async fn load_bucket<T: serde::de::DeserializeOwned>(
    db: &Database,
    key: &str,
) -> Result<Option<T>> {
    let record: Option<BucketRecord> = db
        .find_first(LOCAL_STORE, None, Some(KeyRange::only(key)), |_| true)
        .await?;
    match record {
        Some(record) => Ok(Some(serde_json::from_value(record.value)?)),
        None => Ok(None),
    }
}

/// Store one reserved-key blob into the `local` bucket
pub(crate) async fn save_bucket<T: Serialize>(db: &Database, key: &str, value: &T) -> Result<()> {
    let record = BucketRecord {
        key: key.to_string(),
        value: serde_json::to_value(value)?,
    };
    db.bulk_put(LOCAL_STORE, vec![record]).await
}

/// In-memory saved-word map with whole-object persistence.
///
/// Mutations are synchronous against the in-memory map and tracked with a
/// dirty flag; [`save`](Self::save) is a no-op while clean. Mutating
/// methods silently no-op until [`load`](Self::load) has succeeded, per the
/// cache contract.
pub struct SavedWordList {
    db: Arc<Database>,
    words: HashMap<String, SavedWord>,
    loaded: bool,
    dirty: bool,
}

impl SavedWordList {
    /// Wrap a gateway whose schema includes the `local` store
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            words: HashMap::new(),
            loaded: false,
            dirty: false,
        }
    }

    /// Load the whole map from storage, replacing any in-memory state
    pub async fn load(&mut self) -> Result<()> {
        self.loaded = false;
        self.words = load_bucket(&self.db, SAVED_WORDS_KEY)
            .await?
            .unwrap_or_default();
        self.loaded = true;
        self.dirty = false;
        Ok(())
    }

    /// True once a load has succeeded
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// True when the map has unsaved mutations
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of saved words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True when no words are saved
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Insert or overwrite a word by its hash key. No-ops when not loaded.
    pub fn set(&mut self, word: SavedWord) -> Result<()> {
        if !self.loaded {
            return Ok(());
        }
        let key = word_key(&word.expression, &word.english_meaning)?;
        self.words.insert(key, word);
        self.dirty = true;
        Ok(())
    }

    /// The saved word for a `(expression, meaning)` pair, if any
    pub fn get(&self, expression: &str, english_meaning: &str) -> Result<Option<&SavedWord>> {
        if !self.loaded {
            return Ok(None);
        }
        let key = word_key(expression, english_meaning)?;
        Ok(self.words.get(&key))
    }

    /// The whole map, keyed by hash
    pub fn entries(&self) -> &HashMap<String, SavedWord> {
        &self.words
    }

    /// Remove a word by its hash key. No-ops when not loaded; removing an
    /// absent word is not an error.
    pub fn delete(&mut self, expression: &str, english_meaning: &str) -> Result<()> {
        if !self.loaded {
            return Ok(());
        }
        let key = word_key(expression, english_meaning)?;
        if self.words.remove(&key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    /// Mutate one saved word in place.
    ///
    /// The entry is removed, mutated, and re-inserted: the hash key derives
    /// from content fields the mutation may change, so delete-then-reinsert
    /// is the required sequencing. Returns whether a word was found.
    pub fn change_property(
        &mut self,
        expression: &str,
        english_meaning: &str,
        mutate: impl FnOnce(&mut SavedWord),
    ) -> Result<bool> {
        if !self.loaded {
            return Ok(false);
        }
        let key = word_key(expression, english_meaning)?;
        let Some(mut word) = self.words.remove(&key) else {
            return Ok(false);
        };
        self.dirty = true;
        mutate(&mut word);
        let new_key = word_key(&word.expression, &word.english_meaning)?;
        self.words.insert(new_key, word);
        Ok(true)
    }

    /// Record the flashcard id created for a word
    pub fn set_note_id(&mut self, expression: &str, english_meaning: &str, id: i64) -> Result<bool> {
        self.change_property(expression, english_meaning, |word| word.note_id = id)
    }

    /// Whether a flashcard has been created for a word
    pub fn has_note_id(&self, expression: &str, english_meaning: &str) -> Result<bool> {
        Ok(self
            .get(expression, english_meaning)?
            .is_some_and(|word| word.note_id != NO_NOTE_ID))
    }

    /// Flush the whole map back to storage. No-op while clean.
    pub async fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        save_bucket(&self.db, SAVED_WORDS_KEY, &self.words).await?;
        self.dirty = false;
        Ok(())
    }
}
