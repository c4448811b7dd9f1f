//! Anki Integration
//!
//! Flashcard settings, note building from saved words, and (behind the
//! `anki-connect` feature) the AnkiConnect HTTP client.

#[cfg(feature = "anki-connect")]
#[cfg_attr(docsrs, doc(cfg(feature = "anki-connect")))]
pub mod client;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::storage::{Database, Result};
use crate::vocab::{load_bucket, save_bucket, SavedWord};

#[cfg(feature = "anki-connect")]
pub use client::{AnkiClient, AnkiError};

/// Marker a field mapping uses for "no value": the mapped note field gets
/// the empty string instead of a word property
pub const NO_VALUE_MARKER: &str = "—";

/// Reserved key of the settings blob inside the `local` store
pub const SETTINGS_KEY: &str = "ankiSettings";

/// One note field mapped to a saved-word property (or [`NO_VALUE_MARKER`])
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    /// Note field name in the Anki model
    pub field: String,
    /// Saved-word property name, camelCase wire form
    pub property: String,
}

/// Flashcard export configuration, persisted alongside the saved words
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnkiSettings {
    /// Target deck name
    pub deck: String,
    /// Note model name
    pub model: String,
    /// Field mappings in model field order
    pub fields: Vec<FieldMapping>,
    /// Tags attached to every created note
    pub tags: Vec<String>,
}

impl AnkiSettings {
    /// Load the persisted settings, if any
    pub async fn load(db: &Database) -> Result<Option<AnkiSettings>> {
        load_bucket(db, SETTINGS_KEY).await
    }

    /// Persist the settings under the reserved key
    pub async fn save(&self, db: &Database) -> Result<()> {
        save_bucket(db, SETTINGS_KEY, self).await
    }
}

/// Options attached to a note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteOptions {
    /// Allow creating the note even when Anki considers it a duplicate
    pub allow_duplicate: bool,
}

/// A flashcard as the AnkiConnect `addNote` action expects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Target deck
    pub deck_name: String,
    /// Note model
    pub model_name: String,
    /// Field name to rendered value
    pub fields: HashMap<String, String>,
    /// Note tags
    pub tags: Vec<String>,
    /// Creation options
    pub options: NoteOptions,
}

/// Build a note from a saved word using the configured field mappings.
///
/// Properties are rendered by JSON shape: strings pass through, arrays
/// join with `", "`, booleans and numbers stringify, null and missing
/// properties render empty. A mapping to [`NO_VALUE_MARKER`] always
/// renders the empty string.
pub fn build_note(word: &SavedWord, settings: &AnkiSettings) -> Result<Note> {
    let properties = serde_json::to_value(word)?;
    let mut fields = HashMap::with_capacity(settings.fields.len());
    for mapping in &settings.fields {
        let value = if mapping.property == NO_VALUE_MARKER {
            String::new()
        } else {
            render_property(properties.get(&mapping.property))
        };
        fields.insert(mapping.field.clone(), value);
    }
    Ok(Note {
        deck_name: settings.deck.clone(),
        model_name: settings.model.clone(),
        fields,
        tags: settings.tags.clone(),
        options: NoteOptions {
            allow_duplicate: true,
        },
    })
}

fn render_property(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| render_property(Some(item)))
            .collect::<Vec<_>>()
            .join(", "),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
