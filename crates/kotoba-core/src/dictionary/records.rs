//! Dictionary Records
//!
//! Typed records for the seven dictionary stores. Every record carries the
//! store's primary-key field plus the `dictionary` source-collection field
//! that bulk deletion and counting key off (the `dictionaries` summary store
//! uses its `title` for both).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dictionary term: one expression/reading pair with its glossary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermRecord {
    /// Primary key
    pub id: i64,
    /// Source dictionary title
    pub dictionary: String,
    /// The term as written (kanji and kana)
    pub expression: String,
    /// Kana reading of the expression
    pub reading: String,
    /// Sequence number grouping related senses, when the source provides one
    #[serde(default)]
    pub sequence: Option<i64>,
    /// Glossary definitions
    pub glossary: Vec<String>,
    /// Tag names attached to this term
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Auxiliary term data (frequency ranks, pitch accent, etc.)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermMetaRecord {
    /// Primary key
    pub id: i64,
    /// Source dictionary title
    pub dictionary: String,
    /// Expression this metadata describes
    pub expression: String,
    /// Kind of metadata (`freq`, `pitch`, ...)
    pub mode: String,
    /// Mode-specific payload
    pub data: serde_json::Value,
}

/// A kanji entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanjiRecord {
    /// Primary key
    pub id: i64,
    /// Source dictionary title
    pub dictionary: String,
    /// The character itself
    pub character: String,
    /// On'yomi readings
    #[serde(default)]
    pub onyomi: Vec<String>,
    /// Kun'yomi readings
    #[serde(default)]
    pub kunyomi: Vec<String>,
    /// English meanings
    pub meanings: Vec<String>,
    /// Tag names attached to this character
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Auxiliary kanji data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanjiMetaRecord {
    /// Primary key
    pub id: i64,
    /// Source dictionary title
    pub dictionary: String,
    /// Character this metadata describes
    pub character: String,
    /// Kind of metadata
    pub mode: String,
    /// Mode-specific payload
    pub data: serde_json::Value,
}

/// Metadata for one tag name within a dictionary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagMetaRecord {
    /// Primary key
    pub id: i64,
    /// Source dictionary title
    pub dictionary: String,
    /// Tag name
    pub name: String,
    /// Tag category (`partOfSpeech`, `frequency`, ...)
    pub category: String,
    /// Sort order within the category
    pub order: i64,
    /// Human-readable description
    #[serde(default)]
    pub notes: String,
}

/// An embedded media file (stroke diagrams, audio, images)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    /// Primary key
    pub id: i64,
    /// Source dictionary title
    pub dictionary: String,
    /// Path of the file inside the dictionary archive; unique per store
    pub path: String,
    /// MIME type
    pub media_type: String,
    /// Base64-encoded file content
    pub content: String,
}

/// Import summary for one dictionary, keyed by its title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionarySummary {
    /// Dictionary title; primary key and the source-collection value all of
    /// its records carry
    pub title: String,
    /// Source revision string
    pub revision: String,
    /// Source format version
    pub version: u32,
    /// When the import completed
    pub import_date: DateTime<Utc>,
    /// Per-store record counts captured at import time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<HashMap<String, u64>>,
}
