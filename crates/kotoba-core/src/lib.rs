//! # Kotoba Core
//!
//! Local vocabulary storage core: capture dictionary entries, persist and
//! deduplicate them locally, and export selected entries as Anki flashcards
//! over the local AnkiConnect API.
//!
//! - **Versioned stores**: declarative store/index descriptors with
//!   idempotent, extend-only schema upgrades (SQLite behind an async gateway)
//! - **Lifecycle enforcement**: closed/opening/open states with typed usage
//!   errors instead of silent misuse
//! - **Bulk queries**: multi-index fan-out lookups, positional count
//!   batches, and all-or-nothing bulk deletes with progress reporting
//! - **Saved-word list**: content-hashed personal vocabulary with
//!   overwrite-on-recapture semantics
//! - **Anki export**: field-mapped note building and the AnkiConnect
//!   JSON protocol (version 6)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kotoba_core::prelude::*;
//!
//! // One gateway, injected everywhere storage is needed
//! let db = Arc::new(Database::new(None));
//! let dictionary = DictionaryDatabase::new(Arc::clone(&db));
//! dictionary.prepare().await?;
//!
//! // Look up a batch of captured terms across every enabled dictionary
//! let matches = dictionary
//!     .find_terms_bulk(&terms, &enabled_dictionaries)
//!     .await?;
//!
//! // Save a word; the same (expression, meaning) pair always overwrites
//! let mut saved = SavedWordList::new(Arc::clone(&db));
//! saved.load().await?;
//! saved.set(word)?;
//! saved.save().await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): compile SQLite into the binary
//! - `encryption`: SQLCipher instead of plain SQLite (mutually exclusive
//!   with `bundled-sqlite`)
//! - `anki-connect` (default): the AnkiConnect HTTP client

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod anki;
pub mod dictionary;
pub mod japanese;
pub mod storage;
pub mod vocab;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use storage::{
    CountTarget, Database, IndexDefinition, Key, KeyRange, Result, ScanMode, SchemaUpgrade,
    StorageError, StoreDefinition, StoreTransaction, TransactionMode,
};

pub use dictionary::{
    DictionaryCounts, DictionaryDatabase, DictionarySummary, KanjiMetaRecord, KanjiRecord,
    Matched, MediaRecord, TagMetaRecord, TermMetaRecord, TermRecord,
};

pub use vocab::{word_key, SavedWord, SavedWordList, NO_NOTE_ID};

pub use anki::{build_note, AnkiSettings, FieldMapping, Note, NoteOptions, NO_VALUE_MARKER};

#[cfg(feature = "anki-connect")]
#[cfg_attr(docsrs, doc(cfg(feature = "anki-connect")))]
pub use anki::{AnkiClient, AnkiError};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dictionary schema version the repository opens at
pub use dictionary::SCHEMA_VERSION;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        build_note, AnkiSettings, Database, DictionaryDatabase, DictionarySummary, Key, KeyRange,
        Note, Result, SavedWord, SavedWordList, StorageError, TermRecord,
    };

    #[cfg(feature = "anki-connect")]
    pub use crate::{AnkiClient, AnkiError};
}
