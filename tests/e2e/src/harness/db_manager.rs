//! Test Database Manager
//!
//! Isolated database instances for journey tests: each manager owns a
//! temporary directory holding its database files, so tests never
//! interfere with each other, and everything is removed on drop.

use std::sync::Arc;

use kotoba_core::{Database, DictionaryDatabase, SavedWordList};
use tempfile::TempDir;

use crate::fixtures;

/// One isolated, prepared dictionary database.
///
/// # Example
///
/// ```rust,ignore
/// let db = TestDb::new().await;
/// db.dictionary.add_terms(fixtures::jmdict_terms(), 0, 4).await?;
/// ```
pub struct TestDb {
    /// The shared gateway
    pub db: Arc<Database>,
    /// Repository over the prepared dictionary stores
    pub dictionary: DictionaryDatabase,
    // Kept alive so the database files outlive the test body.
    _temp_dir: TempDir,
}

impl TestDb {
    /// Create and prepare an empty database in a fresh temp directory
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let db = Arc::new(Database::new(Some(temp_dir.path().to_path_buf())));
        let dictionary = DictionaryDatabase::new(Arc::clone(&db));
        dictionary
            .prepare()
            .await
            .expect("failed to prepare dictionary database");
        Self {
            db,
            dictionary,
            _temp_dir: temp_dir,
        }
    }

    /// Create a database pre-seeded with the jmdict fixture dictionary
    pub async fn seeded() -> Self {
        let this = Self::new().await;
        fixtures::import_jmdict(&this.dictionary).await;
        this
    }

    /// A saved-word list over the same database, already loaded
    pub async fn saved_words(&self) -> SavedWordList {
        let mut list = SavedWordList::new(Arc::clone(&self.db));
        list.load().await.expect("failed to load saved words");
        list
    }
}
