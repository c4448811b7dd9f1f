//! Dictionary Database - the record repository
//!
//! Domain operations over the dictionary stores, built only from the query
//! engine primitives: multi-index fan-out lookups, positional tag lookup,
//! delete-by-dictionary with coalesced progress, and per-dictionary counts
//! reshaped from one positional count batch.

mod records;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::try_join_all;
use serde::de::DeserializeOwned;

use crate::storage::{
    CountTarget, Database, IndexDefinition, Key, KeyRange, Result, SchemaUpgrade, StorageError,
    StoreDefinition,
};

pub use records::{
    DictionarySummary, KanjiMetaRecord, KanjiRecord, MediaRecord, TagMetaRecord, TermMetaRecord,
    TermRecord,
};

// ============================================================================
// SCHEMA
// ============================================================================

/// On-disk database name
pub const DATABASE_NAME: &str = "dict";

/// Schema version the repository opens at
pub const SCHEMA_VERSION: u32 = 2;

/// Terms store
pub const STORE_TERMS: &str = "terms";
/// Term metadata store
pub const STORE_TERM_META: &str = "termMeta";
/// Kanji store
pub const STORE_KANJI: &str = "kanji";
/// Kanji metadata store
pub const STORE_KANJI_META: &str = "kanjiMeta";
/// Tag metadata store
pub const STORE_TAG_META: &str = "tagMeta";
/// Media store
pub const STORE_MEDIA: &str = "media";
/// Dictionary import summaries, keyed by title
pub const STORE_DICTIONARIES: &str = "dictionaries";

/// Data stores in the fixed order used by bulk deletion and by the count
/// reshaping stride. `dictionaries` is deliberately absent: its one row per
/// dictionary is summary data, not records to count.
pub const DATA_STORES: &[&str] = &[
    STORE_TERMS,
    STORE_TERM_META,
    STORE_KANJI,
    STORE_KANJI_META,
    STORE_TAG_META,
    STORE_MEDIA,
];

const DICTIONARY_INDEX: &str = "dictionary";

const V1_STORES: &[StoreDefinition] = &[
    StoreDefinition {
        name: STORE_TERMS,
        primary_key: "id",
        indices: &[
            IndexDefinition {
                field: "dictionary",
                unique: false,
            },
            IndexDefinition {
                field: "expression",
                unique: false,
            },
            IndexDefinition {
                field: "reading",
                unique: false,
            },
        ],
    },
    StoreDefinition {
        name: STORE_TERM_META,
        primary_key: "id",
        indices: &[
            IndexDefinition {
                field: "dictionary",
                unique: false,
            },
            IndexDefinition {
                field: "expression",
                unique: false,
            },
        ],
    },
    StoreDefinition {
        name: STORE_KANJI,
        primary_key: "id",
        indices: &[
            IndexDefinition {
                field: "dictionary",
                unique: false,
            },
            IndexDefinition {
                field: "character",
                unique: false,
            },
        ],
    },
    StoreDefinition {
        name: STORE_KANJI_META,
        primary_key: "id",
        indices: &[
            IndexDefinition {
                field: "dictionary",
                unique: false,
            },
            IndexDefinition {
                field: "character",
                unique: false,
            },
        ],
    },
    StoreDefinition {
        name: STORE_TAG_META,
        primary_key: "id",
        indices: &[
            IndexDefinition {
                field: "dictionary",
                unique: false,
            },
            IndexDefinition {
                field: "name",
                unique: false,
            },
        ],
    },
    StoreDefinition {
        name: STORE_DICTIONARIES,
        primary_key: "title",
        indices: &[],
    },
    // Single-bucket key-value store used by the saved-word list and the
    // Anki settings, see `crate::vocab`.
    StoreDefinition {
        name: "local",
        primary_key: "key",
        indices: &[],
    },
];

const V2_STORES: &[StoreDefinition] = &[
    StoreDefinition {
        name: STORE_TERMS,
        primary_key: "id",
        indices: &[IndexDefinition {
            field: "sequence",
            unique: false,
        }],
    },
    StoreDefinition {
        name: STORE_MEDIA,
        primary_key: "id",
        indices: &[
            IndexDefinition {
                field: "dictionary",
                unique: false,
            },
            IndexDefinition {
                field: "path",
                unique: true,
            },
        ],
    },
];

/// Versioned schema of the dictionary database
pub const SCHEMA_UPGRADES: &[SchemaUpgrade] = &[
    SchemaUpgrade {
        version: 1,
        description: "initial dictionary stores",
        stores: V1_STORES,
    },
    SchemaUpgrade {
        version: 2,
        description: "media store, term sequence index",
        stores: V2_STORES,
    },
];

// ============================================================================
// RESULT TYPES
// ============================================================================

/// A record matched by a fan-out lookup, tagged with the position of the
/// input item that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Matched<T> {
    /// The matched record
    pub record: T,
    /// Index of the originating item in the input list
    pub item_index: usize,
}

/// Per-dictionary record counts, reshaped from one positional count batch
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryCounts {
    /// Whole-store totals by store name, when requested
    pub total: Option<HashMap<String, u64>>,
    /// One map per requested title, in request order, by store name
    pub counts: Vec<HashMap<String, u64>>,
}

/// Coalesced progress callback for [`DictionaryDatabase::delete_dictionary`],
/// invoked with the number of records deleted so far
pub type DeleteDictionaryProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// Progress updates are emitted once per this many deletions unless the
/// caller picks another rate
pub const DEFAULT_DELETE_PROGRESS_RATE: u64 = 1000;

// ============================================================================
// DICTIONARY DATABASE
// ============================================================================

/// Repository over the dictionary stores.
///
/// Holds a shared [`Database`] gateway; all I/O goes through it. Constructed
/// once and injected wherever dictionary data is needed.
pub struct DictionaryDatabase {
    db: Arc<Database>,
}

impl DictionaryDatabase {
    /// Wrap a gateway. Call [`prepare`](Self::prepare) before use.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The underlying gateway
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Open the dictionary database, applying any pending schema upgrades
    pub async fn prepare(&self) -> Result<()> {
        self.db
            .open(DATABASE_NAME, SCHEMA_VERSION, SCHEMA_UPGRADES)
            .await
    }

    /// Close the database
    pub fn close(&self) -> Result<()> {
        self.db.close()
    }

    /// Drop the whole database and reopen it with a fresh schema
    pub async fn purge(&self) -> Result<()> {
        if self.db.is_open() {
            self.db.close()?;
        }
        self.db.delete_database(DATABASE_NAME).await?;
        self.prepare().await
    }

    // ------------------------------------------------------------------
    // Fan-out lookups
    // ------------------------------------------------------------------

    /// N items x M indices fan-out lookup.
    ///
    /// For every input item and every named index, builds a range via
    /// `query_builder` and scans that index; each returned row is tested
    /// against `predicate(row, item)` and, if it passes, mapped by
    /// `result_builder(row, item_index)` into one flat result list. The call
    /// resolves once all N x M scans have completed; the first scan failure
    /// rejects the whole batch. Zero items or zero indices resolves
    /// immediately to an empty list.
    pub async fn bulk_find_by_index<I, T, R>(
        &self,
        store: &str,
        index_names: &[&str],
        items: &[I],
        query_builder: impl Fn(&I) -> KeyRange,
        predicate: impl Fn(&T, &I) -> bool,
        result_builder: impl Fn(T, usize) -> R,
    ) -> Result<Vec<R>>
    where
        I: Sync,
        T: DeserializeOwned + Send + 'static,
    {
        if items.is_empty() || index_names.is_empty() {
            return Ok(Vec::new());
        }

        let mut scans = Vec::with_capacity(items.len() * index_names.len());
        for (item_index, item) in items.iter().enumerate() {
            for &index in index_names {
                let range = query_builder(item);
                scans.push(async move {
                    let rows: Vec<T> = self.db.scan_all(store, Some(index), Some(range)).await?;
                    Ok::<_, StorageError>((item_index, rows))
                });
            }
        }

        let mut results = Vec::new();
        for (item_index, rows) in try_join_all(scans).await? {
            let item = &items[item_index];
            for row in rows {
                if predicate(&row, item) {
                    results.push(result_builder(row, item_index));
                }
            }
        }
        Ok(results)
    }

    /// Terms matching any of `term_list` by written form or reading,
    /// restricted to the enabled dictionaries
    pub async fn find_terms_bulk(
        &self,
        term_list: &[String],
        enabled_dictionaries: &[String],
    ) -> Result<Vec<Matched<TermRecord>>> {
        self.bulk_find_by_index(
            STORE_TERMS,
            &["expression", "reading"],
            term_list,
            |term| KeyRange::only(term.as_str()),
            |row: &TermRecord, _| enabled_dictionaries.contains(&row.dictionary),
            |record, item_index| Matched { record, item_index },
        )
        .await
    }

    /// Terms carrying any of the given sequence numbers within one
    /// dictionary
    pub async fn find_terms_by_sequence_bulk(
        &self,
        sequence_list: &[i64],
        main_dictionary: &str,
    ) -> Result<Vec<Matched<TermRecord>>> {
        self.bulk_find_by_index(
            STORE_TERMS,
            &["sequence"],
            sequence_list,
            |sequence| KeyRange::only(*sequence),
            |row: &TermRecord, _| row.dictionary == main_dictionary,
            |record, item_index| Matched { record, item_index },
        )
        .await
    }

    /// Term metadata for each expression in `term_list`
    pub async fn find_term_meta_bulk(
        &self,
        term_list: &[String],
        enabled_dictionaries: &[String],
    ) -> Result<Vec<Matched<TermMetaRecord>>> {
        self.bulk_find_by_index(
            STORE_TERM_META,
            &["expression"],
            term_list,
            |term| KeyRange::only(term.as_str()),
            |row: &TermMetaRecord, _| enabled_dictionaries.contains(&row.dictionary),
            |record, item_index| Matched { record, item_index },
        )
        .await
    }

    /// Kanji entries for each character in `character_list`
    pub async fn find_kanji_bulk(
        &self,
        character_list: &[String],
        enabled_dictionaries: &[String],
    ) -> Result<Vec<Matched<KanjiRecord>>> {
        self.bulk_find_by_index(
            STORE_KANJI,
            &["character"],
            character_list,
            |character| KeyRange::only(character.as_str()),
            |row: &KanjiRecord, _| enabled_dictionaries.contains(&row.dictionary),
            |record, item_index| Matched { record, item_index },
        )
        .await
    }

    /// Kanji metadata for each character in `character_list`
    pub async fn find_kanji_meta_bulk(
        &self,
        character_list: &[String],
        enabled_dictionaries: &[String],
    ) -> Result<Vec<Matched<KanjiMetaRecord>>> {
        self.bulk_find_by_index(
            STORE_KANJI_META,
            &["character"],
            character_list,
            |character| KeyRange::only(character.as_str()),
            |row: &KanjiMetaRecord, _| enabled_dictionaries.contains(&row.dictionary),
            |record, item_index| Matched { record, item_index },
        )
        .await
    }

    /// Tag metadata by name, positionally: slot `i` always corresponds to
    /// `names[i]`, with `None` when no tag matched. An optional dictionary
    /// disambiguates tags defined by several dictionaries.
    pub async fn find_tag_meta_bulk(
        &self,
        names: &[String],
        dictionary: Option<&str>,
    ) -> Result<Vec<Option<TagMetaRecord>>> {
        let dictionary = dictionary.map(str::to_string);
        let lookups = names.iter().map(|name| {
            let range = KeyRange::only(name.as_str());
            let dictionary = dictionary.clone();
            async move {
                self.db
                    .find_first(
                        STORE_TAG_META,
                        Some("name"),
                        Some(range),
                        move |tag: &TagMetaRecord| match &dictionary {
                            Some(d) => tag.dictionary == *d,
                            None => true,
                        },
                    )
                    .await
            }
        });
        try_join_all(lookups).await
    }

    // ------------------------------------------------------------------
    // Dictionary management
    // ------------------------------------------------------------------

    /// Whether a dictionary with this title has been imported
    pub async fn dictionary_exists(&self, title: &str) -> Result<bool> {
        let summary: Option<DictionarySummary> = self
            .db
            .find_first(STORE_DICTIONARIES, None, Some(KeyRange::only(title)), |_| {
                true
            })
            .await?;
        Ok(summary.is_some())
    }

    /// Import summaries of every dictionary, in title order
    pub async fn get_dictionary_info(&self) -> Result<Vec<DictionarySummary>> {
        self.db.scan_all(STORE_DICTIONARIES, None, None).await
    }

    /// Delete every record belonging to one dictionary, across all data
    /// stores plus its summary row. Per-store deletions run concurrently;
    /// the first failure rejects the whole operation. Progress is coalesced
    /// to one callback per `progress_rate` deletions (default
    /// [`DEFAULT_DELETE_PROGRESS_RATE`]) plus one on final completion.
    /// Returns the number of records deleted.
    pub async fn delete_dictionary(
        &self,
        title: &str,
        progress_rate: Option<u64>,
        on_progress: Option<DeleteDictionaryProgress>,
    ) -> Result<u64> {
        let rate = progress_rate.unwrap_or(DEFAULT_DELETE_PROGRESS_RATE).max(1);
        let completed = Arc::new(AtomicU64::new(0));

        let per_key = |completed: &Arc<AtomicU64>| {
            let completed = Arc::clone(completed);
            let on_progress = on_progress.clone();
            Box::new(move |_done: u64, _total: u64| {
                let so_far = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if so_far % rate == 0 {
                    if let Some(callback) = &on_progress {
                        callback(so_far);
                    }
                }
            }) as crate::storage::DeleteProgress
        };

        let mut deletions = Vec::with_capacity(DATA_STORES.len() + 1);
        for store in DATA_STORES {
            deletions.push(self.db.bulk_delete(
                store,
                Some(DICTIONARY_INDEX),
                Some(KeyRange::only(title)),
                None,
                Some(per_key(&completed)),
            ));
        }
        deletions.push(self.db.bulk_delete(
            STORE_DICTIONARIES,
            None,
            Some(KeyRange::only(title)),
            None,
            Some(per_key(&completed)),
        ));
        try_join_all(deletions).await?;

        let total = completed.load(Ordering::SeqCst);
        if total > 0 && total % rate != 0 {
            if let Some(callback) = &on_progress {
                callback(total);
            }
        }
        tracing::info!(title, records = total, "Deleted dictionary");
        Ok(total)
    }

    /// Record counts per dictionary title, plus optional whole-store totals.
    ///
    /// Issues one positional count batch: the total targets first (when
    /// requested), then one target per `(title, store)` pair; the flat
    /// result is reshaped back using the fixed [`DATA_STORES`] order as the
    /// stride.
    pub async fn get_dictionary_counts(
        &self,
        titles: &[String],
        include_total: bool,
    ) -> Result<DictionaryCounts> {
        let stride = DATA_STORES.len();
        let mut targets = Vec::with_capacity(stride * (titles.len() + usize::from(include_total)));
        if include_total {
            for store in DATA_STORES {
                targets.push(CountTarget::new(*store));
            }
        }
        for title in titles {
            for store in DATA_STORES {
                targets.push(
                    CountTarget::new(*store)
                        .with_index(DICTIONARY_INDEX)
                        .with_range(KeyRange::only(title.as_str())),
                );
            }
        }

        let flat = self.db.count_many(targets).await?;
        let mut chunks = flat.chunks(stride);
        let as_map = |chunk: &[u64]| {
            DATA_STORES
                .iter()
                .zip(chunk)
                .map(|(store, count)| (store.to_string(), *count))
                .collect::<HashMap<_, _>>()
        };

        let total = if include_total {
            chunks.next().map(as_map)
        } else {
            None
        };
        let counts = chunks.map(as_map).collect();
        Ok(DictionaryCounts { total, counts })
    }

    // ------------------------------------------------------------------
    // Import helpers
    // ------------------------------------------------------------------

    /// Record an import summary; a duplicate title is a driver error
    pub async fn add_dictionary(&self, summary: DictionarySummary) -> Result<()> {
        self.db
            .bulk_add(STORE_DICTIONARIES, vec![summary], 0, 1)
            .await
    }

    /// Insert `items[start .. start + count]` term records
    pub async fn add_terms(
        &self,
        items: Vec<TermRecord>,
        start: usize,
        count: usize,
    ) -> Result<()> {
        self.db.bulk_add(STORE_TERMS, items, start, count).await
    }

    /// Insert `items[start .. start + count]` term metadata records
    pub async fn add_term_meta(
        &self,
        items: Vec<TermMetaRecord>,
        start: usize,
        count: usize,
    ) -> Result<()> {
        self.db.bulk_add(STORE_TERM_META, items, start, count).await
    }

    /// Insert `items[start .. start + count]` kanji records
    pub async fn add_kanji(
        &self,
        items: Vec<KanjiRecord>,
        start: usize,
        count: usize,
    ) -> Result<()> {
        self.db.bulk_add(STORE_KANJI, items, start, count).await
    }

    /// Insert `items[start .. start + count]` kanji metadata records
    pub async fn add_kanji_meta(
        &self,
        items: Vec<KanjiMetaRecord>,
        start: usize,
        count: usize,
    ) -> Result<()> {
        self.db
            .bulk_add(STORE_KANJI_META, items, start, count)
            .await
    }

    /// Insert `items[start .. start + count]` tag metadata records
    pub async fn add_tag_meta(
        &self,
        items: Vec<TagMetaRecord>,
        start: usize,
        count: usize,
    ) -> Result<()> {
        self.db.bulk_add(STORE_TAG_META, items, start, count).await
    }

    /// Insert `items[start .. start + count]` media records
    pub async fn add_media(
        &self,
        items: Vec<MediaRecord>,
        start: usize,
        count: usize,
    ) -> Result<()> {
        self.db.bulk_add(STORE_MEDIA, items, start, count).await
    }

    /// Primary keys of every record one dictionary owns in one store; used
    /// by maintenance tooling to audit imports
    pub async fn dictionary_keys(&self, store: &str, title: &str) -> Result<Vec<Key>> {
        self.db
            .scan_keys_all(store, Some(DICTIONARY_INDEX), Some(KeyRange::only(title)))
            .await
    }
}
