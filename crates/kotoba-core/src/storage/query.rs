//! Query Engine
//!
//! Key and range types, the primitives available inside a scoped
//! transaction, and the async bulk operations built on them. Fan-out
//! batches join all-or-first-error; scans always run in ascending key
//! order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::database::{Database, Result, ScanMode, StorageError, TransactionMode};
use super::schema::{quoted, StoreShape};

// ============================================================================
// KEYS AND RANGES
// ============================================================================

/// A primary or index key: an integer or a string, kept in its native
/// storage class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Integer key
    Int(i64),
    /// String key
    Text(String),
}

impl Key {
    /// Extract a key from a JSON field, if the field holds a key type
    pub(crate) fn from_json(value: &serde_json::Value) -> Option<Key> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Key::Int),
            serde_json::Value::String(s) => Some(Key::Text(s.clone())),
            _ => None,
        }
    }

    fn sql_value(&self) -> rusqlite::types::Value {
        match self {
            Key::Int(n) => rusqlite::types::Value::Integer(*n),
            Key::Text(s) => rusqlite::types::Value::Text(s.clone()),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

impl ToSql for Key {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Key::Int(n) => Ok(ToSqlOutput::from(*n)),
            Key::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
        }
    }
}

impl FromSql for Key {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(n) => Ok(Key::Int(n)),
            ValueRef::Text(_) => Ok(Key::Text(value.as_str()?.to_string())),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// A single key or a contiguous key interval
#[derive(Debug, Clone, PartialEq)]
pub enum KeyRange {
    /// Exactly one key
    Only(Key),
    /// Everything at or above `lower` (`open` excludes the bound itself)
    LowerBound {
        /// Lower bound key
        lower: Key,
        /// Exclude the bound itself
        open: bool,
    },
    /// Everything at or below `upper`
    UpperBound {
        /// Upper bound key
        upper: Key,
        /// Exclude the bound itself
        open: bool,
    },
    /// A bounded interval
    Bound {
        /// Lower bound key
        lower: Key,
        /// Upper bound key
        upper: Key,
        /// Exclude the lower bound
        lower_open: bool,
        /// Exclude the upper bound
        upper_open: bool,
    },
}

impl KeyRange {
    /// Range matching exactly one key
    pub fn only(key: impl Into<Key>) -> Self {
        KeyRange::Only(key.into())
    }

    /// Range with only a lower bound
    pub fn lower_bound(lower: impl Into<Key>, open: bool) -> Self {
        KeyRange::LowerBound {
            lower: lower.into(),
            open,
        }
    }

    /// Range with only an upper bound
    pub fn upper_bound(upper: impl Into<Key>, open: bool) -> Self {
        KeyRange::UpperBound {
            upper: upper.into(),
            open,
        }
    }

    /// Bounded interval
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> Self {
        KeyRange::Bound {
            lower: lower.into(),
            upper: upper.into(),
            lower_open,
            upper_open,
        }
    }

    fn clause(&self, column: &str) -> (String, Vec<Key>) {
        match self {
            KeyRange::Only(key) => (format!("{column} = ?"), vec![key.clone()]),
            KeyRange::LowerBound { lower, open } => {
                let op = if *open { ">" } else { ">=" };
                (format!("{column} {op} ?"), vec![lower.clone()])
            }
            KeyRange::UpperBound { upper, open } => {
                let op = if *open { "<" } else { "<=" };
                (format!("{column} {op} ?"), vec![upper.clone()])
            }
            KeyRange::Bound {
                lower,
                upper,
                lower_open,
                upper_open,
            } => {
                let lower_op = if *lower_open { ">" } else { ">=" };
                let upper_op = if *upper_open { "<" } else { "<=" };
                (
                    format!("{column} {lower_op} ? AND {column} {upper_op} ?"),
                    vec![lower.clone(), upper.clone()],
                )
            }
        }
    }
}

/// One target of a [`Database::count_many`] batch
#[derive(Debug, Clone)]
pub struct CountTarget {
    /// Store to count in
    pub store: String,
    /// Count through this index instead of the primary key
    pub index: Option<String>,
    /// Restrict to keys in this range
    pub range: Option<KeyRange>,
}

impl CountTarget {
    /// Count every record of a store
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            index: None,
            range: None,
        }
    }

    /// Count through an index; without a range this counts the records
    /// that carry the indexed field
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Restrict the count to a key range
    pub fn with_range(mut self, range: KeyRange) -> Self {
        self.range = Some(range);
        self
    }
}

// ============================================================================
// SCOPED TRANSACTION
// ============================================================================

/// One transaction scoped to a set of stores.
///
/// Handed to the closure passed to [`Database::transaction`]; every read
/// and write inside that closure goes through this handle. Dropping it
/// without committing rolls the transaction back.
pub struct StoreTransaction<'conn> {
    tx: rusqlite::Transaction<'conn>,
    shapes: Arc<HashMap<String, StoreShape>>,
    allowed: HashSet<String>,
    mode: TransactionMode,
    scan_mode: ScanMode,
}

struct ResolvedScan {
    table: String,
    pk_column: String,
    scan_column: String,
    is_index: bool,
}

impl ResolvedScan {
    fn filter(&self, range: Option<&KeyRange>) -> (String, Vec<Key>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        if self.is_index {
            // Records without the indexed field are absent from the index.
            clauses.push(format!("{} IS NOT NULL", self.scan_column));
        }
        if let Some(range) = range {
            let (clause, mut keys) = range.clause(&self.scan_column);
            clauses.push(clause);
            params.append(&mut keys);
        }
        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        (sql, params)
    }

    fn order(&self) -> String {
        if self.is_index {
            format!(
                " ORDER BY {} ASC, {} ASC",
                self.scan_column, self.pk_column
            )
        } else {
            format!(" ORDER BY {} ASC", self.scan_column)
        }
    }
}

impl<'conn> StoreTransaction<'conn> {
    pub(crate) fn new(
        tx: rusqlite::Transaction<'conn>,
        shapes: Arc<HashMap<String, StoreShape>>,
        allowed: HashSet<String>,
        mode: TransactionMode,
        scan_mode: ScanMode,
    ) -> Self {
        Self {
            tx,
            shapes,
            allowed,
            mode,
            scan_mode,
        }
    }

    pub(crate) fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn shape(&self, store: &str) -> Result<&StoreShape> {
        if !self.allowed.contains(store) {
            return Err(StorageError::UnknownStore(store.to_string()));
        }
        self.shapes
            .get(store)
            .ok_or_else(|| StorageError::UnknownStore(store.to_string()))
    }

    fn resolve(&self, store: &str, index: Option<&str>) -> Result<ResolvedScan> {
        let shape = self.shape(store)?;
        let (scan_column, is_index) = match index {
            None => (quoted(&shape.primary_key), false),
            Some(field) => {
                let ix = shape.index(field).ok_or_else(|| StorageError::UnknownIndex {
                    store: store.to_string(),
                    index: field.to_string(),
                })?;
                (quoted(&ix.field), true)
            }
        };
        Ok(ResolvedScan {
            table: quoted(store),
            pk_column: quoted(&shape.primary_key),
            scan_column,
            is_index,
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            TransactionMode::ReadWrite => Ok(()),
            TransactionMode::ReadOnly => Err(StorageError::ReadOnlyTransaction),
        }
    }

    /// Every record whose scanned key falls in `range`, ascending
    pub fn scan_all<T: DeserializeOwned>(
        &self,
        store: &str,
        index: Option<&str>,
        range: Option<&KeyRange>,
    ) -> Result<Vec<T>> {
        let scan = self.resolve(store, index)?;
        let (filter, params) = scan.filter(range);
        let sql = format!(
            "SELECT record FROM {}{}{}",
            scan.table,
            filter,
            scan.order()
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let mut records = Vec::new();
        match self.scan_mode {
            ScanMode::BulkFetch => {
                let rows = stmt.query_map(
                    rusqlite::params_from_iter(params.iter()),
                    |row| row.get::<_, serde_json::Value>(0),
                )?;
                for row in rows {
                    records.push(serde_json::from_value(row?)?);
                }
            }
            ScanMode::Cursor => {
                let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
                while let Some(row) = rows.next()? {
                    let value: serde_json::Value = row.get(0)?;
                    records.push(serde_json::from_value(value)?);
                }
            }
        }
        Ok(records)
    }

    /// Primary keys of every record whose scanned key falls in `range`
    pub fn scan_keys_all(
        &self,
        store: &str,
        index: Option<&str>,
        range: Option<&KeyRange>,
    ) -> Result<Vec<Key>> {
        let scan = self.resolve(store, index)?;
        let (filter, params) = scan.filter(range);
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            scan.pk_column,
            scan.table,
            filter,
            scan.order()
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let mut keys = Vec::new();
        match self.scan_mode {
            ScanMode::BulkFetch => {
                let rows = stmt.query_map(
                    rusqlite::params_from_iter(params.iter()),
                    |row| row.get::<_, Key>(0),
                )?;
                for row in rows {
                    keys.push(row?);
                }
            }
            ScanMode::Cursor => {
                let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
                while let Some(row) = rows.next()? {
                    keys.push(row.get(0)?);
                }
            }
        }
        Ok(keys)
    }

    /// Walk the range in key order and return the first record passing
    /// `predicate` (or the first record at all when no predicate is
    /// given). Absence is `None`, never an error.
    pub fn find_first<T: DeserializeOwned>(
        &self,
        store: &str,
        index: Option<&str>,
        range: Option<&KeyRange>,
        predicate: Option<&dyn Fn(&T) -> bool>,
    ) -> Result<Option<T>> {
        let scan = self.resolve(store, index)?;
        let (filter, params) = scan.filter(range);
        let sql = format!(
            "SELECT record FROM {}{}{}",
            scan.table,
            filter,
            scan.order()
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        while let Some(row) = rows.next()? {
            let value: serde_json::Value = row.get(0)?;
            let record: T = serde_json::from_value(value)?;
            match predicate {
                Some(p) if !p(&record) => continue,
                _ => return Ok(Some(record)),
            }
        }
        Ok(None)
    }

    /// Count records in the range
    pub fn count(
        &self,
        store: &str,
        index: Option<&str>,
        range: Option<&KeyRange>,
    ) -> Result<u64> {
        let scan = self.resolve(store, index)?;
        let (filter, params) = scan.filter(range);
        let sql = format!("SELECT COUNT(*) FROM {}{}", scan.table, filter);
        let count = self.tx.query_row(
            &sql,
            rusqlite::params_from_iter(params.iter()),
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as u64)
    }

    /// Insert a record; duplicate keys are driver errors
    pub fn add<T: Serialize>(&self, store: &str, item: &T) -> Result<()> {
        self.write_row(store, item, false)
    }

    /// Insert or overwrite a record by primary key
    pub fn put<T: Serialize>(&self, store: &str, item: &T) -> Result<()> {
        self.write_row(store, item, true)
    }

    fn write_row<T: Serialize>(&self, store: &str, item: &T, upsert: bool) -> Result<()> {
        self.ensure_writable()?;
        let shape = self.shape(store)?;
        let record = serde_json::to_value(item)?;
        let key = record
            .get(&shape.primary_key)
            .and_then(Key::from_json)
            .ok_or_else(|| {
                StorageError::InvalidKey(format!(
                    "record for store {store} lacks key field {}",
                    shape.primary_key
                ))
            })?;

        let pk_column = quoted(&shape.primary_key);
        let mut columns = vec![pk_column.clone(), "record".to_string()];
        let mut params = vec![
            key.sql_value(),
            rusqlite::types::Value::Text(serde_json::to_string(&record)?),
        ];
        for ix in &shape.indices {
            if ix.field == shape.primary_key {
                continue;
            }
            columns.push(quoted(&ix.field));
            params.push(index_param(record.get(&ix.field)));
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quoted(store),
            columns.join(", ")
        );
        if upsert {
            let assignments = columns
                .iter()
                .skip(1)
                .map(|c| format!("{c} = excluded.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(
                " ON CONFLICT({pk_column}) DO UPDATE SET {assignments}"
            ));
        }
        self.tx
            .execute(&sql, rusqlite::params_from_iter(params.iter()))?;
        Ok(())
    }

    /// Delete one record by primary key
    pub fn delete(&self, store: &str, key: &Key) -> Result<()> {
        self.ensure_writable()?;
        let shape = self.shape(store)?;
        self.tx.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                quoted(store),
                quoted(&shape.primary_key)
            ),
            rusqlite::params![key],
        )?;
        Ok(())
    }
}

/// Index column value for a record field. Only key types are indexable;
/// anything else leaves the record out of that index.
fn index_param(value: Option<&serde_json::Value>) -> rusqlite::types::Value {
    match value {
        Some(serde_json::Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                rusqlite::types::Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                rusqlite::types::Value::Real(f)
            } else {
                rusqlite::types::Value::Null
            }
        }
        Some(serde_json::Value::String(s)) => rusqlite::types::Value::Text(s.clone()),
        _ => rusqlite::types::Value::Null,
    }
}

// ============================================================================
// ASYNC BULK OPERATIONS
// ============================================================================

/// Per-key filter applied between the key scan and the deletions of a
/// [`Database::bulk_delete`]
pub type KeyFilter = Box<dyn FnOnce(Vec<Key>) -> Vec<Key> + Send>;

/// Progress callback invoked as `(completed, total)` after each deletion
pub type DeleteProgress = Box<dyn FnMut(u64, u64) + Send>;

impl Database {
    /// [`StoreTransaction::scan_all`] in its own read transaction
    pub async fn scan_all<T>(
        &self,
        store: &str,
        index: Option<&str>,
        range: Option<KeyRange>,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let store = store.to_string();
        let index = index.map(str::to_string);
        let scope = [store.clone()];
        self.transaction(&scope, TransactionMode::ReadOnly, move |tx| {
            tx.scan_all(&store, index.as_deref(), range.as_ref())
        })
        .await
    }

    /// [`StoreTransaction::scan_keys_all`] in its own read transaction
    pub async fn scan_keys_all(
        &self,
        store: &str,
        index: Option<&str>,
        range: Option<KeyRange>,
    ) -> Result<Vec<Key>> {
        let store = store.to_string();
        let index = index.map(str::to_string);
        let scope = [store.clone()];
        self.transaction(&scope, TransactionMode::ReadOnly, move |tx| {
            tx.scan_keys_all(&store, index.as_deref(), range.as_ref())
        })
        .await
    }

    /// First record in the range passing `predicate`, walking keys in
    /// ascending order
    pub async fn find_first<T, P>(
        &self,
        store: &str,
        index: Option<&str>,
        range: Option<KeyRange>,
        predicate: P,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
        P: Fn(&T) -> bool + Send + 'static,
    {
        let store = store.to_string();
        let index = index.map(str::to_string);
        let scope = [store.clone()];
        self.transaction(&scope, TransactionMode::ReadOnly, move |tx| {
            tx.find_first(&store, index.as_deref(), range.as_ref(), Some(&predicate))
        })
        .await
    }

    /// Issue one count per target concurrently and join the results
    /// positionally. An empty target list resolves immediately without
    /// touching storage.
    pub async fn count_many(&self, targets: Vec<CountTarget>) -> Result<Vec<u64>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        try_join_all(targets.into_iter().map(|target| self.count_target(target))).await
    }

    async fn count_target(&self, target: CountTarget) -> Result<u64> {
        let scope = [target.store.clone()];
        self.transaction(&scope, TransactionMode::ReadOnly, move |tx| {
            tx.count(&target.store, target.index.as_deref(), target.range.as_ref())
        })
        .await
    }

    /// Insert `items[start .. start + count]` in one write transaction.
    ///
    /// The window is clamped to the item list; a start past the end
    /// inserts nothing.
    pub async fn bulk_add<T>(
        &self,
        store: &str,
        items: Vec<T>,
        start: usize,
        count: usize,
    ) -> Result<()>
    where
        T: Serialize + Send + 'static,
    {
        let store = store.to_string();
        let scope = [store.clone()];
        self.transaction(&scope, TransactionMode::ReadWrite, move |tx| {
            let end = items.len().min(start.saturating_add(count));
            for item in items.get(start..end).unwrap_or(&[]) {
                tx.add(&store, item)?;
            }
            Ok(())
        })
        .await
    }

    /// Insert or overwrite every item by primary key in one write
    /// transaction
    pub async fn bulk_put<T>(&self, store: &str, items: Vec<T>) -> Result<()>
    where
        T: Serialize + Send + 'static,
    {
        let store = store.to_string();
        let scope = [store.clone()];
        self.transaction(&scope, TransactionMode::ReadWrite, move |tx| {
            for item in &items {
                tx.put(&store, item)?;
            }
            Ok(())
        })
        .await
    }

    /// Delete every record whose scanned key falls in `range`, in one
    /// write transaction.
    ///
    /// Keys are fetched first, optionally narrowed by `key_filter`, then
    /// deleted one by one with `on_progress(completed, total)` after each
    /// deletion. Any failure rolls back the entire batch.
    pub async fn bulk_delete(
        &self,
        store: &str,
        index: Option<&str>,
        range: Option<KeyRange>,
        key_filter: Option<KeyFilter>,
        on_progress: Option<DeleteProgress>,
    ) -> Result<()> {
        let store = store.to_string();
        let index = index.map(str::to_string);
        let scope = [store.clone()];
        self.transaction(&scope, TransactionMode::ReadWrite, move |tx| {
            let keys = tx.scan_keys_all(&store, index.as_deref(), range.as_ref())?;
            let keys = match key_filter {
                Some(filter) => filter(keys),
                None => keys,
            };
            let total = keys.len() as u64;
            let mut on_progress = on_progress;
            for (done, key) in keys.iter().enumerate() {
                tx.delete(&store, key)?;
                if let Some(progress) = on_progress.as_mut() {
                    progress(done as u64 + 1, total);
                }
            }
            Ok(())
        })
        .await
    }
}
