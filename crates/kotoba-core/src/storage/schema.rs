//! Schema Definitions and Upgrades
//!
//! Declarative store/index descriptors and the versioned upgrade procedure
//! that applies them. Upgrades are idempotent and extend-only: existing
//! stores gain missing indices, nothing is ever dropped.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::Connection;

use super::database::{Result, StorageError};

/// One version step of the schema: the stores that must exist once this
/// version has been applied.
#[derive(Debug, Clone)]
pub struct SchemaUpgrade {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// Stores introduced or extended at this version
    pub stores: &'static [StoreDefinition],
}

/// A named record store with a primary key and secondary indices
#[derive(Debug, Clone)]
pub struct StoreDefinition {
    /// Store name
    pub name: &'static str,
    /// Field holding each record's primary key
    pub primary_key: &'static str,
    /// Secondary indices
    pub indices: &'static [IndexDefinition],
}

/// A secondary index over one record field
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    /// Indexed field
    pub field: &'static str,
    /// Reject duplicate values when true
    pub unique: bool,
}

/// Runtime shape of a store after all applicable upgrades
#[derive(Debug, Clone)]
pub struct StoreShape {
    /// Field holding each record's primary key
    pub primary_key: String,
    /// Secondary indices in declaration order
    pub indices: Vec<IndexShape>,
}

/// Runtime shape of one secondary index
#[derive(Debug, Clone)]
pub struct IndexShape {
    /// Indexed field
    pub field: String,
    /// Uniqueness flag
    pub unique: bool,
}

impl StoreShape {
    /// Look up an index by its field name
    pub fn index(&self, field: &str) -> Option<&IndexShape> {
        self.indices.iter().find(|ix| ix.field == field)
    }
}

/// Quote an identifier for embedding in SQL
pub(crate) fn quoted(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Merge every upgrade entry at or below `version` into the effective
/// store map used for transaction scoping and query validation.
pub(crate) fn effective_shapes(
    upgrades: &[SchemaUpgrade],
    version: u32,
) -> HashMap<String, StoreShape> {
    let mut shapes: HashMap<String, StoreShape> = HashMap::new();
    for upgrade in upgrades {
        if upgrade.version > version {
            continue;
        }
        for store in upgrade.stores {
            let shape = shapes
                .entry(store.name.to_string())
                .or_insert_with(|| StoreShape {
                    primary_key: store.primary_key.to_string(),
                    indices: Vec::new(),
                });
            for index in store.indices {
                if shape.index(index.field).is_none() {
                    shape.indices.push(IndexShape {
                        field: index.field.to_string(),
                        unique: index.unique,
                    });
                }
            }
        }
    }
    shapes
}

/// Get current schema version from database
pub(crate) fn get_current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending upgrade entries.
///
/// Entries with `version > stored` run in order; each store definition is
/// applied idempotently. Requesting a version below the stored one is a
/// usage error. Returns the number of entries applied.
pub(crate) fn apply_upgrades(
    conn: &Connection,
    requested: u32,
    upgrades: &[SchemaUpgrade],
) -> Result<u32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    let current = get_current_version(conn)?;
    if requested < current {
        return Err(StorageError::VersionRegression {
            stored: current,
            requested,
        });
    }

    let mut applied = 0;
    for upgrade in upgrades {
        if upgrade.version <= current || upgrade.version > requested {
            continue;
        }
        tracing::info!(
            "Applying schema upgrade v{}: {}",
            upgrade.version,
            upgrade.description
        );
        for store in upgrade.stores {
            apply_store(conn, store)?;
        }
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![upgrade.version, Utc::now()],
        )?;
        applied += 1;
    }

    // The stored version always ends at the requested one, even when the
    // final requested version carries no store changes of its own.
    if requested > get_current_version(conn)? {
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![requested, Utc::now()],
        )?;
    }

    Ok(applied)
}

/// Create a store table, or extend an existing one with missing index
/// columns. Index columns are declared without a type so keys keep their
/// native storage class.
fn apply_store(conn: &Connection, store: &StoreDefinition) -> Result<()> {
    let table = quoted(store.name);
    let pk = quoted(store.primary_key);

    if !table_exists(conn, store.name)? {
        let mut columns = vec![
            format!("{pk} NOT NULL PRIMARY KEY"),
            "record TEXT NOT NULL".to_string(),
        ];
        for index in store.indices {
            if index.field != store.primary_key {
                columns.push(quoted(index.field));
            }
        }
        conn.execute_batch(&format!(
            "CREATE TABLE {table} ({});",
            columns.join(", ")
        ))?;
    } else {
        let existing = existing_columns(conn, store.name)?;
        for index in store.indices {
            if existing.iter().any(|c| c == index.field) {
                continue;
            }
            let column = quoted(index.field);
            conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column};"))?;
            // Backfill from the JSON document so records inserted before
            // this index existed stay reachable through it.
            conn.execute(
                &format!(
                    "UPDATE {table} SET {column} = json_extract(record, ?1)"
                ),
                rusqlite::params![format!("$.{}", index.field)],
            )?;
        }
    }

    for index in store.indices {
        if index.field == store.primary_key {
            continue;
        }
        let unique = if index.unique { "UNIQUE " } else { "" };
        let name = quoted(&format!("idx_{}_{}", store.name, index.field));
        conn.execute_batch(&format!(
            "CREATE {unique}INDEX IF NOT EXISTS {name} ON {table} ({});",
            quoted(index.field)
        ))?;
    }

    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        rusqlite::params![name],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
}

fn existing_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quoted(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}
