//! Storage Module
//!
//! Async, transactional, indexed record storage on SQLite:
//! - Versioned, idempotent schema upgrades over declarative store descriptors
//! - Scoped read/readwrite transactions with open/close lifecycle enforcement
//! - Range scans, first-match lookups, positional count batches
//! - All-or-nothing bulk deletes with per-key progress

mod database;
mod query;
mod schema;

pub use database::{Database, Result, ScanMode, StorageError, TransactionMode};
pub use query::{CountTarget, DeleteProgress, Key, KeyFilter, KeyRange, StoreTransaction};
pub use schema::{IndexDefinition, IndexShape, SchemaUpgrade, StoreDefinition, StoreShape};
