//! Transaction Gateway
//!
//! Owns the database lifecycle (closed, opening, open) and hands out
//! scoped transactions over the stores declared by the schema upgrades.
//! SQLite work runs on the blocking pool; callers stay async.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use directories::ProjectDirs;
use rusqlite::Connection;

use super::query::StoreTransaction;
use super::schema::{self, SchemaUpgrade, StoreShape};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A handle is already open
    #[error("Database already open")]
    AlreadyOpen,
    /// An open attempt is already in flight
    #[error("Database already being opened")]
    AlreadyOpening,
    /// Operation requires an open handle
    #[error("Database not open")]
    NotOpen,
    /// Operation arrived while the handle was still being established
    #[error("Database not ready")]
    NotReady,
    /// Deletion refused while a connection holds the database
    #[error("Database deletion blocked by an open connection")]
    DeleteBlocked,
    /// Store name not declared by the applied schema
    #[error("Unknown object store: {0}")]
    UnknownStore(String),
    /// Index name not declared on the store
    #[error("Unknown index: {store}.{index}")]
    UnknownIndex {
        /// Store name
        store: String,
        /// Requested index field
        index: String,
    },
    /// Requested schema version is older than the stored one
    #[error("Requested schema version {requested} is below stored version {stored}")]
    VersionRegression {
        /// Version recorded in the database
        stored: u32,
        /// Version the caller asked for
        requested: u32,
    },
    /// Write issued through a read-only transaction
    #[error("Write attempted in a read-only transaction")]
    ReadOnlyTransaction,
    /// Lookup submitted without any key fields
    #[error("Empty lookup: no key fields provided")]
    EmptyQuery,
    /// Record key missing or not a supported key type
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Record (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
    /// Blocking storage task failed to complete
    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// MODES
// ============================================================================

/// Transaction access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only; runs on the reader connection
    ReadOnly,
    /// Reads and writes; runs on the writer connection
    ReadWrite,
}

/// Strategy for range scans.
///
/// Both strategies issue the same statement in the same key order; they
/// differ only in how rows are collected. The stepping loop exists for
/// hosts where collecting an unbounded result set at once is not viable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Collect the whole result set through one prepared statement
    BulkFetch,
    /// Step the cursor row by row until exhausted
    Cursor,
}

impl ScanMode {
    /// Pick a strategy for the linked SQLite library
    pub fn detect() -> Self {
        if rusqlite::version_number() >= 3_008_000 {
            ScanMode::BulkFetch
        } else {
            ScanMode::Cursor
        }
    }
}

// ============================================================================
// DATABASE
// ============================================================================

enum Lifecycle {
    Closed,
    Opening,
    Open(Arc<DbHandle>),
}

struct DbHandle {
    name: String,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    shapes: Arc<HashMap<String, StoreShape>>,
}

/// Async gateway to one SQLite database.
///
/// Constructed once and injected into everything that needs storage.
/// Uses separate reader/writer connections behind mutexes, so all methods
/// take `&self` and the gateway can be shared as `Arc<Database>`.
pub struct Database {
    root: Option<PathBuf>,
    scan_mode: ScanMode,
    state: Mutex<Lifecycle>,
}

// Resets a half-finished open back to closed if the owning future is
// dropped before the handle is established.
struct OpeningGuard<'a> {
    state: &'a Mutex<Lifecycle>,
    armed: bool,
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut state) = self.state.lock() {
                *state = Lifecycle::Closed;
            }
        }
    }
}

impl Database {
    /// Create a gateway rooted at `root`, or at the platform data
    /// directory when `None`.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self::with_scan_mode(root, ScanMode::detect())
    }

    /// Create a gateway with an explicit scan strategy
    pub fn with_scan_mode(root: Option<PathBuf>, scan_mode: ScanMode) -> Self {
        Self {
            root,
            scan_mode,
            state: Mutex::new(Lifecycle::Closed),
        }
    }

    /// Scan strategy this gateway hands to its transactions
    pub fn scan_mode(&self) -> ScanMode {
        self.scan_mode
    }

    /// Apply PRAGMAs and optional encryption to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        // Apply encryption key if SQLCipher is enabled and key is provided
        #[cfg(feature = "encryption")]
        {
            if let Ok(key) = std::env::var("KOTOBA_ENCRYPTION_KEY") {
                if !key.is_empty() {
                    conn.pragma_update(None, "key", &key)?;
                }
            }
        }

        // Configure SQLite for performance
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        Ok(())
    }

    /// Resolve the on-disk path for a database name
    fn database_path(&self, name: &str) -> Result<PathBuf> {
        let dir = match &self.root {
            Some(root) => root.clone(),
            None => {
                let proj_dirs = ProjectDirs::from("com", "kotoba", "core").ok_or_else(|| {
                    StorageError::Init("Could not determine project directories".to_string())
                })?;
                proj_dirs.data_dir().to_path_buf()
            }
        };
        std::fs::create_dir_all(&dir)?;
        // Restrict directory permissions to owner-only on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(&dir, perms);
        }
        Ok(dir.join(format!("{name}.db")))
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, Lifecycle>> {
        self.state
            .lock()
            .map_err(|_| StorageError::Init("State lock poisoned".to_string()))
    }

    fn handle(&self) -> Result<Arc<DbHandle>> {
        let state = self.lock_state()?;
        match &*state {
            Lifecycle::Open(handle) => Ok(Arc::clone(handle)),
            Lifecycle::Opening => Err(StorageError::NotReady),
            Lifecycle::Closed => Err(StorageError::NotOpen),
        }
    }

    /// True when a handle is open
    pub fn is_open(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(&*state, Lifecycle::Open(_)))
            .unwrap_or(false)
    }

    /// True while an open attempt is in flight
    pub fn is_opening(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(&*state, Lifecycle::Opening))
            .unwrap_or(false)
    }

    /// Open the named database at `version`, applying any pending schema
    /// upgrades. Fails if a handle is already open or being opened; on any
    /// establishment failure the state returns to closed.
    pub async fn open(&self, name: &str, version: u32, upgrades: &[SchemaUpgrade]) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            match &*state {
                Lifecycle::Open(_) => return Err(StorageError::AlreadyOpen),
                Lifecycle::Opening => return Err(StorageError::AlreadyOpening),
                Lifecycle::Closed => *state = Lifecycle::Opening,
            }
        }
        let mut reset = OpeningGuard {
            state: &self.state,
            armed: true,
        };

        let result = self.establish(name, version, upgrades).await;
        let outcome = {
            let mut state = self.lock_state()?;
            match result {
                Ok(handle) => {
                    *state = Lifecycle::Open(Arc::new(handle));
                    Ok(())
                }
                Err(err) => {
                    *state = Lifecycle::Closed;
                    Err(err)
                }
            }
        };
        reset.armed = false;
        outcome
    }

    async fn establish(
        &self,
        name: &str,
        version: u32,
        upgrades: &[SchemaUpgrade],
    ) -> Result<DbHandle> {
        let path = self.database_path(name)?;
        let name = name.to_string();
        let upgrades = upgrades.to_vec();

        tokio::task::spawn_blocking(move || {
            let writer = Connection::open(&path)?;

            // Restrict database file permissions to owner-only on Unix
            #[cfg(unix)]
            if path.exists() {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o600);
                let _ = std::fs::set_permissions(&path, perms);
            }

            Self::configure_connection(&writer)?;
            schema::apply_upgrades(&writer, version, &upgrades)?;

            let reader = Connection::open(&path)?;
            Self::configure_connection(&reader)?;

            tracing::debug!(name, path = %path.display(), version, "Opened database");
            Ok(DbHandle {
                name,
                writer: Mutex::new(writer),
                reader: Mutex::new(reader),
                shapes: Arc::new(schema::effective_shapes(&upgrades, version)),
            })
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Close the open handle.
    ///
    /// In-flight transactions keep their connections alive until they
    /// finish; new transactions are refused immediately.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        match &*state {
            Lifecycle::Open(handle) => {
                tracing::debug!(name = %handle.name, "Closed database");
                *state = Lifecycle::Closed;
                Ok(())
            }
            _ => Err(StorageError::NotOpen),
        }
    }

    /// Run `work` inside one transaction scoped to `store_names`.
    ///
    /// Returning `Ok` commits; returning `Err` rolls the transaction back
    /// and surfaces that first error to the caller.
    pub async fn transaction<T, F, S>(
        &self,
        store_names: &[S],
        mode: TransactionMode,
        work: F,
    ) -> Result<T>
    where
        F: FnOnce(&StoreTransaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
        S: AsRef<str>,
    {
        let handle = self.handle()?;
        let mut allowed = HashSet::with_capacity(store_names.len());
        for name in store_names {
            let name = name.as_ref();
            if !handle.shapes.contains_key(name) {
                return Err(StorageError::UnknownStore(name.to_string()));
            }
            allowed.insert(name.to_string());
        }

        let scan_mode = self.scan_mode;
        tokio::task::spawn_blocking(move || {
            let conn = match mode {
                TransactionMode::ReadOnly => &handle.reader,
                TransactionMode::ReadWrite => &handle.writer,
            };
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Init("Connection lock poisoned".to_string()))?;
            let tx = guard.transaction()?;
            let scoped = StoreTransaction::new(tx, Arc::clone(&handle.shapes), allowed, mode, scan_mode);
            let value = work(&scoped)?;
            scoped.commit()?;
            Ok(value)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Delete the named database from disk.
    ///
    /// Fails with [`StorageError::DeleteBlocked`] while this gateway holds
    /// the database open, or when another connection still does.
    pub async fn delete_database(&self, name: &str) -> Result<()> {
        {
            let state = self.lock_state()?;
            match &*state {
                Lifecycle::Open(handle) if handle.name == name => {
                    return Err(StorageError::DeleteBlocked);
                }
                Lifecycle::Opening => return Err(StorageError::DeleteBlocked),
                _ => {}
            }
        }

        let path = self.database_path(name)?;
        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                // Deleting a database that never existed succeeds.
                return Ok(());
            }

            // Probe for other holders: an exclusive lock attempt with no
            // busy wait fails fast when any writer is still attached.
            let probe = Connection::open(&path)?;
            probe.pragma_update(None, "busy_timeout", 0)?;
            match probe.execute_batch("BEGIN IMMEDIATE; COMMIT;") {
                Ok(()) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::DatabaseBusy
                        || e.code == rusqlite::ErrorCode::DatabaseLocked =>
                {
                    return Err(StorageError::DeleteBlocked);
                }
                Err(e) => return Err(e.into()),
            }
            drop(probe);

            std::fs::remove_file(&path)?;
            for suffix in ["-wal", "-shm"] {
                let mut sidecar = path.clone().into_os_string();
                sidecar.push(suffix);
                let sidecar = PathBuf::from(sidecar);
                if sidecar.exists() {
                    std::fs::remove_file(&sidecar)?;
                }
            }
            tracing::debug!(path = %path.display(), "Deleted database");
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}
