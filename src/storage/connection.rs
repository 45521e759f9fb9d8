//! Per-thread connection management.
//!
//! Every thread that touches a store gets exactly one SQLite connection,
//! opened lazily on its first operation and reused for every later one.
//! SQLite WAL mode lets these connections read concurrently while writers
//! serialize inside the engine.

use r2d2::ManageConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ToSql};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use super::error::StoreError;

/// Default wait for engine-level locks before an operation reports `Busy`.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of records per multi-row insert in a batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// A connection owned by a single thread.
///
/// The mutex is only ever contended by teardown; the owning thread is the
/// sole user during normal operation.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Hook run once on every freshly opened connection, after pragmas.
pub type ConnectionInit = fn(&Connection) -> Result<(), StoreError>;

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl JournalMode {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
            Self::Truncate => "truncate",
            Self::Memory => "memory",
        }
    }
}

/// SQLite `synchronous` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Off,
    Normal,
    Full,
}

impl SyncMode {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Normal => "normal",
            Self::Full => "full",
        }
    }
}

/// Where SQLite keeps temporary tables and indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempStore {
    Default,
    File,
    Memory,
}

impl TempStore {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Durability/performance settings applied once per connection at open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PragmaConfig {
    pub journal_mode: JournalMode,
    pub synchronous: SyncMode,
    /// Page cache size (`cache_size` pragma; negative values are KiB).
    pub cache_size: i64,
    pub temp_store: TempStore,
    /// Memory-mapped I/O window in bytes, left at the engine default when `None`.
    pub mmap_size: Option<i64>,
}

impl Default for PragmaConfig {
    fn default() -> Self {
        Self {
            journal_mode: JournalMode::Wal,
            synchronous: SyncMode::Normal,
            cache_size: 10_000,
            temp_store: TempStore::Memory,
            mmap_size: None,
        }
    }
}

/// Outcome of applying a [`PragmaConfig`] to one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PragmaReport {
    pub applied: Vec<&'static str>,
    pub failed: Vec<&'static str>,
    /// Journal mode the engine actually adopted (in-memory databases report `memory`).
    pub journal_mode: Option<String>,
}

impl PragmaConfig {
    /// Apply every setting in order.
    ///
    /// A failing setting is logged and skipped; the connection stays usable
    /// with the engine default for that setting.
    pub fn apply(&self, conn: &Connection) -> PragmaReport {
        let mut report = PragmaReport::default();

        match conn.pragma_update_and_check(
            None,
            "journal_mode",
            self.journal_mode.pragma_value(),
            |row| row.get::<_, String>(0),
        ) {
            Ok(mode) => {
                if mode != self.journal_mode.pragma_value() {
                    tracing::debug!(
                        requested = self.journal_mode.pragma_value(),
                        effective = %mode,
                        "Journal mode differs from requested"
                    );
                }
                report.journal_mode = Some(mode);
                report.applied.push("journal_mode");
            }
            Err(e) => record_failure(&mut report, "journal_mode", &e),
        }

        let synchronous = self.synchronous.pragma_value();
        let temp_store = self.temp_store.pragma_value();
        let ordered: [(&'static str, &dyn ToSql); 3] = [
            ("synchronous", &synchronous),
            ("cache_size", &self.cache_size),
            ("temp_store", &temp_store),
        ];
        for (name, value) in ordered {
            match conn.pragma_update(None, name, value) {
                Ok(()) => report.applied.push(name),
                Err(e) => record_failure(&mut report, name, &e),
            }
        }

        if let Some(bytes) = self.mmap_size {
            match conn.pragma_update_and_check(None, "mmap_size", bytes, |row| row.get::<_, i64>(0))
            {
                Ok(_) => report.applied.push("mmap_size"),
                Err(e) => record_failure(&mut report, "mmap_size", &e),
            }
        }

        report
    }
}

fn record_failure(report: &mut PragmaReport, name: &'static str, err: &rusqlite::Error) {
    tracing::warn!(pragma = name, error = %err, "Failed to apply pragma, continuing with engine default");
    report.failed.push(name);
}

/// Backing database for a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// A database file on disk.
    File(PathBuf),
    /// A named shared-cache in-memory database, visible to every connection
    /// of the store and discarded when the store is dropped.
    Memory(String),
}

impl StoreTarget {
    /// A fresh in-memory target with a unique name.
    pub fn ephemeral() -> Self {
        Self::Memory(format!("memstore-{}", crate::generate_id()))
    }

    /// File path, if this target lives on disk.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Memory(_) => None,
        }
    }

    fn connection_factory(&self) -> SqliteConnectionManager {
        match self {
            Self::File(path) => SqliteConnectionManager::file(path),
            // Default open flags include SQLITE_OPEN_URI.
            Self::Memory(name) => {
                SqliteConnectionManager::file(format!("file:{name}?mode=memory&cache=shared"))
            }
        }
    }
}

/// Store-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Bounded wait for engine-level locks.
    pub busy_timeout: Duration,
    pub pragmas: PragmaConfig,
    /// Records per multi-row insert when a batch size is not given.
    pub default_batch_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            pragmas: PragmaConfig::default(),
            default_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Tracks one connection per thread for a single store.
///
/// The map lock is held only to look up, insert or remove a handle, never
/// while a statement runs.
///
/// An in-memory target also keeps a private anchor connection, never handed
/// out, so its contents live as long as the manager rather than as long as
/// some thread happens to hold a handle.
pub struct ConnectionManager {
    target: StoreTarget,
    factory: SqliteConnectionManager,
    options: StoreOptions,
    init: Option<ConnectionInit>,
    connections: Mutex<HashMap<ThreadId, SharedConnection>>,
    anchor: Mutex<Option<Connection>>,
    acquisitions: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager. No connection is opened until first use.
    pub fn new(target: StoreTarget, options: StoreOptions) -> Self {
        Self {
            factory: target.connection_factory(),
            target,
            options,
            init: None,
            connections: Mutex::new(HashMap::new()),
            anchor: Mutex::new(None),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Run `init` on every new connection after pragmas are applied.
    #[must_use]
    pub fn with_initializer(mut self, init: ConnectionInit) -> Self {
        self.init = Some(init);
        self
    }

    pub fn target(&self) -> &StoreTarget {
        &self.target
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Get the calling thread's connection, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing database cannot be opened or the
    /// connection initializer fails. Pragma failures are not errors.
    pub fn get_connection(&self) -> Result<SharedConnection, StoreError> {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        let thread_id = thread::current().id();

        if let Some(conn) = self.lock_map().get(&thread_id) {
            return Ok(Arc::clone(conn));
        }

        // Open outside the map lock; only this thread can insert its own entry.
        let conn = Arc::new(Mutex::new(self.open()?));
        self.lock_map().insert(thread_id, Arc::clone(&conn));
        tracing::debug!(thread = ?thread_id, target = ?self.target, "Opened connection");
        Ok(conn)
    }

    /// Run `f` against the calling thread's connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let shared = self.get_connection()?;
        let mut conn = shared.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut conn)
    }

    /// Close and forget the calling thread's connection.
    ///
    /// Returns `true` if the thread had a connection. Other threads are unaffected.
    pub fn close_for_current_thread(&self) -> bool {
        let thread_id = thread::current().id();
        let removed = self.lock_map().remove(&thread_id);
        match removed {
            Some(conn) => {
                close_connection(thread_id, conn);
                true
            }
            None => false,
        }
    }

    /// Close every tracked connection.
    ///
    /// Intended for shutdown, once worker threads have finished. A handle
    /// still borrowed by a running operation is released when that
    /// operation completes. The anchor of an in-memory target stays open
    /// until the manager is dropped, so later operations see the same data.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(ThreadId, SharedConnection)> = self.lock_map().drain().collect();
        let count = drained.len();
        for (thread_id, conn) in drained {
            close_connection(thread_id, conn);
        }
        if count > 0 {
            tracing::debug!(count, "Closed all connections");
        }
        count
    }

    /// Number of live per-thread connections.
    pub fn open_connections(&self) -> usize {
        self.lock_map().len()
    }

    /// Total `get_connection` calls since creation.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Probe the calling thread's connection.
    pub fn is_healthy(&self) -> bool {
        let Ok(shared) = self.get_connection() else {
            return false;
        };
        let mut conn = shared.lock().unwrap_or_else(PoisonError::into_inner);
        self.factory.is_valid(&mut conn).is_ok()
    }

    fn open(&self) -> Result<Connection, StoreError> {
        if matches!(self.target, StoreTarget::Memory(_)) {
            self.ensure_anchor()?;
        }
        let conn = self.factory.connect()?;
        conn.busy_timeout(self.options.busy_timeout)?;
        let report = self.options.pragmas.apply(&conn);
        if !report.failed.is_empty() {
            tracing::warn!(failed = ?report.failed, "Connection opened with default settings for some pragmas");
        }
        if let Some(init) = self.init {
            init(&conn)?;
        }
        Ok(conn)
    }

    fn ensure_anchor(&self) -> Result<(), StoreError> {
        let mut anchor = self.anchor.lock().unwrap_or_else(PoisonError::into_inner);
        if anchor.is_none() {
            *anchor = Some(self.factory.connect()?);
            tracing::debug!(target = ?self.target, "Anchored in-memory database");
        }
        Ok(())
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<ThreadId, SharedConnection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_all();
        let anchor = self
            .anchor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = anchor {
            if let Err((_conn, e)) = conn.close() {
                tracing::error!(target = ?self.target, error = %e, "Error closing in-memory anchor");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.target)
            .field("open_connections", &self.open_connections())
            .finish_non_exhaustive()
    }
}

/// Close a connection, logging rather than raising teardown errors.
fn close_connection(thread_id: ThreadId, conn: SharedConnection) {
    match Arc::try_unwrap(conn) {
        Ok(mutex) => {
            let conn = mutex.into_inner().unwrap_or_else(PoisonError::into_inner);
            if let Err((_conn, e)) = conn.close() {
                tracing::error!(thread = ?thread_id, error = %e, "Error closing connection");
            } else {
                tracing::debug!(thread = ?thread_id, "Closed connection");
            }
        }
        // Still held by an in-flight operation; it closes on last release.
        Err(_) => tracing::debug!(thread = ?thread_id, "Connection in use, closing on release"),
    }
}
