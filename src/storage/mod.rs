//! SQLite storage layer for memstore.
//!
//! Provides:
//! - Per-thread connection management with WAL pragmas
//! - Idempotent schema initialization
//! - Keyed record upsert, retrieval and chunked batch loads
//! - Air-quality reading log
//! - Online backup and restore

pub mod batch;
pub mod connection;
pub mod error;
pub mod readings;
pub mod record;
pub mod schema;
pub mod store;

pub use connection::{
    ConnectionManager, JournalMode, PragmaConfig, PragmaReport, SharedConnection, StoreOptions,
    StoreTarget, SyncMode, TempStore, DEFAULT_BATCH_SIZE, DEFAULT_BUSY_TIMEOUT,
};
pub use error::StoreError;
pub use readings::Reading;
pub use record::{Field, FieldMap, FieldValue, Record};
pub use store::Store;
