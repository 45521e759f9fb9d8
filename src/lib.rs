//! Memstore: a thread-safe embedded record store over SQLite.
//!
//! Memstore backs the biographical and air-quality "memory" subsystems with
//! keyed upsert, bulk-load, field-level retrieval and throughput
//! self-measurement on top of a single SQLite file in WAL mode.
//!
//! # Architecture
//!
//! - **Per-thread connections**: every worker thread lazily opens exactly one
//!   connection, configured once with durability/performance pragmas
//! - **Atomic upsert**: `INSERT OR REPLACE` keyed by the unique record name
//! - **All-or-nothing batches**: chunked multi-row inserts inside one transaction
//! - **Self-measuring**: operation rates recorded per run and compared across runs
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration for the benchmark binary
//! - [`observability`]: Tracing and metrics setup
//! - [`perf`]: Performance recorder and run history
//! - [`storage`]: SQLite persistence layer
//! - [`workload`]: Benchmark workload driving the store

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // storage::store::StoreError is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::cast_precision_loss,        // Rates are approximate by nature
    clippy::too_many_lines              // Some functions are inherently long
)]

pub mod config;
pub mod observability;
pub mod perf;
pub mod storage;
pub mod workload;

pub use perf::{OperationKind, PerformanceRecorder};
pub use storage::{
    Field, FieldMap, FieldValue, Reading, Record, Store, StoreError, StoreOptions, StoreTarget,
};

use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable) identifier.
///
/// Used for performance run ids and for naming shared in-memory databases.
///
/// # Example
///
/// ```
/// let id = memstore::generate_id();
/// assert!(id.len() == 36); // UUID string format
/// ```
#[must_use]
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Get the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock reads earlier than the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
