//! Chunking and statement building for bulk operations.
//!
//! A bulk load is split into chunks so that no single statement exceeds
//! SQLite's bound-parameter ceiling or grows without limit in memory:
//! - One multi-row `INSERT OR REPLACE` per chunk
//! - All chunks share one transaction, so chunk boundaries are invisible
//! - Lookups by key use a single `IN (...)` list per chunk

use super::record::Field;
use super::schema::RECORD_TABLE;

/// Bound-parameter ceiling of the bundled SQLite (`SQLITE_MAX_VARIABLE_NUMBER`).
pub const MAX_BOUND_PARAMETERS: usize = 32_766;

/// Largest chunk that fits in one statement with every column bound.
pub const MAX_ROWS_PER_STATEMENT: usize = MAX_BOUND_PARAMETERS / Field::ALL.len();

/// Chunk sizing for a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Records per multi-row statement.
    pub chunk_size: usize,
}

impl BatchConfig {
    /// Normalize a requested batch size.
    ///
    /// Zero is treated as one; sizes above [`MAX_ROWS_PER_STATEMENT`] are
    /// capped.
    pub fn new(requested: usize) -> Self {
        let chunk_size = requested.clamp(1, MAX_ROWS_PER_STATEMENT);
        if chunk_size != requested {
            tracing::debug!(requested, chunk_size, "Adjusted batch size");
        }
        Self { chunk_size }
    }

    /// Number of statements needed for `total` records.
    pub fn chunk_count(&self, total: usize) -> usize {
        total.div_ceil(self.chunk_size)
    }
}

/// `(?, ?, ...)` with `width` placeholders.
fn row_placeholders(width: usize) -> String {
    let mut row = String::with_capacity(width * 3 + 2);
    row.push('(');
    for i in 0..width {
        if i > 0 {
            row.push_str(", ");
        }
        row.push('?');
    }
    row.push(')');
    row
}

/// Comma-separated column list for the record table, key first.
pub fn column_list() -> String {
    Field::ALL
        .iter()
        .map(|field| field.column())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Multi-row upsert for `rows` records.
///
/// Parameters are bound row-major in [`Field::ALL`] order.
pub fn upsert_sql(rows: usize) -> String {
    let row = row_placeholders(Field::ALL.len());
    let values = vec![row; rows.max(1)].join(", ");
    format!(
        "INSERT OR REPLACE INTO {RECORD_TABLE} ({}) VALUES {values}",
        column_list()
    )
}

/// `SELECT name, rowid` for `keys` names, used to report assigned ids.
pub fn rowid_lookup_sql(keys: usize) -> String {
    format!(
        "SELECT name, rowid FROM {RECORD_TABLE} WHERE name IN {}",
        row_placeholders(keys.max(1))
    )
}

/// Full-record select for `keys` names.
pub fn record_lookup_sql(keys: usize) -> String {
    format!(
        "SELECT {} FROM {RECORD_TABLE} WHERE name IN {}",
        column_list(),
        row_placeholders(keys.max(1))
    )
}
