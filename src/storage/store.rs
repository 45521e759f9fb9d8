//! Record store: keyed upsert, field retrieval and bulk operations.
//!
//! Every call runs on the calling thread's own connection and blocks for
//! the duration of its transaction. Upserts rely on `INSERT OR REPLACE`
//! so concurrent writers never race through a read-modify-write.

use rusqlite::types::ToSql;
use rusqlite::{Connection, DatabaseName, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::batch::{self, BatchConfig, MAX_BOUND_PARAMETERS};
use super::connection::{ConnectionManager, SharedConnection, StoreOptions, StoreTarget};
use super::error::StoreError;
use super::readings::{self, Reading};
use super::record::{is_valid_key, Field, FieldMap, FieldValue, Record, NULL_VALUE};
use super::schema::{self, RECORD_TABLE};
use crate::observability::metrics::{record_busy, record_operation, record_rows_written};
use crate::perf::{rate_per_second, OperationKind, PerformanceRecorder};

/// Thread-safe handle to one record database.
///
/// Share it between threads by reference or behind an `Arc`; each thread
/// transparently gets its own connection.
#[derive(Debug)]
pub struct Store {
    connections: ConnectionManager,
    recorder: Option<Arc<PerformanceRecorder>>,
}

impl Store {
    /// Open (or create) a store backed by the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IoFailure`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_options(
            StoreTarget::File(path.as_ref().to_path_buf()),
            StoreOptions::default(),
        )
    }

    /// Open a fresh ephemeral in-memory store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open_with_options(StoreTarget::ephemeral(), StoreOptions::default())
    }

    /// Open a store with explicit options.
    ///
    /// The calling thread's connection is opened eagerly so that an
    /// unusable target fails here rather than on first use.
    pub fn open_with_options(target: StoreTarget, options: StoreOptions) -> Result<Self, StoreError> {
        let connections =
            ConnectionManager::new(target, options).with_initializer(schema::ensure_schema);
        connections.get_connection()?;
        tracing::info!(target = ?connections.target(), "Store opened");
        Ok(Self {
            connections,
            recorder: None,
        })
    }

    /// Report operation rates to `recorder`.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<PerformanceRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn target(&self) -> &StoreTarget {
        self.connections.target()
    }

    /// The per-thread connection manager.
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// The calling thread's connection.
    pub fn get_connection(&self) -> Result<SharedConnection, StoreError> {
        self.connections.get_connection()
    }

    /// Insert or fully replace the record keyed by `name`.
    ///
    /// Fields missing from `fields` are written as NULL; nothing from a
    /// previous version of the record survives.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidKey`] for an empty name (no engine call is made),
    /// otherwise any classified engine error.
    pub fn store(&self, name: &str, fields: &FieldMap) -> Result<(), StoreError> {
        if !is_valid_key(name) {
            return Err(StoreError::InvalidKey { index: None });
        }
        let started = Instant::now();
        let result = self.connections.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&batch::upsert_sql(1))?;
            let mut params: Vec<&dyn ToSql> = Vec::with_capacity(Field::ALL.len());
            params.push(&name);
            for field in Field::DATA {
                params.push(fields.get(&field).unwrap_or(&NULL_VALUE));
            }
            stmt.execute(params.as_slice())?;
            Ok(())
        });
        self.observe(OperationKind::Insert, 1, None, started.elapsed(), &result);
        if result.is_ok() {
            tracing::debug!(name, "Stored record");
        }
        result
    }

    /// Store a [`Record`] by its own key.
    pub fn store_record(&self, record: &Record) -> Result<(), StoreError> {
        self.store(&record.name, &record.fields)
    }

    /// Read one field of the record keyed by `name`.
    ///
    /// Returns `Ok(None)` when no such record exists and
    /// `Ok(Some(FieldValue::Null))` when it exists with the field unset.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidField`] for a name outside the schema, raised
    /// before any connection is touched.
    pub fn retrieve(&self, name: &str, field: &str) -> Result<Option<FieldValue>, StoreError> {
        let field: Field = field.parse().inspect_err(|_| {
            tracing::error!(field, "Retrieve rejected: invalid field");
        })?;
        self.get(name, field)
    }

    /// Typed form of [`Store::retrieve`].
    pub fn get(&self, name: &str, field: Field) -> Result<Option<FieldValue>, StoreError> {
        let started = Instant::now();
        let result = self.connections.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM {RECORD_TABLE} WHERE name = ?1",
                field.column()
            ))?;
            Ok(stmt
                .query_row([name], |row| row.get::<_, FieldValue>(0))
                .optional()?)
        });
        self.observe(OperationKind::Retrieve, 1, None, started.elapsed(), &result);
        result
    }

    /// Bulk upsert with the configured default batch size.
    pub fn batch_store_default(&self, records: &[Record]) -> Result<Vec<i64>, StoreError> {
        self.batch_store(records, self.connections.options().default_batch_size)
    }

    /// Bulk upsert, all or nothing.
    ///
    /// Every key is validated before the engine is touched. Records are
    /// written in chunks of `batch_size` inside one transaction. Returns
    /// the row id of each input record, in input order; when a key repeats
    /// within the batch the last occurrence wins and every occurrence
    /// reports the surviving row.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidKey`] carrying the position of the first bad
    /// record, or the first engine error (the transaction is rolled back).
    pub fn batch_store(&self, records: &[Record], batch_size: usize) -> Result<Vec<i64>, StoreError> {
        if let Some(index) = records.iter().position(|r| !r.has_valid_key()) {
            tracing::error!(index, "Batch store rejected: invalid key");
            return Err(StoreError::InvalidKey { index: Some(index) });
        }
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let config = BatchConfig::new(batch_size);
        let started = Instant::now();
        let result = self
            .connections
            .with_connection(|conn| write_batch(conn, records, config));
        let elapsed = started.elapsed();
        self.observe(
            OperationKind::BatchInsert,
            records.len(),
            Some(config.chunk_size),
            elapsed,
            &result,
        );
        match &result {
            Ok(_) => {
                record_rows_written(records.len());
                tracing::debug!(
                    records = records.len(),
                    chunks = config.chunk_count(records.len()),
                    rate = rate_per_second(records.len(), elapsed),
                    "Batch stored"
                );
            }
            Err(e) => tracing::error!(error = %e, records = records.len(), "Batch store failed"),
        }
        result
    }

    /// Fetch the records for `keys`, silently omitting keys with no match.
    ///
    /// Results follow the order in which keys first appear.
    pub fn batch_retrieve<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Record>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let result = self.connections.with_connection(|conn| {
            let mut found: HashMap<String, Record> = HashMap::new();
            for chunk in keys.chunks(MAX_BOUND_PARAMETERS) {
                let mut stmt = conn.prepare(&batch::record_lookup_sql(chunk.len()))?;
                let rows = stmt.query_map(
                    rusqlite::params_from_iter(chunk.iter().map(AsRef::as_ref)),
                    record_from_row,
                )?;
                for row in rows {
                    let record = row?;
                    found.insert(record.name.clone(), record);
                }
            }
            Ok(keys
                .iter()
                .filter_map(|key| found.remove(key.as_ref()))
                .collect::<Vec<_>>())
        });
        self.observe(
            OperationKind::BatchRetrieve,
            keys.len(),
            None,
            started.elapsed(),
            &result,
        );
        result
    }

    /// Every record, in insertion (row id) order.
    pub fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        let started = Instant::now();
        let result = self.connections.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM {RECORD_TABLE} ORDER BY rowid ASC",
                batch::column_list()
            ))?;
            let records = stmt
                .query_map([], record_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        });
        let count = result.as_ref().map_or(0, Vec::len);
        self.observe(OperationKind::Query, count.max(1), None, started.elapsed(), &result);
        result
    }

    /// Every record name, sorted.
    pub fn list_names(&self) -> Result<Vec<String>, StoreError> {
        self.connections.with_connection(|conn| {
            let mut stmt =
                conn.prepare_cached(&format!("SELECT name FROM {RECORD_TABLE} ORDER BY name ASC"))?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize, StoreError> {
        self.connections.with_connection(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {RECORD_TABLE}"), [], |row| {
                    row.get(0)
                })?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    /// Delete every record.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let removed = self
            .connections
            .with_connection(|conn| Ok(conn.execute(&format!("DELETE FROM {RECORD_TABLE}"), [])?))?;
        tracing::info!(removed, "Cleared records");
        Ok(removed)
    }

    /// Rebuild the database file to reclaim free pages.
    ///
    /// Expensive and exclusive: it blocks every writer for its duration.
    /// Maintenance only, never on a hot path.
    pub fn vacuum(&self) -> Result<(), StoreError> {
        let started = Instant::now();
        self.connections
            .with_connection(|conn| Ok(conn.execute_batch("VACUUM")?))?;
        tracing::info!(elapsed_ms = started.elapsed().as_millis(), "Vacuum complete");
        Ok(())
    }

    /// Database size in bytes (`page_count * page_size`).
    pub fn size_bytes(&self) -> Result<u64, StoreError> {
        self.connections.with_connection(|conn| {
            let bytes: i64 = conn.query_row(
                "SELECT page_count * page_size FROM pragma_page_count, pragma_page_size",
                [],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(bytes).unwrap_or(0))
        })
    }

    /// Whether the record table exists.
    pub fn verify(&self) -> Result<bool, StoreError> {
        self.connections
            .with_connection(|conn| schema::schema_exists(conn))
    }

    /// Copy the live database to `dest` using SQLite's online backup.
    pub fn backup_to(&self, dest: impl AsRef<Path>) -> Result<(), StoreError> {
        let dest = dest.as_ref();
        self.connections
            .with_connection(|conn| Ok(conn.backup(DatabaseName::Main, dest, None)?))?;
        tracing::info!(dest = %dest.display(), "Backup created");
        Ok(())
    }

    /// Replace the database contents with the backup at `src`.
    ///
    /// Other threads observe the restored contents on their next statement.
    pub fn restore_from(&self, src: impl AsRef<Path>) -> Result<(), StoreError> {
        let src = src.as_ref();
        if !src.is_file() {
            return Err(StoreError::IoFailure(format!(
                "backup not found: {}",
                src.display()
            )));
        }
        self.connections.with_connection(|conn| {
            Ok(conn.restore(DatabaseName::Main, src, None::<fn(rusqlite::backup::Progress)>)?)
        })?;
        tracing::info!(src = %src.display(), "Restored from backup");
        Ok(())
    }

    /// Append an air-quality reading, returning its id.
    ///
    /// # Errors
    ///
    /// [`StoreError::IntegrityViolation`] when a schema constraint rejects it.
    pub fn store_reading(&self, reading: &Reading) -> Result<i64, StoreError> {
        let result = self
            .connections
            .with_connection(|conn| readings::insert_reading(conn, reading));
        if let Err(e) = &result {
            tracing::error!(error = %e, location = %reading.location, "Store reading failed");
        }
        result
    }

    /// Readings between two timestamps (inclusive; either bound optional).
    pub fn readings_between(
        &self,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<Reading>, StoreError> {
        self.connections
            .with_connection(|conn| readings::readings_between(conn, start, end))
    }

    /// Most recent reading for `location`.
    pub fn latest_reading(&self, location: &str) -> Result<Option<Reading>, StoreError> {
        self.connections
            .with_connection(|conn| readings::latest_reading(conn, location))
    }

    /// Close the calling thread's connection. Other threads are unaffected.
    pub fn close_for_current_thread(&self) -> bool {
        self.connections.close_for_current_thread()
    }

    /// Probe the calling thread's connection.
    pub fn is_healthy(&self) -> bool {
        self.connections.is_healthy()
    }

    /// Close every connection and consume the store.
    ///
    /// Dropping a store has the same effect without the log line.
    pub fn close(self) {
        let closed = self.connections.close_all();
        tracing::info!(closed, "Store closed");
    }

    fn observe<T>(
        &self,
        kind: OperationKind,
        count: usize,
        batch_size: Option<usize>,
        elapsed: Duration,
        result: &Result<T, StoreError>,
    ) {
        match result {
            Ok(_) => {
                record_operation(kind, elapsed.as_secs_f64());
                if let Some(recorder) = &self.recorder {
                    recorder.log(kind, rate_per_second(count, elapsed), batch_size);
                }
            }
            Err(StoreError::Busy(_)) => record_busy(kind),
            Err(_) => {}
        }
    }
}

/// Write all records in one immediate transaction, one statement per chunk.
fn write_batch(
    conn: &mut Connection,
    records: &[Record],
    config: BatchConfig,
) -> Result<Vec<i64>, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut ids = Vec::with_capacity(records.len());

    for chunk in records.chunks(config.chunk_size) {
        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * Field::ALL.len());
        for record in chunk {
            params.push(&record.name);
            for field in Field::DATA {
                params.push(record.value(field));
            }
        }
        tx.execute(&batch::upsert_sql(chunk.len()), params.as_slice())?;

        let mut stmt = tx.prepare(&batch::rowid_lookup_sql(chunk.len()))?;
        let assigned: HashMap<String, i64> = stmt
            .query_map(
                rusqlite::params_from_iter(chunk.iter().map(|r| r.name.as_str())),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?
            .collect::<Result<_, _>>()?;
        for record in chunk {
            let id = assigned.get(&record.name).copied().ok_or_else(|| {
                StoreError::Database(format!("no row id for stored record {:?}", record.name))
            })?;
            ids.push(id);
        }
    }

    // A later chunk may have replaced a row written by an earlier one.
    if config.chunk_count(records.len()) > 1 {
        let last: HashMap<&str, i64> = records
            .iter()
            .zip(&ids)
            .map(|(record, id)| (record.name.as_str(), *id))
            .collect();
        for (record, id) in records.iter().zip(ids.iter_mut()) {
            *id = last[record.name.as_str()];
        }
    }

    tx.commit()?;
    Ok(ids)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let mut record = Record::new(row.get::<_, String>(0)?);
    for (offset, field) in Field::DATA.into_iter().enumerate() {
        record.fields.insert(field, row.get::<_, FieldValue>(offset + 1)?);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(Field::Occupation, "Mathematician".into());
        fields.insert(Field::BirthYear, 1815.into());
        fields
    }

    #[test]
    fn test_store_and_retrieve_in_memory() {
        let store = Store::open_in_memory().unwrap();
        store.store("Ada Lovelace", &ada()).unwrap();

        assert_eq!(
            store.retrieve("Ada Lovelace", "occupation").unwrap(),
            Some(FieldValue::from("Mathematician"))
        );
        assert_eq!(
            store.retrieve("Ada Lovelace", "death_year").unwrap(),
            Some(FieldValue::Null)
        );
        assert_eq!(store.retrieve("Grace Hopper", "occupation").unwrap(), None);
    }

    #[test]
    fn test_retrieve_name_field() {
        let store = Store::open_in_memory().unwrap();
        store.store("Ada Lovelace", &ada()).unwrap();
        assert_eq!(
            store.get("Ada Lovelace", Field::Name).unwrap(),
            Some(FieldValue::from("Ada Lovelace"))
        );
    }

    #[test]
    fn test_empty_key_rejected() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(
            store.store("", &ada()).unwrap_err(),
            StoreError::InvalidKey { index: None }
        );
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_keys_in_one_batch_last_wins() {
        let store = Store::open_in_memory().unwrap();
        let records = vec![
            Record::new("Alan Turing").with(Field::BirthYear, 1900),
            Record::new("Grace Hopper").with(Field::BirthYear, 1906),
            Record::new("Alan Turing").with(Field::BirthYear, 1912),
        ];
        let ids = store.batch_store(&records, 2).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], ids[2]);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(
            store.get("Alan Turing", Field::BirthYear).unwrap(),
            Some(FieldValue::Integer(1912))
        );
    }

    #[test]
    fn test_batch_retrieve_follows_key_order() {
        let store = Store::open_in_memory().unwrap();
        for name in ["a", "b", "c"] {
            store.store(name, &FieldMap::new()).unwrap();
        }
        let found = store.batch_retrieve(&["c", "missing", "a", "c"]).unwrap();
        let names: Vec<&str> = found.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a"]);
    }
}
