//! Benchmark workload.
//!
//! Drives a [`Store`] through individual inserts, batch inserts at several
//! batch sizes, point retrievals, a bulk retrieval, full-table queries and
//! concurrent writers, logging the rate of each phase to a
//! [`PerformanceRecorder`].

use std::thread;
use std::time::{Duration, Instant};

use crate::perf::{rate_per_second, OperationKind, PerformanceRecorder};
use crate::storage::{Field, Record, Store, StoreError};

const OCCUPATIONS: [&str; 5] = [
    "Mathematician",
    "Computer Scientist",
    "Physicist",
    "Engineer",
    "Chemist",
];

const NATIONALITIES: [&str; 4] = ["British", "American", "Hungarian", "Polish"];

/// Full-table scans in the query phase.
const QUERY_REPEATS: usize = 5;

/// Shape of one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadConfig {
    pub records: usize,
    pub batch_sizes: Vec<usize>,
    pub batch_records: usize,
    pub retrievals: usize,
    pub threads: usize,
    pub ops_per_thread: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            records: 1000,
            batch_sizes: vec![10, 100, 1000],
            batch_records: 5000,
            retrievals: 1000,
            threads: 4,
            ops_per_thread: 100,
        }
    }
}

/// Measured result of one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseResult {
    pub kind: OperationKind,
    pub batch_size: Option<usize>,
    pub operations: usize,
    pub elapsed: Duration,
    /// Operations per second.
    pub rate: f64,
}

/// Results of a full workload run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadReport {
    pub run_id: String,
    pub phases: Vec<PhaseResult>,
    pub final_count: usize,
    pub size_bytes: u64,
}

/// A deterministic biography for benchmark position `i`.
pub fn sample_record(prefix: &str, i: usize) -> Record {
    Record::new(format!("person-{prefix}-{i}"))
        .with(Field::BirthYear, 1900 + (i % 100) as i64)
        .with(Field::BirthPlace, format!("City {}", i % 50))
        .with(Field::Occupation, OCCUPATIONS[i % OCCUPATIONS.len()])
        .with(Field::Nationality, NATIONALITIES[i % NATIONALITIES.len()])
        .with(Field::Achievement, format!("Achievement number {i}"))
}

/// Run every phase against `store`, logging each rate to `recorder`.
///
/// Records are keyed by the recorder's current run id, so repeated runs
/// against the same database never collide.
///
/// # Errors
///
/// Stops at the first store error.
pub fn run_workload(
    store: &Store,
    recorder: &PerformanceRecorder,
    config: &WorkloadConfig,
) -> Result<WorkloadReport, StoreError> {
    let run_id = recorder.current_run_id();
    let mut phases = Vec::new();
    let mut measure = |kind, batch_size, operations, elapsed: Duration| {
        let rate = rate_per_second(operations, elapsed);
        recorder.log(kind, rate, batch_size);
        tracing::info!(
            operation = %kind,
            batch_size = ?batch_size,
            operations,
            elapsed_ms = elapsed.as_millis(),
            rate,
            "Phase complete"
        );
        phases.push(PhaseResult {
            kind,
            batch_size,
            operations,
            elapsed,
            rate,
        });
    };

    // Individual inserts
    let inserted: Vec<Record> = (0..config.records)
        .map(|i| sample_record(&run_id, i))
        .collect();
    let started = Instant::now();
    for record in &inserted {
        store.store_record(record)?;
    }
    measure(OperationKind::Insert, None, inserted.len(), started.elapsed());

    // Batch inserts, one measurement per batch size
    for &batch_size in &config.batch_sizes {
        let prefix = format!("{run_id}-b{batch_size}");
        let records: Vec<Record> = (0..config.batch_records)
            .map(|i| sample_record(&prefix, i))
            .collect();
        let started = Instant::now();
        store.batch_store(&records, batch_size)?;
        measure(
            OperationKind::BatchInsert,
            Some(batch_size),
            records.len(),
            started.elapsed(),
        );
    }

    // Point retrievals over a fixed stride of the inserted keys
    if !inserted.is_empty() {
        let started = Instant::now();
        for i in 0..config.retrievals {
            let record = &inserted[(i * 7919) % inserted.len()];
            store.retrieve(&record.name, Field::Occupation.column())?;
        }
        measure(OperationKind::Retrieve, None, config.retrievals, started.elapsed());

        let keys: Vec<&str> = inserted.iter().map(|r| r.name.as_str()).collect();
        let started = Instant::now();
        let found = store.batch_retrieve(&keys)?;
        debug_assert_eq!(found.len(), keys.len());
        measure(OperationKind::BatchRetrieve, None, keys.len(), started.elapsed());
    }

    // Full-table queries
    let started = Instant::now();
    for _ in 0..QUERY_REPEATS {
        store.list_all()?;
    }
    measure(OperationKind::Query, None, QUERY_REPEATS, started.elapsed());

    // Concurrent writers, each on its own connection
    if config.threads > 0 {
        let started = Instant::now();
        run_concurrent_writers(store, &run_id, config.threads, config.ops_per_thread)?;
        measure(
            OperationKind::Concurrent,
            None,
            config.threads * config.ops_per_thread,
            started.elapsed(),
        );
    }

    let size_bytes = store.size_bytes()?;
    recorder.log_database_size(size_bytes);

    Ok(WorkloadReport {
        run_id,
        phases,
        final_count: store.count()?,
        size_bytes,
    })
}

/// Spawn `threads` writers storing `ops_per_thread` distinct records each.
pub fn run_concurrent_writers(
    store: &Store,
    prefix: &str,
    threads: usize,
    ops_per_thread: usize,
) -> Result<(), StoreError> {
    thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                s.spawn(move || -> Result<(), StoreError> {
                    let prefix = format!("{prefix}-t{t}");
                    for i in 0..ops_per_thread {
                        store.store_record(&sample_record(&prefix, i))?;
                    }
                    store.close_for_current_thread();
                    Ok(())
                })
            })
            .collect();

        handles.into_iter().try_for_each(|handle| {
            handle
                .join()
                .unwrap_or_else(|_| Err(StoreError::Database("writer thread panicked".into())))
        })
    })
}
