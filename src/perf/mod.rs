//! Throughput self-measurement.
//!
//! A [`PerformanceRecorder`] buffers operation rates for the current run,
//! appends the run to a JSON history file on save, and compares the two
//! most recent runs.

mod compare;
mod recorder;

pub use compare::{RateChange, RunComparison};
pub use recorder::PerformanceRecorder;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Category of a measured operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    BatchInsert,
    Retrieve,
    BatchRetrieve,
    Query,
    Concurrent,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::Insert,
        OperationKind::BatchInsert,
        OperationKind::Retrieve,
        OperationKind::BatchRetrieve,
        OperationKind::Query,
        OperationKind::Concurrent,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::BatchInsert => "batch_insert",
            OperationKind::Retrieve => "retrieve",
            OperationKind::BatchRetrieve => "batch_retrieve",
            OperationKind::Query => "query",
            OperationKind::Concurrent => "concurrent",
        }
    }

    /// Human-readable label for reports.
    pub const fn label(self) -> &'static str {
        match self {
            OperationKind::Insert => "Insertion Rate",
            OperationKind::BatchInsert => "Batch Insertion Rate",
            OperationKind::Retrieve => "Retrieval Rate",
            OperationKind::BatchRetrieve => "Batch Retrieval Rate",
            OperationKind::Query => "Query Rate",
            OperationKind::Concurrent => "Concurrent Operation Rate",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measured rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    /// Operations per second.
    pub rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    pub timestamp_ms: i64,
}

/// All samples of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRun {
    pub run_id: String,
    pub started_at_ms: i64,
    #[serde(default)]
    pub saved_at_ms: Option<i64>,
    /// Database file size when the workload finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub samples: BTreeMap<OperationKind, Vec<PerformanceSample>>,
}

impl PerformanceRun {
    /// An empty run stamped with a fresh id and the current time.
    pub fn new() -> Self {
        Self {
            run_id: crate::generate_id(),
            started_at_ms: crate::now_millis(),
            saved_at_ms: None,
            size_bytes: None,
            samples: BTreeMap::new(),
        }
    }

    /// Total number of samples across all kinds.
    pub fn sample_count(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }

    /// Mean rate per operation kind.
    pub fn averages(&self) -> BTreeMap<OperationKind, f64> {
        self.samples
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(kind, samples)| (*kind, mean(samples.iter().map(|s| s.rate))))
            .collect()
    }

    /// Mean rate per (kind, batch size) group.
    pub fn group_means(&self) -> BTreeMap<(OperationKind, Option<usize>), f64> {
        let mut groups: BTreeMap<(OperationKind, Option<usize>), Vec<f64>> = BTreeMap::new();
        for (kind, samples) in &self.samples {
            for sample in samples {
                groups
                    .entry((*kind, sample.batch_size))
                    .or_default()
                    .push(sample.rate);
            }
        }
        groups
            .into_iter()
            .map(|(group, rates)| (group, mean(rates.into_iter())))
            .collect()
    }
}

impl Default for PerformanceRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Error saving performance history.
#[derive(Debug, Error)]
pub enum PerfError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Operations per second for `count` operations over `elapsed`.
///
/// Sub-nanosecond timings are clamped so the rate stays finite.
pub fn rate_per_second(count: usize, elapsed: Duration) -> f64 {
    count as f64 / elapsed.as_secs_f64().max(1e-9)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
