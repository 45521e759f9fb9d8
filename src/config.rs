//! Configuration parsing for the memstore benchmark.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::observability::tracing::LogFormat;
use crate::storage::{StoreOptions, DEFAULT_BATCH_SIZE};
use crate::workload::WorkloadConfig;

/// memstore-bench: measure insert, batch, retrieval and concurrent throughput.
#[derive(Parser, Debug, Clone)]
#[command(name = "memstore-bench")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// SQLite database file
    #[arg(long, env = "MEMSTORE_DB_PATH", default_value = "./data/memstore.db")]
    pub db_path: PathBuf,

    /// Run against a shared in-memory database instead of a file
    #[arg(long, env = "MEMSTORE_IN_MEMORY")]
    pub in_memory: bool,

    /// JSON file holding the performance history of previous runs
    #[arg(
        long,
        env = "MEMSTORE_HISTORY_PATH",
        default_value = "./data/performance_history.json"
    )]
    pub history_path: PathBuf,

    /// Records written by the individual-insert phase
    #[arg(long, env = "MEMSTORE_RECORDS", default_value_t = 1000)]
    pub records: usize,

    /// Batch sizes exercised by the batch-insert phase
    #[arg(
        long,
        env = "MEMSTORE_BATCH_SIZES",
        value_delimiter = ',',
        default_values_t = vec![10, 100, 1000]
    )]
    pub batch_sizes: Vec<usize>,

    /// Records per batch-insert measurement
    #[arg(long, env = "MEMSTORE_BATCH_RECORDS", default_value_t = 5000)]
    pub batch_records: usize,

    /// Random-key retrievals in the retrieval phase
    #[arg(long, env = "MEMSTORE_RETRIEVALS", default_value_t = 1000)]
    pub retrievals: usize,

    /// Writer threads in the concurrent phase
    #[arg(long, env = "MEMSTORE_THREADS", default_value_t = 4)]
    pub threads: usize,

    /// Records written by each concurrent writer
    #[arg(long, env = "MEMSTORE_OPS_PER_THREAD", default_value_t = 100)]
    pub ops_per_thread: usize,

    /// Default records per multi-row insert
    #[arg(long, env = "MEMSTORE_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Busy timeout in milliseconds
    #[arg(long, env = "MEMSTORE_BUSY_TIMEOUT_MS", default_value_t = 10_000)]
    pub busy_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MEMSTORE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "MEMSTORE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Library options derived from this configuration.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            default_batch_size: self.batch_size,
            ..StoreOptions::default()
        }
    }

    /// Workload shape derived from this configuration.
    pub fn workload(&self) -> WorkloadConfig {
        WorkloadConfig {
            records: self.records,
            batch_sizes: self.batch_sizes.clone(),
            batch_records: self.batch_records,
            retrievals: self.retrievals,
            threads: self.threads,
            ops_per_thread: self.ops_per_thread,
        }
    }

    /// Create a small configuration for testing.
    #[cfg(test)]
    pub fn test_config(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join("test.db"),
            in_memory: false,
            history_path: data_dir.join("history.json"),
            records: 20,
            batch_sizes: vec![5, 50],
            batch_records: 100,
            retrievals: 20,
            threads: 2,
            ops_per_thread: 10,
            batch_size: 50,
            busy_timeout_ms: 1000,
            log_level: "debug".into(),
            log_format: LogFormat::Text,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/memstore.db"),
            in_memory: false,
            history_path: PathBuf::from("./data/performance_history.json"),
            records: 1000,
            batch_sizes: vec![10, 100, 1000],
            batch_records: 5000,
            retrievals: 1000,
            threads: 4,
            ops_per_thread: 100,
            batch_size: DEFAULT_BATCH_SIZE,
            busy_timeout_ms: 10_000,
            log_level: "info".into(),
            log_format: LogFormat::Text,
        }
    }
}
