//! memstore-bench: throughput benchmark for the memstore record store.
//!
//! # Usage
//!
//! ```bash
//! memstore-bench --db-path ./data/memstore.db --threads 8 --log-level info
//! ```
//!
//! Environment variables can also be used:
//! - `MEMSTORE_DB_PATH`: SQLite database file
//! - `MEMSTORE_HISTORY_PATH`: Performance history JSON file
//! - `MEMSTORE_THREADS`: Concurrent writer threads
//! - `RUST_LOG`: Log filter (overrides `--log-level`)

use anyhow::Context;
use memstore::config::Config;
use memstore::observability::metrics::init_metrics;
use memstore::observability::tracing::init_tracing;
use memstore::storage::StoreTarget;
use memstore::workload::run_workload;
use memstore::{PerformanceRecorder, Store};
use std::fs;
use std::path::Path;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let target = if config.in_memory {
        "(in-memory)".to_string()
    } else {
        config.db_path.display().to_string()
    };
    eprintln!(
        r#"
  memstore-bench v{}

  Configuration:
    Database:     {}
    History:      {}
    Batch sizes:  {:?}
    Threads:      {} x {} ops
"#,
        version,
        target,
        config.history_path.display(),
        config.batch_sizes,
        config.threads,
        config.ops_per_thread,
    );
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging
    init_tracing(&config.log_level, config.log_format);

    // Initialize metrics
    init_metrics();

    print_banner(&config);

    let target = if config.in_memory {
        StoreTarget::ephemeral()
    } else {
        ensure_parent_dir(&config.db_path)?;
        StoreTarget::File(config.db_path.clone())
    };
    ensure_parent_dir(&config.history_path)?;

    let store = Store::open_with_options(target, config.store_options())
        .context("opening store")?;
    let recorder = PerformanceRecorder::new(&config.history_path);
    recorder.start_run();

    let report = run_workload(&store, &recorder, &config.workload()).context("running workload")?;

    println!("Benchmark results (run {}):", report.run_id);
    for phase in &report.phases {
        match phase.batch_size {
            Some(size) => println!(
                "  {} (batch size {}): {:.2} ops/sec over {} ops in {:?}",
                phase.kind.label(),
                size,
                phase.rate,
                phase.operations,
                phase.elapsed
            ),
            None => println!(
                "  {}: {:.2} ops/sec over {} ops in {:?}",
                phase.kind.label(),
                phase.rate,
                phase.operations,
                phase.elapsed
            ),
        }
    }
    println!("  Records stored: {}", report.final_count);
    println!("  Database size:  {} bytes", report.size_bytes);

    recorder.save_run().context("saving performance history")?;
    match recorder.compare_last_two_runs() {
        Some(comparison) => println!("\n{comparison}"),
        None => println!("\nNeed at least two test runs to compare"),
    }

    store.close();
    tracing::info!("memstore-bench complete");
    Ok(())
}
