//! In-memory sample buffer backed by a JSON history file.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{OperationKind, PerfError, PerformanceRun, PerformanceSample, RunComparison};

/// Records operation rates for the current run.
///
/// Safe to share between threads; every method takes `&self`.
#[derive(Debug)]
pub struct PerformanceRecorder {
    history_path: PathBuf,
    current: Mutex<PerformanceRun>,
}

impl PerformanceRecorder {
    /// Create a recorder writing history to `history_path`.
    ///
    /// Nothing is read or written until [`save_run`](Self::save_run) or a
    /// history query.
    pub fn new(history_path: impl Into<PathBuf>) -> Self {
        Self {
            history_path: history_path.into(),
            current: Mutex::new(PerformanceRun::new()),
        }
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// Discard buffered samples and begin a new run. Returns the run id.
    pub fn start_run(&self) -> String {
        let run = PerformanceRun::new();
        let run_id = run.run_id.clone();
        *self.lock() = run;
        tracing::info!(run_id = %run_id, "Started performance run");
        run_id
    }

    pub fn current_run_id(&self) -> String {
        self.lock().run_id.clone()
    }

    /// Snapshot of the current run.
    pub fn current_run(&self) -> PerformanceRun {
        self.lock().clone()
    }

    /// Buffer one sample for the current run.
    pub fn log(&self, kind: OperationKind, rate: f64, batch_size: Option<usize>) {
        let sample = PerformanceSample {
            rate,
            batch_size,
            timestamp_ms: crate::now_millis(),
        };
        self.lock().samples.entry(kind).or_default().push(sample);
    }

    /// Note the database size reached by the current run.
    pub fn log_database_size(&self, bytes: u64) {
        self.lock().size_bytes = Some(bytes);
    }

    /// Mean rate per kind in the current run.
    pub fn averages(&self) -> BTreeMap<OperationKind, f64> {
        self.lock().averages()
    }

    /// Append the current run to the history file.
    ///
    /// A missing or unreadable history is replaced by a fresh one. The file
    /// is written to a sibling temp file first and renamed into place.
    /// Returns the number of runs now in the history.
    pub fn save_run(&self) -> Result<usize, PerfError> {
        let mut run = self.current_run();
        run.saved_at_ms = Some(crate::now_millis());

        let mut history = self.history();
        history.push(run);

        if let Some(parent) = self.history_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.history_path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_vec_pretty(&history)?)?;
        fs::rename(&tmp_path, &self.history_path)?;

        tracing::info!(
            path = %self.history_path.display(),
            runs = history.len(),
            "Saved performance run"
        );
        Ok(history.len())
    }

    /// Every saved run, oldest first.
    ///
    /// Returns an empty history when the file is missing or malformed.
    pub fn history(&self) -> Vec<PerformanceRun> {
        let bytes = match fs::read(&self.history_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(
                    path = %self.history_path.display(),
                    error = %e,
                    "Could not read performance history, starting fresh"
                );
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(
                    path = %self.history_path.display(),
                    error = %e,
                    "Malformed performance history, starting fresh"
                );
                Vec::new()
            }
        }
    }

    /// Compare the two most recently saved runs.
    ///
    /// `None` when fewer than two runs are on record.
    pub fn compare_last_two_runs(&self) -> Option<RunComparison> {
        let history = self.history();
        match history.as_slice() {
            [.., previous, current] => Some(RunComparison::between(previous, current)),
            _ => {
                tracing::debug!(runs = history.len(), "Not enough runs to compare");
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, PerformanceRun> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_start_run_resets_buffer() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = PerformanceRecorder::new(temp_dir.path().join("history.json"));
        let first = recorder.current_run_id();
        recorder.log(OperationKind::Insert, 10.0, None);
        assert_eq!(recorder.current_run().sample_count(), 1);

        let second = recorder.start_run();
        assert_ne!(first, second);
        assert_eq!(recorder.current_run_id(), second);
        assert_eq!(recorder.current_run().sample_count(), 0);
    }

    #[test]
    fn test_save_appends_runs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("history.json");
        let recorder = PerformanceRecorder::new(&path);

        recorder.log(OperationKind::Retrieve, 500.0, None);
        assert_eq!(recorder.save_run().unwrap(), 1);
        recorder.start_run();
        recorder.log(OperationKind::Retrieve, 600.0, None);
        assert_eq!(recorder.save_run().unwrap(), 2);

        let history = recorder.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|run| run.saved_at_ms.is_some()));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_database_size_is_saved_with_run() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = PerformanceRecorder::new(temp_dir.path().join("history.json"));
        recorder.log(OperationKind::Insert, 10.0, None);
        recorder.log_database_size(4096);
        recorder.save_run().unwrap();

        assert_eq!(recorder.history()[0].size_bytes, Some(4096));
        recorder.start_run();
        assert_eq!(recorder.current_run().size_bytes, None);
    }

    #[test]
    fn test_malformed_history_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.json");
        fs::write(&path, b"{ not json").unwrap();

        let recorder = PerformanceRecorder::new(&path);
        assert!(recorder.history().is_empty());
        assert!(recorder.compare_last_two_runs().is_none());

        recorder.log(OperationKind::Query, 1.0, None);
        assert_eq!(recorder.save_run().unwrap(), 1);
    }
}
