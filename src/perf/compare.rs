//! Run-over-run rate comparison.

use std::fmt;

use super::{OperationKind, PerformanceRun};

/// Change in mean rate for one (kind, batch size) group.
#[derive(Debug, Clone, PartialEq)]
pub struct RateChange {
    pub kind: OperationKind,
    pub batch_size: Option<usize>,
    pub previous: f64,
    pub current: f64,
    /// `(current - previous) / previous * 100`.
    pub change_percent: f64,
}

impl RateChange {
    pub fn improved(&self) -> bool {
        self.change_percent > 0.0
    }
}

/// Comparison of two saved runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunComparison {
    pub previous_run_id: String,
    pub current_run_id: String,
    pub changes: Vec<RateChange>,
}

impl RunComparison {
    /// Compare every group present in both runs.
    ///
    /// Groups with a zero (or non-finite) previous mean are skipped.
    pub fn between(previous: &PerformanceRun, current: &PerformanceRun) -> Self {
        let before = previous.group_means();
        let changes = current
            .group_means()
            .into_iter()
            .filter_map(|((kind, batch_size), now)| {
                let then = *before.get(&(kind, batch_size))?;
                if then == 0.0 || !then.is_finite() {
                    return None;
                }
                Some(RateChange {
                    kind,
                    batch_size,
                    previous: then,
                    current: now,
                    change_percent: (now - then) / then * 100.0,
                })
            })
            .collect();

        Self {
            previous_run_id: previous.run_id.clone(),
            current_run_id: current.run_id.clone(),
            changes,
        }
    }

    /// Change for a specific group, if both runs measured it.
    pub fn change_for(&self, kind: OperationKind, batch_size: Option<usize>) -> Option<&RateChange> {
        self.changes
            .iter()
            .find(|c| c.kind == kind && c.batch_size == batch_size)
    }
}

impl fmt::Display for RunComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Performance Comparison with Previous Run:")?;
        writeln!(f, "----------------------------------------")?;
        if self.changes.is_empty() {
            return writeln!(f, "No comparable measurements");
        }
        for change in &self.changes {
            write!(f, "{}", change.kind.label())?;
            if let Some(size) = change.batch_size {
                write!(f, " (batch size {size})")?;
            }
            writeln!(
                f,
                ": {:.2} ops/sec ({}{:.1}%)",
                change.current,
                if change.improved() { '↑' } else { '↓' },
                change.change_percent.abs()
            )?;
        }
        Ok(())
    }
}
