// src/import/report.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::rules::CandidateRow;
use crate::submit::RowOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub line: usize,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub line: usize,
    pub key: String,
    pub message: String,
}

/// Overall shape of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    NothingToProcess,
    AllSucceeded,
    PartialSuccess,
    AllFailed,
    Cancelled,
}

/// Snapshot sent after each completed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportProgress {
    pub batch_index: usize,
    pub batches_total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rejected: usize,
}

impl ImportProgress {
    pub fn batches_done(&self) -> usize {
        self.batch_index + 1
    }
}

/// Caller-facing result of one import run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub rule_set: String,
    /// Data lines seen, including malformed ones.
    pub total_rows: usize,
    pub rejected: Vec<RejectedRow>,
    pub succeeded: usize,
    pub failed: usize,
    /// First failures in input order, capped for display.
    pub failures: Vec<RowFailure>,
    /// Failures counted in `failed` but not listed in `failures`.
    pub hidden_failures: usize,
    /// Outcome of every submitted row, keyed by input line.
    pub outcomes: BTreeMap<usize, RowOutcome>,
    pub batches_total: usize,
    pub batches_completed: usize,
    pub complete: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportReport {
    fn new(rule_set: &str, total_rows: usize) -> Self {
        ImportReport {
            rule_set: rule_set.to_string(),
            total_rows,
            rejected: Vec::new(),
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            hidden_failures: 0,
            outcomes: BTreeMap::new(),
            batches_total: 0,
            batches_completed: 0,
            complete: false,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Rows that reached the submission client.
    pub fn submitted(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn status(&self) -> ImportStatus {
        if self.cancelled {
            ImportStatus::Cancelled
        } else if self.total_rows == 0 {
            ImportStatus::NothingToProcess
        } else if self.succeeded == 0 {
            ImportStatus::AllFailed
        } else if self.failed == 0 && self.rejected.is_empty() {
            ImportStatus::AllSucceeded
        } else {
            ImportStatus::PartialSuccess
        }
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} rows, {} succeeded, {} failed, {} rejected ({:?})",
            self.rule_set,
            self.total_rows,
            self.succeeded,
            self.failed,
            self.rejected.len(),
            self.status()
        )?;
        for row in &self.rejected {
            writeln!(f, "  rejected line {}: {}", row.line, row.reasons.join("; "))?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "  failed line {} [{}]: {}",
                failure.line, failure.key, failure.message
            )?;
        }
        if self.hidden_failures > 0 {
            writeln!(f, "  ... and {} more", self.hidden_failures)?;
        }
        Ok(())
    }
}

/// Accumulates outcomes for one run. Shared behind a mutex while a batch is
/// in flight; failures of the open batch are held back until it closes so the
/// display list stays in input order.
#[derive(Debug)]
pub(crate) struct Aggregator {
    report: ImportReport,
    max_displayed: usize,
    open_failures: Vec<RowFailure>,
}

impl Aggregator {
    pub(crate) fn new(rule_set: &str, total_rows: usize, max_displayed: usize) -> Self {
        Aggregator {
            report: ImportReport::new(rule_set, total_rows),
            max_displayed,
            open_failures: Vec::new(),
        }
    }

    pub(crate) fn reject(&mut self, row: &CandidateRow) {
        self.report.rejected.push(RejectedRow {
            line: row.line,
            reasons: row.verdict.reasons().to_vec(),
        });
    }

    pub(crate) fn plan(&mut self, batches: usize) {
        self.report.batches_total = batches;
    }

    pub(crate) fn record(&mut self, line: usize, key: String, outcome: RowOutcome) {
        match &outcome {
            RowOutcome::Succeeded => self.report.succeeded += 1,
            RowOutcome::Failed(message) => {
                self.report.failed += 1;
                self.open_failures.push(RowFailure {
                    line,
                    key,
                    message: message.clone(),
                });
            }
        }
        self.report.outcomes.insert(line, outcome);
    }

    pub(crate) fn close_batch(&mut self, batch_index: usize) -> ImportProgress {
        let mut closed = std::mem::take(&mut self.open_failures);
        closed.sort_by_key(|f| f.line);
        for failure in closed {
            if self.report.failures.len() < self.max_displayed {
                self.report.failures.push(failure);
            } else {
                self.report.hidden_failures += 1;
            }
        }
        self.report.batches_completed += 1;

        ImportProgress {
            batch_index,
            batches_total: self.report.batches_total,
            succeeded: self.report.succeeded,
            failed: self.report.failed,
            rejected: self.report.rejected.len(),
        }
    }

    /// Freeze the report.
    pub(crate) fn finish(&mut self, cancelled: bool) -> ImportReport {
        self.report.cancelled = cancelled;
        self.report.complete = !cancelled;
        self.report.finished_at = Some(Utc::now());
        self.report.clone()
    }
}
