// src/import/mod.rs
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::parse::{parse, ParseError};
use crate::rules::{validate::validate_all, CandidateRow, RuleSet};
use crate::submit::{RowOutcome, SubmitError, Submitter};

pub mod report;
pub mod schedule;

use report::{Aggregator, ImportProgress, ImportReport};
use schedule::{schedule, Batch};

/// Errors that stop a run before any row is submitted.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid import settings: {0}")]
    Settings(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    pub batch_size: usize,
    /// Submissions in flight at once within a batch.
    pub concurrency_per_batch: usize,
    pub submit_timeout: Duration,
    pub max_displayed_failures: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        ImportSettings {
            batch_size: 10,
            concurrency_per_batch: 5,
            submit_timeout: Duration::from_secs(30),
            max_displayed_failures: 10,
        }
    }
}

/// Drives parse → validate → schedule → submit for one rule set at a time.
pub struct Importer {
    submitter: Arc<dyn Submitter>,
    settings: ImportSettings,
    progress: Option<mpsc::Sender<ImportProgress>>,
}

impl Importer {
    pub fn new(submitter: Arc<dyn Submitter>, settings: ImportSettings) -> Self {
        Importer {
            submitter,
            settings,
            progress: None,
        }
    }

    /// Receive one `ImportProgress` per completed batch.
    pub fn with_progress(mut self, tx: mpsc::Sender<ImportProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Run one import.
    ///
    /// Only a fatal error (bad settings, empty input, missing columns) is
    /// returned as `Err`. Row rejections and submission failures are recorded
    /// in the report. Cancellation is honoured between batches: the batch in
    /// flight finishes and the report comes back with `cancelled` set.
    #[instrument(level = "info", skip_all, fields(rule_set = %rules.name))]
    pub async fn run(
        &self,
        raw_text: &str,
        rules: &RuleSet,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, ImportError> {
        let start = Instant::now();
        let batch_size = self.check_settings()?;

        let parsed = parse(raw_text, &rules.required_columns())?;
        let rows = validate_all(&parsed, rules);

        let mut aggregator = Aggregator::new(
            &rules.name,
            parsed.total_rows(),
            self.settings.max_displayed_failures,
        );
        let mut valid = Vec::with_capacity(rows.len());
        for row in rows {
            if row.verdict.is_valid() {
                valid.push(row);
            } else {
                debug!(line = row.line, reasons = ?row.verdict.reasons(), "row rejected");
                aggregator.reject(&row);
            }
        }

        let batches = schedule(valid, batch_size);
        aggregator.plan(batches.len());
        info!(
            rows = parsed.total_rows(),
            batches = batches.len(),
            batch_size = self.settings.batch_size,
            concurrency = self.settings.concurrency_per_batch,
            "starting import"
        );

        let aggregator = Arc::new(Mutex::new(aggregator));
        let key_fields: Arc<[String]> = rules.key_fields.iter().map(|k| k.to_lowercase()).collect();
        let mut cancelled = false;

        for batch in batches {
            if cancel.is_cancelled() {
                warn!(next_batch = batch.index, "import cancelled; no further batches scheduled");
                cancelled = true;
                break;
            }
            let index = batch.index;
            self.run_batch(batch, &key_fields, &aggregator).await;

            let progress = aggregator.lock().await.close_batch(index);
            info!(
                batch = progress.batches_done(),
                of = progress.batches_total,
                succeeded = progress.succeeded,
                failed = progress.failed,
                "batch complete"
            );
            if let Some(tx) = &self.progress {
                let _ = tx.send(progress).await;
            }
        }

        let report = aggregator.lock().await.finish(cancelled);
        info!(
            status = ?report.status(),
            succeeded = report.succeeded,
            failed = report.failed,
            rejected = report.rejected.len(),
            elapsed = ?start.elapsed(),
            "import finished"
        );
        Ok(report)
    }

    fn check_settings(&self) -> Result<NonZeroUsize, ImportError> {
        let s = &self.settings;
        if s.concurrency_per_batch == 0 {
            return Err(ImportError::Settings("concurrency must be at least 1".into()));
        }
        if s.submit_timeout.is_zero() {
            return Err(ImportError::Settings("submit timeout must be non-zero".into()));
        }
        NonZeroUsize::new(s.batch_size)
            .ok_or_else(|| ImportError::Settings("batch size must be at least 1".into()))
    }

    /// Submit every row of `batch` with bounded concurrency and wait for all
    /// of them. Each row's outcome is recorded exactly once.
    #[instrument(level = "debug", skip_all, fields(batch = batch.index, rows = batch.rows.len()))]
    async fn run_batch(
        &self,
        batch: Batch,
        key_fields: &Arc<[String]>,
        aggregator: &Arc<Mutex<Aggregator>>,
    ) {
        let limit = self.settings.concurrency_per_batch;
        let mut in_flight = JoinSet::new();
        let mut pending: HashMap<task::Id, (usize, String)> = HashMap::new();

        for row in batch.rows {
            if in_flight.len() >= limit {
                if let Some(res) = in_flight.join_next_with_id().await {
                    settle(res, &mut pending, aggregator).await;
                }
            }

            let key = row.key(key_fields);
            let line = row.line;
            let submitter = Arc::clone(&self.submitter);
            let shared = Arc::clone(aggregator);
            let timeout = self.settings.submit_timeout;
            let task_key = key.clone();

            let handle = in_flight.spawn(async move {
                let outcome = submit_row(submitter.as_ref(), &row, &task_key, timeout).await;
                shared.lock().await.record(row.line, task_key, outcome);
            });
            pending.insert(handle.id(), (line, key));
        }

        while let Some(res) = in_flight.join_next_with_id().await {
            settle(res, &mut pending, aggregator).await;
        }
    }
}

async fn submit_row(
    submitter: &dyn Submitter,
    row: &CandidateRow,
    key: &str,
    timeout: Duration,
) -> RowOutcome {
    match tokio::time::timeout(timeout, submitter.submit(row)).await {
        Ok(Ok(())) => {
            debug!(line = row.line, key, "row submitted");
            RowOutcome::Succeeded
        }
        Ok(Err(SubmitError::Rejected(msg))) => {
            warn!(line = row.line, key, %msg, "row rejected by remote");
            RowOutcome::Failed(msg)
        }
        Ok(Err(SubmitError::Transient(msg))) => {
            error!(line = row.line, key, %msg, "row submission failed");
            RowOutcome::Failed(msg)
        }
        Err(_) => {
            warn!(line = row.line, key, ?timeout, "row submission timed out");
            RowOutcome::Failed("timed out".into())
        }
    }
}

/// Account for a finished task. A task that panicked never recorded its
/// outcome, so record a failure on its behalf.
async fn settle(
    res: Result<(task::Id, ()), JoinError>,
    pending: &mut HashMap<task::Id, (usize, String)>,
    aggregator: &Arc<Mutex<Aggregator>>,
) {
    match res {
        Ok((id, ())) => {
            pending.remove(&id);
        }
        Err(err) => {
            if let Some((line, key)) = pending.remove(&err.id()) {
                error!(line, %key, error = %err, "submission task aborted");
                aggregator.lock().await.record(
                    line,
                    key,
                    RowOutcome::Failed("submission task aborted".into()),
                );
            }
        }
    }
}
