//! Import pipeline orchestration
//!
//! One run is five stages connected by bounded channels, each stage a tokio
//! task:
//!
//! ```text
//! reader → validator → resolver (N concurrent) → duplicate detector → batch writer
//!    \          \             \                         \                  \
//!     └──────────┴─────────────┴──── outcomes ───────────┴──────────────────┴→ aggregator
//! ```
//!
//! Every stage that ends a record's journey sends its [`RecordOutcome`] on the
//! shared outcome channel. The aggregator (the calling task) drains that
//! channel until every stage has dropped its sender, then checks that each
//! record read got exactly one outcome.
//!
//! Cancellation (caller token, client disconnect or run timeout) stops the
//! reader from producing and the writer from starting new batches. A batch
//! already in its transaction finishes. Records still in flight get no
//! outcome and the summary reports `cancelled`.

use super::aggregator::{ImportSummary, OutcomeAggregator, RunStatus};
use super::dedup::{DuplicateCheck, DuplicateDetector};
use super::error::ImportError;
use super::resolver::AuthorResolver;
use super::source::RecordSource;
use super::types::{ImportRequest, RawRecord, RecordOutcome, ResolvedRecord, ValidatedRecord};
use super::validator::RecordValidator;
use super::writer::BatchWriter;
use crate::config::ImportSettings;
use futures::StreamExt;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type OutcomeSender = mpsc::Sender<RecordOutcome>;

/// How far the reader got
#[derive(Debug, Clone, Copy)]
struct ReadReport {
    /// Records handed out by the source (including malformed ones)
    read: usize,
    /// Source ran to its end
    exhausted: bool,
}

/// Runs imports against one database with fixed settings
#[derive(Clone)]
pub struct ImportPipeline {
    db: SqlitePool,
    settings: ImportSettings,
}

impl ImportPipeline {
    pub fn new(db: SqlitePool, settings: ImportSettings) -> Self {
        Self { db, settings }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Run an import with a fresh run id
    pub async fn run(
        &self,
        request: ImportRequest,
        cancel: CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        self.run_with_id(Uuid::new_v4(), request, cancel).await
    }

    /// Run an import under a caller-chosen run id (used by the run registry)
    ///
    /// Structural and size errors are returned before any stage starts, so no
    /// record is written in those cases.
    pub async fn run_with_id(
        &self,
        run_id: Uuid,
        request: ImportRequest,
        cancel: CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        let ImportRequest {
            payload,
            format,
            caller,
            batch_size,
        } = request;

        if payload.len() > self.settings.max_payload_bytes {
            return Err(ImportError::PayloadTooLarge {
                size: payload.len(),
                limit: self.settings.max_payload_bytes,
            });
        }

        let payload_bytes = payload.len();
        let source = RecordSource::open(payload, format)?;
        let batch_size = self.settings.effective_batch_size(batch_size);
        let capacity = self.settings.channel_capacity;

        tracing::info!(
            %run_id,
            %format,
            %caller,
            payload_bytes,
            batch_size,
            "Import run started"
        );
        let started = Instant::now();

        // Child token: the timeout cancels this run only
        let cancel = cancel.child_token();
        let timer = spawn_run_timer(run_id, self.settings.run_timeout, cancel.clone());

        let (outcome_tx, mut outcome_rx) = mpsc::channel::<RecordOutcome>(capacity);
        let (raw_tx, raw_rx) = mpsc::channel::<RawRecord>(capacity);
        let (valid_tx, valid_rx) = mpsc::channel::<ValidatedRecord>(capacity);
        let (resolved_tx, resolved_rx) = mpsc::channel::<ResolvedRecord>(capacity);
        let (unique_tx, unique_rx) = mpsc::channel::<ResolvedRecord>(capacity);

        let reader = tokio::spawn(read_stage(source, raw_tx, outcome_tx.clone(), cancel.clone()));
        let stages: Vec<JoinHandle<()>> = vec![
            tokio::spawn(validate_stage(
                RecordValidator::new(),
                raw_rx,
                valid_tx,
                outcome_tx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(resolve_stage(
                Arc::new(AuthorResolver::new(self.db.clone(), self.settings.max_lock_wait_ms)),
                self.settings.resolver_concurrency,
                valid_rx,
                resolved_tx,
                outcome_tx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(dedup_stage(
                DuplicateDetector::new(self.db.clone()),
                resolved_rx,
                unique_tx,
                outcome_tx.clone(),
                cancel.clone(),
            )),
            tokio::spawn(write_stage(
                BatchWriter::new(self.db.clone(), caller, self.settings.max_lock_wait_ms),
                batch_size,
                unique_rx,
                outcome_tx,
                cancel.clone(),
            )),
        ];

        let mut aggregator = OutcomeAggregator::new();
        while let Some(outcome) = outcome_rx.recv().await {
            aggregator.record(outcome);
        }

        timer.abort();

        let report = reader
            .await
            .map_err(|e| ImportError::Internal(format!("source reader task failed: {}", e)))?;
        for stage in stages {
            stage
                .await
                .map_err(|e| ImportError::Internal(format!("import stage task failed: {}", e)))?;
        }

        let accounted = aggregator.len();
        if cancel.is_cancelled() && aggregator.is_empty() {
            tracing::info!(%run_id, read = report.read, "Run cancelled before any record finished");
        }
        let status = if report.exhausted && accounted == report.read {
            RunStatus::Completed
        } else if cancel.is_cancelled() {
            RunStatus::Cancelled
        } else {
            tracing::error!(
                %run_id,
                read = report.read,
                accounted,
                "Import run lost track of records"
            );
            return Err(ImportError::Internal(format!(
                "{} records read but {} outcomes recorded",
                report.read, accounted
            )));
        };

        let summary = aggregator.finish(run_id, status);
        tracing::info!(
            %run_id,
            status = ?summary.status,
            read = report.read,
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Import run finished"
        );
        Ok(summary)
    }
}

/// Cancel the run once its wall-clock budget is spent
fn spawn_run_timer(run_id: Uuid, timeout: std::time::Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(%run_id, timeout_secs = timeout.as_secs(), "Import run timed out, cancelling");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}

/// Send an outcome; the receiver only disappears if the run was abandoned
async fn emit(outcomes: &OutcomeSender, outcome: RecordOutcome) {
    if outcomes.send(outcome).await.is_err() {
        tracing::debug!("Outcome dropped, aggregator gone");
    }
}

async fn read_stage(
    source: RecordSource,
    tx: mpsc::Sender<RawRecord>,
    outcomes: OutcomeSender,
    cancel: CancellationToken,
) -> ReadReport {
    let mut read = 0;

    for item in source {
        if cancel.is_cancelled() {
            tracing::info!(read, "Source reading stopped by cancellation");
            return ReadReport { read, exhausted: false };
        }
        read += 1;

        match item {
            Ok(record) => {
                if tx.send(record).await.is_err() {
                    // Downstream stopped early, which only cancellation does
                    return ReadReport { read, exhausted: false };
                }
            }
            Err(malformed) => {
                emit(
                    &outcomes,
                    RecordOutcome::failed(malformed.index, malformed.error.to_string()),
                )
                .await;
            }
        }
    }

    ReadReport { read, exhausted: true }
}

/// Receive the next record unless the run is cancelled first
async fn next_or_cancelled<T>(rx: &mut mpsc::Receiver<T>, cancel: &CancellationToken) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = rx.recv() => item,
    }
}

async fn validate_stage(
    validator: RecordValidator,
    mut rx: mpsc::Receiver<RawRecord>,
    tx: mpsc::Sender<ValidatedRecord>,
    outcomes: OutcomeSender,
    cancel: CancellationToken,
) {
    while let Some(raw) = next_or_cancelled(&mut rx, &cancel).await {
        let index = raw.index;
        match validator.validate(raw) {
            Ok(record) => {
                if tx.send(record).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::debug!(index, reason = %err, "Record failed validation");
                emit(&outcomes, RecordOutcome::failed(index, err.to_string())).await;
            }
        }
    }
}

async fn resolve_stage(
    resolver: Arc<AuthorResolver>,
    concurrency: usize,
    rx: mpsc::Receiver<ValidatedRecord>,
    tx: mpsc::Sender<ResolvedRecord>,
    outcomes: OutcomeSender,
    cancel: CancellationToken,
) {
    ReceiverStream::new(rx)
        .take_until(cancel.clone().cancelled_owned())
        .map(|record| {
            let resolver = Arc::clone(&resolver);
            async move {
                let index = record.index;
                (index, resolver.resolve(record).await)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .for_each(|(index, result)| {
            let tx = tx.clone();
            let outcomes = outcomes.clone();
            async move {
                match result {
                    Ok(resolved) => {
                        if tx.send(resolved).await.is_err() {
                            tracing::debug!(index, "Resolved record dropped, duplicate detector gone");
                        }
                    }
                    Err(err) => emit(&outcomes, RecordOutcome::failed(index, err.to_string())).await,
                }
            }
        })
        .await;
}

async fn dedup_stage(
    detector: DuplicateDetector,
    mut rx: mpsc::Receiver<ResolvedRecord>,
    tx: mpsc::Sender<ResolvedRecord>,
    outcomes: OutcomeSender,
    cancel: CancellationToken,
) {
    while let Some(record) = next_or_cancelled(&mut rx, &cancel).await {
        let index = record.index();
        match detector.check(&record).await {
            Ok(DuplicateCheck::Unique) => {
                if tx.send(record).await.is_err() {
                    break;
                }
            }
            Ok(DuplicateCheck::Duplicate { existing_id, kind }) => {
                emit(&outcomes, RecordOutcome::skipped(index, kind.reason(), existing_id)).await;
            }
            Err(err) => emit(&outcomes, RecordOutcome::failed(index, err.to_string())).await,
        }
    }
}

async fn write_stage(
    writer: BatchWriter,
    batch_size: usize,
    mut rx: mpsc::Receiver<ResolvedRecord>,
    outcomes: OutcomeSender,
    cancel: CancellationToken,
) {
    let mut batch = Vec::with_capacity(batch_size);
    let mut batches = 0usize;

    while let Some(record) = next_or_cancelled(&mut rx, &cancel).await {
        batch.push(record);
        if batch.len() < batch_size {
            continue;
        }
        if cancel.is_cancelled() {
            break;
        }
        for outcome in writer.commit_batch(&batch).await {
            emit(&outcomes, outcome).await;
        }
        batch.clear();
        batches += 1;
    }

    if batch.is_empty() {
        tracing::debug!(batches, "Batch writer finished");
    } else if cancel.is_cancelled() {
        tracing::info!(
            batches,
            discarded = batch.len(),
            "Run cancelled, pending batch not written"
        );
    } else {
        for outcome in writer.commit_batch(&batch).await {
            emit(&outcomes, outcome).await;
        }
        tracing::debug!(batches = batches + 1, "Batch writer finished");
    }
}
