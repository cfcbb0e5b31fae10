//! Batch Writer
//!
//! Groups unique records into batches and commits each batch in a single
//! transaction. Inside the transaction every record is re-checked for
//! duplicates before insert, so a record that collides with a book created
//! since the detector looked (or with an earlier record of the same run) is
//! skipped rather than failing the batch on the UNIQUE index.
//!
//! Any other storage error rolls the whole batch back and every record in it
//! fails with the same [`BatchCommitError`] reason. Lock contention on the
//! transaction is retried with backoff before that happens.

use super::dedup::{find_duplicate, DuplicateCheck};
use super::error::BatchCommitError;
use super::types::{CallerIdentity, RecordOutcome, ResolvedRecord};
use crate::db::books::insert_book;
use crate::utils::{begin_monitored, retry_on_lock};
use libris_common::Result;
use sqlx::SqlitePool;

pub struct BatchWriter {
    db: SqlitePool,
    created_by: CallerIdentity,
    max_lock_wait_ms: u64,
}

impl BatchWriter {
    pub fn new(db: SqlitePool, created_by: CallerIdentity, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            created_by,
            max_lock_wait_ms,
        }
    }

    /// Commit one batch; returns exactly one outcome per record
    pub async fn commit_batch(&self, batch: &[ResolvedRecord]) -> Vec<RecordOutcome> {
        if batch.is_empty() {
            return Vec::new();
        }

        let result = retry_on_lock("import batch commit", self.max_lock_wait_ms, || {
            self.try_commit(batch)
        })
        .await;

        match result {
            Ok(outcomes) => {
                tracing::debug!(
                    batch_size = batch.len(),
                    first_index = batch[0].index(),
                    "Batch committed"
                );
                outcomes
            }
            Err(err) => {
                let failure = BatchCommitError {
                    size: batch.len(),
                    reason: err.to_string(),
                };
                tracing::error!(
                    batch_size = batch.len(),
                    first_index = batch[0].index(),
                    error = %err,
                    "Batch rolled back"
                );
                let reason = failure.to_string();
                batch
                    .iter()
                    .map(|record| RecordOutcome::failed(record.index(), reason.clone()))
                    .collect()
            }
        }
    }

    /// One transaction attempt; dropping the transaction on error rolls back
    async fn try_commit(&self, batch: &[ResolvedRecord]) -> Result<Vec<RecordOutcome>> {
        let mut tx = begin_monitored(&self.db, "import::writer::commit_batch").await?;
        let mut outcomes = Vec::with_capacity(batch.len());

        for record in batch {
            let key = record.duplicate_key();
            if let DuplicateCheck::Duplicate { existing_id, kind } = find_duplicate(tx.conn()?, &key).await? {
                outcomes.push(RecordOutcome::skipped(record.index(), kind.reason(), existing_id));
                continue;
            }

            let id = insert_book(tx.conn()?, &record.to_new_book(Some(&self.created_by))).await?;
            outcomes.push(RecordOutcome::imported(record.index(), id));
        }

        tx.commit().await?;
        Ok(outcomes)
    }
}
