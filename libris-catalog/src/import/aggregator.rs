//! Outcome Aggregator
//!
//! Collects the terminal outcome of every record, in whatever order stages
//! emit them, and produces the run summary ordered by origin index.

use super::types::{OriginIndex, OutcomeStatus, RecordOutcome};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Result of one import run
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    /// One entry per record, ascending by origin index
    pub details: Vec<RecordOutcome>,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.imported + self.skipped + self.failed
    }
}

#[derive(Debug, Default)]
pub struct OutcomeAggregator {
    outcomes: Vec<RecordOutcome>,
    seen: HashSet<OriginIndex>,
    imported: usize,
    skipped: usize,
    failed: usize,
}

impl OutcomeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a terminal outcome; returns false if the index already had one
    pub fn record(&mut self, outcome: RecordOutcome) -> bool {
        if !self.seen.insert(outcome.index) {
            tracing::error!(index = outcome.index, "Second outcome for record ignored");
            return false;
        }
        match outcome.status() {
            OutcomeStatus::Imported => self.imported += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
        true
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn finish(mut self, run_id: Uuid, status: RunStatus) -> ImportSummary {
        self.outcomes.sort_by_key(|outcome| outcome.index);
        ImportSummary {
            run_id,
            status,
            imported: self.imported,
            skipped: self.skipped,
            failed: self.failed,
            details: self.outcomes,
        }
    }
}
