//! Bulk book import
//!
//! Staged pipeline that reads a CSV or JSON payload, validates each record,
//! resolves authors, filters duplicates and writes books in batches. Every
//! record read ends in exactly one outcome (imported, skipped or failed) and
//! one bad record never aborts the run.

pub mod aggregator;
pub mod dedup;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod source;
pub mod types;
pub mod validator;
pub mod writer;

pub use aggregator::{ImportSummary, OutcomeAggregator, RunStatus};
pub use error::{ImportError, StructuralError};
pub use pipeline::ImportPipeline;
pub use types::{
    CallerIdentity, ImportOutcome, ImportRequest, OutcomeStatus, RecordOutcome, SourceFormat,
};
