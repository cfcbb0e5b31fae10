//! Import error taxonomy
//!
//! Two tiers:
//! - Run-level ([`ImportError`]): the request produces no summary
//! - Record-level ([`ValidationError`], [`ResolutionError`],
//!   [`DuplicateCheckError`], [`BatchCommitError`]): the record becomes a
//!   `Failed` outcome whose reason is the error's display text

use thiserror::Error;

/// Payload problems that make the whole source unreadable
#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("CSV payload is empty (no header row)")]
    EmptyCsv,

    #[error("invalid CSV header: {0}")]
    InvalidCsvHeader(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("JSON payload must be an array of book objects, found {0}")]
    NotAnArray(&'static str),
}

/// Run-level failure
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Pipeline bookkeeping broke (stage panicked, records unaccounted for)
    #[error("Internal import error: {0}")]
    Internal(String),

    #[error(transparent)]
    Common(#[from] libris_common::Error),
}

/// Longest raw value quoted back in a reason
const MAX_QUOTED_CHARS: usize = 40;

/// Quote a raw field value for a failure reason, truncated if long
pub(crate) fn quote(raw: &str) -> String {
    if raw.chars().count() > MAX_QUOTED_CHARS {
        let head: String = raw.chars().take(MAX_QUOTED_CHARS).collect();
        format!("'{}...'", head)
    } else {
        format!("'{}'", raw)
    }
}

/// Record rejected before touching storage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed row: expected {expected} fields, found {found}")]
    MalformedRow { expected: u64, found: u64 },

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("missing title")]
    MissingTitle,

    #[error("invalid title: {}", quote(.0))]
    InvalidTitle(String),

    #[error("missing author")]
    MissingAuthor,

    #[error("invalid author: {}", quote(.0))]
    InvalidAuthor(String),

    #[error("invalid year: {}", quote(.0))]
    InvalidYear(String),

    #[error("year out of range: {} (allowed {min}..={max})", quote(.value))]
    YearOutOfRange { value: String, min: i32, max: i32 },

    #[error("invalid isbn {}: {problem}", quote(.value))]
    InvalidIsbn { value: String, problem: IsbnProblem },

    #[error("invalid genre: {}", quote(.0))]
    InvalidGenre(String),

    #[error("invalid language: {}", quote(.0))]
    InvalidLanguage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IsbnProblem {
    #[error("contains non-digit characters")]
    NonDigit,

    #[error("wrong length ({0} digits, expected 10 or 13)")]
    WrongLength(usize),

    #[error("check digit mismatch")]
    CheckDigit,
}

/// An author of the record could not be resolved to an id
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("author resolution failed for {}: {reason}", quote(.name))]
pub struct ResolutionError {
    pub name: String,
    pub reason: String,
}

/// Existence check against storage failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate check failed: {0}")]
pub struct DuplicateCheckError(pub String);

/// Batch transaction rolled back; every record of the batch fails with this
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("batch of {size} records rolled back: {reason}")]
pub struct BatchCommitError {
    pub size: usize,
    pub reason: String,
}
