//! Record types flowing between import stages
//!
//! Each stage consumes one type and produces the next:
//! `RawRecord` → `ValidatedRecord` → `ResolvedRecord` → `RecordOutcome`.
//! Every record carries its origin index from the source so outcomes can be
//! reported in source order no matter how stages interleave.

use crate::db::books::{author_key, NewBook};
use axum::body::Bytes;
use crate::db::{AuthorId, BookId};
use libris_common::text::normalize_key;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 1-based position of a record in its source
pub type OriginIndex = usize;

/// Payload encoding of an import source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Json,
}

impl SourceFormat {
    /// Parse an explicit format name ("csv", "json", case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Infer the format from a filename extension
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, extension) = filename.trim().rsplit_once('.')?;
        Self::from_name(extension)
    }

    /// Infer the format from a Content-Type header value (parameters ignored)
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/csv" | "application/csv" => Some(Self::Csv),
            "application/json" | "text/json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Csv => write!(f, "csv"),
            SourceFormat::Json => write!(f, "json"),
        }
    }
}

/// Opaque identity of whoever submitted an import
///
/// Recorded on every created book as `created_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    /// Build an identity from a caller id, `None` if blank
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One import request: the whole payload plus how to read it
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Request body as buffered by the HTTP layer, shared rather than copied
    pub payload: Bytes,
    pub format: SourceFormat,
    pub caller: CallerIdentity,
    /// Per-request batch size override, clamped to the configured bounds
    pub batch_size: Option<usize>,
}

/// Untyped field map read from the source
///
/// Field names are trimmed and lowercased. For CSV every value is a JSON
/// string; empty cells are not present at all.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub index: OriginIndex,
    fields: Vec<(String, serde_json::Value)>,
}

impl RawRecord {
    pub fn new(index: OriginIndex, fields: Vec<(String, serde_json::Value)>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(name, value)| (name.trim().to_lowercase(), value))
            .collect();
        Self { index, fields }
    }

    /// First value stored under `name` (already lowercased)
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// First present, non-null value among several field aliases
    pub fn get_any(&self, names: &[&str]) -> Option<&serde_json::Value> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .find(|value| !value.is_null())
    }
}

/// Closed set of accepted genres, stored upper-case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Genre {
    Fiction,
    NonFiction,
    Science,
    History,
    Fantasy,
    Comedy,
    Drama,
}

impl Genre {
    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Fiction => "FICTION",
            Genre::NonFiction => "NON_FICTION",
            Genre::Science => "SCIENCE",
            Genre::History => "HISTORY",
            Genre::Fantasy => "FANTASY",
            Genre::Comedy => "COMEDY",
            Genre::Drama => "DRAMA",
        }
    }
}

impl FromStr for Genre {
    type Err = ();

    /// Case-insensitive; spaces and hyphens read as underscores
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key: String = value
            .trim()
            .to_uppercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match key.as_str() {
            "FICTION" => Ok(Genre::Fiction),
            "NON_FICTION" => Ok(Genre::NonFiction),
            "SCIENCE" => Ok(Genre::Science),
            "HISTORY" => Ok(Genre::History),
            "FANTASY" => Ok(Genre::Fantasy),
            "COMEDY" => Ok(Genre::Comedy),
            "DRAMA" => Ok(Genre::Drama),
            _ => Err(()),
        }
    }
}

/// Closed set of accepted languages, stored upper-case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Language {
    English,
    Ukrainian,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "ENGLISH",
            Language::Ukrainian => "UKRAINIAN",
        }
    }
}

impl FromStr for Language {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "ENGLISH" => Ok(Language::English),
            "UKRAINIAN" => Ok(Language::Ukrainian),
            _ => Err(()),
        }
    }
}

/// Author name as it appeared in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorName {
    /// Whitespace-collapsed name in original casing (stored on creation)
    pub name: String,
    /// Title-cased form used for matching
    pub match_name: String,
}

/// Record that passed every validation rule
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub index: OriginIndex,
    pub title: String,
    /// Distinct by match key, in source order; never empty
    pub authors: Vec<AuthorName>,
    pub published_year: Option<i32>,
    /// Digits only, 10 or 13 long
    pub isbn: Option<String>,
    pub genre: Option<Genre>,
    pub language: Option<Language>,
}

/// Validated record with every author mapped to a catalog id
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    pub record: ValidatedRecord,
    /// Parallel to `record.authors`
    pub author_ids: Vec<AuthorId>,
}

/// Key a resolved record is matched on against existing books
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateKey {
    Isbn(String),
    TitleAndAuthors {
        normalized_title: String,
        author_key: String,
    },
}

impl ResolvedRecord {
    pub fn index(&self) -> OriginIndex {
        self.record.index
    }

    /// ISBN when present, otherwise normalized title plus author set
    pub fn duplicate_key(&self) -> DuplicateKey {
        match &self.record.isbn {
            Some(isbn) => DuplicateKey::Isbn(isbn.clone()),
            None => DuplicateKey::TitleAndAuthors {
                normalized_title: normalize_key(&self.record.title),
                author_key: author_key(&self.author_ids),
            },
        }
    }

    pub fn to_new_book(&self, created_by: Option<&CallerIdentity>) -> NewBook {
        NewBook {
            title: self.record.title.clone(),
            normalized_title: normalize_key(&self.record.title),
            published_year: self.record.published_year,
            isbn: self.record.isbn.clone(),
            genre: self.record.genre.map(|g| g.as_str().to_string()),
            language: self.record.language.map(|l| l.as_str().to_string()),
            author_ids: self.author_ids.clone(),
            created_by: created_by.map(|c| c.as_str().to_string()),
        }
    }
}

/// Terminal result for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { id: BookId },
    Skipped { reason: String, existing_id: BookId },
    Failed { reason: String },
}

impl ImportOutcome {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            ImportOutcome::Imported { .. } => OutcomeStatus::Imported,
            ImportOutcome::Skipped { .. } => OutcomeStatus::Skipped,
            ImportOutcome::Failed { .. } => OutcomeStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Imported,
    Skipped,
    Failed,
}

/// Outcome tagged with the record's origin index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub index: OriginIndex,
    pub outcome: ImportOutcome,
}

impl RecordOutcome {
    pub fn imported(index: OriginIndex, id: BookId) -> Self {
        Self {
            index,
            outcome: ImportOutcome::Imported { id },
        }
    }

    pub fn skipped(index: OriginIndex, reason: impl Into<String>, existing_id: BookId) -> Self {
        Self {
            index,
            outcome: ImportOutcome::Skipped {
                reason: reason.into(),
                existing_id,
            },
        }
    }

    pub fn failed(index: OriginIndex, reason: impl Into<String>) -> Self {
        Self {
            index,
            outcome: ImportOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        self.outcome.status()
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.outcome {
            ImportOutcome::Imported { .. } => None,
            ImportOutcome::Skipped { reason, .. } | ImportOutcome::Failed { reason } => Some(reason),
        }
    }

    /// Created book id for imports, existing book id for skips
    pub fn book_id(&self) -> Option<BookId> {
        match &self.outcome {
            ImportOutcome::Imported { id } => Some(*id),
            ImportOutcome::Skipped { existing_id, .. } => Some(*existing_id),
            ImportOutcome::Failed { .. } => None,
        }
    }
}

/// Wire form of one outcome in the summary `details` list
#[derive(Serialize)]
struct OutcomeDetail<'a> {
    index: OriginIndex,
    status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<BookId>,
}

impl Serialize for RecordOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        OutcomeDetail {
            index: self.index,
            status: self.status(),
            reason: self.reason(),
            id: self.book_id(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_inference() {
        assert_eq!(SourceFormat::from_name("CSV"), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::from_filename("books.JSON"), Some(SourceFormat::Json));
        assert_eq!(SourceFormat::from_filename("books.xlsx"), None);
        assert_eq!(SourceFormat::from_filename("books"), None);
        assert_eq!(
            SourceFormat::from_content_type("text/csv; charset=utf-8"),
            Some(SourceFormat::Csv)
        );
        assert_eq!(SourceFormat::from_content_type("application/octet-stream"), None);
    }

    #[test]
    fn test_blank_caller_rejected() {
        assert!(CallerIdentity::new("   ").is_none());
        assert_eq!(CallerIdentity::new(" alice ").unwrap().as_str(), "alice");
    }

    #[test]
    fn test_raw_record_field_lookup() {
        let raw = RawRecord::new(
            1,
            vec![
                (" Title ".to_string(), json!("Dune")),
                ("year".to_string(), serde_json::Value::Null),
                ("published_year".to_string(), json!(1965)),
            ],
        );
        assert_eq!(raw.get("title"), Some(&json!("Dune")));
        assert_eq!(raw.get_any(&["year", "published_year"]), Some(&json!(1965)));
        assert_eq!(raw.get("isbn"), None);
    }

    #[test]
    fn test_genre_and_language_parsing() {
        assert_eq!("fantasy".parse::<Genre>(), Ok(Genre::Fantasy));
        assert_eq!("non-fiction".parse::<Genre>(), Ok(Genre::NonFiction));
        assert_eq!("Non Fiction".parse::<Genre>(), Ok(Genre::NonFiction));
        assert!("cookbook".parse::<Genre>().is_err());
        assert_eq!("english".parse::<Language>(), Ok(Language::English));
        assert_eq!(" Ukrainian ".parse::<Language>(), Ok(Language::Ukrainian));
        assert!("klingon".parse::<Language>().is_err());
    }

    #[test]
    fn test_outcome_detail_serialization() {
        let failed = serde_json::to_value(RecordOutcome::failed(1, "missing title")).unwrap();
        assert_eq!(failed, json!({"index": 1, "status": "failed", "reason": "missing title"}));

        let imported = serde_json::to_value(RecordOutcome::imported(2, 40)).unwrap();
        assert_eq!(imported, json!({"index": 2, "status": "imported", "id": 40}));

        let skipped = serde_json::to_value(RecordOutcome::skipped(3, "duplicate isbn", 7)).unwrap();
        assert_eq!(
            skipped,
            json!({"index": 3, "status": "skipped", "reason": "duplicate isbn", "id": 7})
        );
    }
}
