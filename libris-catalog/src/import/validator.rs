//! Record Validator
//!
//! Pure, storage-free checks that turn a [`RawRecord`] into a
//! [`ValidatedRecord`] or a failure reason. Rules are applied in field order
//! (title, authors, year, isbn, genre, language) and the first violation wins.

use super::error::{IsbnProblem, ValidationError};
use super::types::{AuthorName, RawRecord, ValidatedRecord};
use chrono::Datelike;
use libris_common::text::{collapse_whitespace, normalize_key, title_case};
use serde_json::Value;
use std::collections::HashSet;

/// Earliest accepted publication year (movable type)
pub const MIN_PUBLICATION_YEAR: i32 = 1450;

const TITLE_FIELDS: &[&str] = &["title"];
const AUTHOR_FIELDS: &[&str] = &["authors", "author"];
const YEAR_FIELDS: &[&str] = &["year", "published_year"];
const ISBN_FIELDS: &[&str] = &["isbn"];
const GENRE_FIELDS: &[&str] = &["genre"];
const LANGUAGE_FIELDS: &[&str] = &["language"];

/// Separator between names in a single author string
const AUTHOR_SEPARATOR: char = ';';

#[derive(Debug, Clone)]
pub struct RecordValidator {
    max_year: i32,
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordValidator {
    /// Validator accepting years up to next calendar year
    pub fn new() -> Self {
        Self::with_max_year(chrono::Utc::now().year() + 1)
    }

    pub fn with_max_year(max_year: i32) -> Self {
        Self { max_year }
    }

    pub fn validate(&self, raw: RawRecord) -> Result<ValidatedRecord, ValidationError> {
        let title = parse_title(raw.get_any(TITLE_FIELDS))?;
        let authors = parse_authors(raw.get_any(AUTHOR_FIELDS))?;
        let published_year = self.parse_year(raw.get_any(YEAR_FIELDS))?;
        let isbn = parse_isbn(raw.get_any(ISBN_FIELDS))?;
        let genre = parse_choice(raw.get_any(GENRE_FIELDS), ValidationError::InvalidGenre)?;
        let language = parse_choice(raw.get_any(LANGUAGE_FIELDS), ValidationError::InvalidLanguage)?;

        Ok(ValidatedRecord {
            index: raw.index,
            title,
            authors,
            published_year,
            isbn,
            genre,
            language,
        })
    }

    fn parse_year(&self, value: Option<&Value>) -> Result<Option<i32>, ValidationError> {
        let Some(raw) = scalar_text(value) else {
            return match value {
                Some(other) if !other.is_null() => Err(ValidationError::InvalidYear(other.to_string())),
                _ => Ok(None),
            };
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let year = parse_whole_number(&raw).ok_or_else(|| ValidationError::InvalidYear(raw.clone()))?;
        if year < i64::from(MIN_PUBLICATION_YEAR) || year > i64::from(self.max_year) {
            return Err(ValidationError::YearOutOfRange {
                value: raw,
                min: MIN_PUBLICATION_YEAR,
                max: self.max_year,
            });
        }
        // Range check above bounds it to i32
        Ok(Some(year as i32))
    }
}

/// Trimmed text of a string, number or boolean value
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integer value of "1965", "1965.0" or " 1965 "; rejects fractions
fn parse_whole_number(raw: &str) -> Option<i64> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e9 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_title(value: Option<&Value>) -> Result<String, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::MissingTitle),
        Some(Value::String(s)) => {
            let title = s.trim();
            if title.is_empty() {
                Err(ValidationError::MissingTitle)
            } else {
                Ok(title.to_string())
            }
        }
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(ValidationError::InvalidTitle(other.to_string())),
    }
}

/// Author list from a ';'-separated string or an array of strings
///
/// Blank entries are dropped; repeated names (by match key) keep the first.
fn parse_authors(value: Option<&Value>) -> Result<Vec<AuthorName>, ValidationError> {
    let names: Vec<String> = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s.split(AUTHOR_SEPARATOR).map(str::to_string).collect(),
        Some(Value::Array(items)) => {
            let mut names = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => names.push(s.clone()),
                    Value::Null => {}
                    other => return Err(ValidationError::InvalidAuthor(other.to_string())),
                }
            }
            names
        }
        Some(other) => return Err(ValidationError::InvalidAuthor(other.to_string())),
    };

    let mut seen = HashSet::new();
    let mut authors = Vec::with_capacity(names.len());
    for raw in names {
        let name = collapse_whitespace(&raw);
        if name.is_empty() {
            continue;
        }
        let match_name = title_case(&name);
        if seen.insert(normalize_key(&match_name)) {
            authors.push(AuthorName { name, match_name });
        }
    }

    if authors.is_empty() {
        return Err(ValidationError::MissingAuthor);
    }
    Ok(authors)
}

/// Digits-only ISBN; hyphens and whitespace are stripped first
fn parse_isbn(value: Option<&Value>) -> Result<Option<String>, ValidationError> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(ValidationError::InvalidIsbn {
                value: other.to_string(),
                problem: IsbnProblem::NonDigit,
            })
        }
    };
    if raw.is_empty() {
        return Ok(None);
    }

    let digits: String = raw
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect();

    let invalid = |problem| ValidationError::InvalidIsbn {
        value: raw.clone(),
        problem,
    };

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(IsbnProblem::NonDigit));
    }
    match digits.len() {
        10 => Ok(Some(digits)),
        13 if isbn13_checksum_ok(&digits) => Ok(Some(digits)),
        13 => Err(invalid(IsbnProblem::CheckDigit)),
        n => Err(invalid(IsbnProblem::WrongLength(n))),
    }
}

/// ISBN-13 check: alternating 1/3 weights sum to a multiple of 10
fn isbn13_checksum_ok(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 0 {
                d
            } else {
                d * 3
            }
        })
        .sum();
    sum % 10 == 0
}

/// Optional closed-set field (genre, language)
fn parse_choice<T: std::str::FromStr>(
    value: Option<&Value>,
    invalid: fn(String) -> ValidationError,
) -> Result<Option<T>, ValidationError> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => return Err(invalid(other.to_string())),
    };
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|_| invalid(raw))
}
