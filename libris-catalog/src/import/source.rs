//! Source Reader
//!
//! Turns an import payload into a lazy sequence of [`RawRecord`]s, each tagged
//! with its 1-based origin index. Structural problems (no CSV header, JSON that
//! is not an array) are reported by [`RecordSource::open`] before any record
//! is produced. A single malformed row or element yields a per-record failure
//! and reading continues.

use super::error::{StructuralError, ValidationError};
use super::types::{OriginIndex, RawRecord, SourceFormat};
use axum::body::Bytes;
use serde_json::Value;
use std::io::Cursor;

/// Per-record read failure (malformed row or element)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub index: OriginIndex,
    pub error: ValidationError,
}

pub type SourceItem = Result<RawRecord, MalformedRecord>;

/// Lazy record reader over an in-memory payload
pub enum RecordSource {
    Csv(CsvSource),
    Json(JsonSource),
}

impl RecordSource {
    /// Open the payload, failing on structural errors
    pub fn open(payload: Bytes, format: SourceFormat) -> Result<Self, StructuralError> {
        match format {
            SourceFormat::Csv => CsvSource::open(payload).map(RecordSource::Csv),
            SourceFormat::Json => JsonSource::open(&payload).map(RecordSource::Json),
        }
    }
}

impl Iterator for RecordSource {
    type Item = SourceItem;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RecordSource::Csv(source) => source.next(),
            RecordSource::Json(source) => source.next(),
        }
    }
}

/// CSV rows keyed by the header row
///
/// Rows whose field count differs from the header are malformed. Empty cells
/// are left out of the record, so they read as absent fields.
pub struct CsvSource {
    headers: Vec<String>,
    rows: csv::ByteRecordsIntoIter<Cursor<Bytes>>,
    next_index: OriginIndex,
}

impl CsvSource {
    fn open(payload: Bytes) -> Result<Self, StructuralError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(Cursor::new(payload));

        let header_row = reader
            .byte_headers()
            .map_err(|e| StructuralError::InvalidCsvHeader(e.to_string()))?;

        if header_row.is_empty() {
            return Err(StructuralError::EmptyCsv);
        }

        let mut headers = Vec::with_capacity(header_row.len());
        for (column, raw) in header_row.iter().enumerate() {
            let name = std::str::from_utf8(raw).map_err(|_| {
                StructuralError::InvalidCsvHeader(format!("column {} is not valid UTF-8", column + 1))
            })?;
            // A BOM from spreadsheet exports sticks to the first header
            let name = name.trim_start_matches('\u{feff}').trim().to_lowercase();
            if name.is_empty() {
                return Err(StructuralError::InvalidCsvHeader(format!(
                    "column {} has no name",
                    column + 1
                )));
            }
            headers.push(name);
        }

        tracing::debug!(columns = ?headers, "Opened CSV source");

        Ok(Self {
            headers,
            rows: reader.into_byte_records(),
            next_index: 1,
        })
    }

    fn row_to_record(&self, index: OriginIndex, row: &csv::ByteRecord) -> SourceItem {
        let mut fields = Vec::with_capacity(self.headers.len());
        for (name, cell) in self.headers.iter().zip(row.iter()) {
            let text = std::str::from_utf8(cell).map_err(|_| MalformedRecord {
                index,
                error: ValidationError::MalformedRecord(format!("field '{}' is not valid UTF-8", name)),
            })?;
            if text.trim().is_empty() {
                continue;
            }
            fields.push((name.clone(), Value::String(text.to_string())));
        }
        Ok(RawRecord::new(index, fields))
    }
}

impl Iterator for CsvSource {
    type Item = SourceItem;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        let index = self.next_index;
        self.next_index += 1;

        match row {
            Ok(row) => Some(self.row_to_record(index, &row)),
            Err(err) => {
                let error = match err.kind() {
                    csv::ErrorKind::UnequalLengths {
                        expected_len, len, ..
                    } => ValidationError::MalformedRow {
                        expected: *expected_len,
                        found: *len,
                    },
                    other => ValidationError::MalformedRecord(format!("{:?}", other)),
                };
                Some(Err(MalformedRecord { index, error }))
            }
        }
    }
}

/// Elements of a top-level JSON array
///
/// The document is parsed up front so syntax errors anywhere in it are
/// structural; elements are then handed out one at a time.
pub struct JsonSource {
    elements: std::vec::IntoIter<Value>,
    next_index: OriginIndex,
}

impl JsonSource {
    fn open(payload: &[u8]) -> Result<Self, StructuralError> {
        let document: Value = serde_json::from_slice(payload)
            .map_err(|e| StructuralError::InvalidJson(e.to_string()))?;

        let elements = match document {
            Value::Array(elements) => elements,
            other => return Err(StructuralError::NotAnArray(json_kind(&other))),
        };

        tracing::debug!(elements = elements.len(), "Opened JSON source");

        Ok(Self {
            elements: elements.into_iter(),
            next_index: 1,
        })
    }
}

impl Iterator for JsonSource {
    type Item = SourceItem;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.elements.next()?;
        let index = self.next_index;
        self.next_index += 1;

        Some(match element {
            Value::Object(map) => Ok(RawRecord::new(index, map.into_iter().collect())),
            other => Err(MalformedRecord {
                index,
                error: ValidationError::MalformedRecord(format!(
                    "expected object, found {}",
                    json_kind(&other)
                )),
            }),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
