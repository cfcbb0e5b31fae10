//! Duplicate Detector
//!
//! Decides whether a resolved record already exists in the catalog.
//! Matching precedence: ISBN when the record has one, otherwise normalized
//! title plus the exact set of resolved author ids.
//!
//! The check here runs against the pool and only filters early. The batch
//! writer repeats it inside its transaction (via [`find_duplicate`]) so books
//! created after this check, including earlier records of the same run, are
//! still caught.

use super::error::DuplicateCheckError;
use super::types::{DuplicateKey, ResolvedRecord};
use crate::db::books::{find_book_by_isbn, find_book_by_title_and_authors};
use crate::db::BookId;
use libris_common::Result;
use sqlx::{Executor, Sqlite, SqlitePool};

/// Which key matched an existing book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    Isbn,
    TitleAndAuthors,
}

impl DuplicateKind {
    /// Skip reason reported for the record
    pub fn reason(&self) -> &'static str {
        match self {
            DuplicateKind::Isbn => "duplicate isbn",
            DuplicateKind::TitleAndAuthors => "duplicate title and authors",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// No matching book, continue to the writer
    Unique,
    /// Matching book exists, skip the record
    Duplicate { existing_id: BookId, kind: DuplicateKind },
}

/// Look up an existing book for `key` on any executor (pool or transaction)
pub async fn find_duplicate<'e, E>(executor: E, key: &DuplicateKey) -> Result<DuplicateCheck>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found = match key {
        DuplicateKey::Isbn(isbn) => find_book_by_isbn(executor, isbn)
            .await?
            .map(|id| (id, DuplicateKind::Isbn)),
        DuplicateKey::TitleAndAuthors {
            normalized_title,
            author_key,
        } => find_book_by_title_and_authors(executor, normalized_title, author_key)
            .await?
            .map(|id| (id, DuplicateKind::TitleAndAuthors)),
    };

    Ok(match found {
        Some((existing_id, kind)) => DuplicateCheck::Duplicate { existing_id, kind },
        None => DuplicateCheck::Unique,
    })
}

pub struct DuplicateDetector {
    db: SqlitePool,
}

impl DuplicateDetector {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn check(&self, record: &ResolvedRecord) -> std::result::Result<DuplicateCheck, DuplicateCheckError> {
        let key = record.duplicate_key();
        let check = find_duplicate(&self.db, &key).await.map_err(|err| {
            tracing::warn!(index = record.index(), error = %err, "Duplicate check failed");
            DuplicateCheckError(err.to_string())
        })?;

        if let DuplicateCheck::Duplicate { existing_id, kind } = &check {
            tracing::debug!(
                index = record.index(),
                existing_id,
                reason = kind.reason(),
                "Record matches existing book"
            );
        }
        Ok(check)
    }
}
