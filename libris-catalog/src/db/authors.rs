//! Author database operations
//!
//! Authors are identified by their normalized name (case-folded, whitespace
//! collapsed). The UNIQUE constraint on `normalized_name` decides races
//! between concurrent creators; [`insert_or_fetch_author`] turns a lost race
//! into a fetch of the winner's row.

use crate::utils::retry_on_lock;
use libris_common::text::author_match_key;
use libris_common::{Error, Result};
use serde::Serialize;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

/// Catalog author identifier
pub type AuthorId = i64;

/// Insert attempts before giving up on a name that keeps vanishing between
/// the failed insert and the re-fetch (only possible if rows get deleted).
const MAX_INSERT_ATTEMPTS: u32 = 3;

/// Author record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    pub normalized_name: String,
}

/// Load author by normalized name
pub async fn find_author_by_normalized_name<'e, E>(
    executor: E,
    normalized_name: &str,
) -> Result<Option<Author>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT id, name, normalized_name FROM authors WHERE normalized_name = ?")
        .bind(normalized_name)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(|row| Author {
        id: row.get("id"),
        name: row.get("name"),
        normalized_name: row.get("normalized_name"),
    }))
}

/// Insert a new author row, failing with a unique violation if the
/// normalized name already exists
pub async fn insert_author(pool: &SqlitePool, name: &str, normalized_name: &str) -> Result<AuthorId> {
    let result = sqlx::query(
        "INSERT INTO authors (name, normalized_name, created_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
    )
    .bind(name)
    .bind(normalized_name)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Fetch the author matching `name`, creating it if absent
///
/// Insert-or-fetch loop: look up, attempt the insert, and on a uniqueness
/// violation (another run or request created the row in between) re-fetch
/// and use the existing row. Lock contention on the insert is retried with
/// backoff up to `max_lock_wait_ms`.
pub async fn insert_or_fetch_author(
    pool: &SqlitePool,
    name: &str,
    max_lock_wait_ms: u64,
) -> Result<Author> {
    let normalized_name = author_match_key(name);
    if normalized_name.is_empty() {
        return Err(Error::InvalidInput("author name is blank".to_string()));
    }

    for attempt in 1..=MAX_INSERT_ATTEMPTS {
        if let Some(author) = find_author_by_normalized_name(pool, &normalized_name).await? {
            return Ok(author);
        }

        let inserted = retry_on_lock("author insert", max_lock_wait_ms, || {
            insert_author(pool, name, &normalized_name)
        })
        .await;

        match inserted {
            Ok(id) => {
                tracing::debug!(author_id = id, name = %name, "Created author");
                return Ok(Author {
                    id,
                    name: name.to_string(),
                    normalized_name,
                });
            }
            Err(err) if err.is_unique_violation() => {
                tracing::debug!(
                    name = %name,
                    attempt,
                    "Author created concurrently, fetching existing row"
                );
            }
            Err(err) => return Err(err),
        }
    }

    Err(Error::Internal(format!(
        "author '{}' could not be inserted or fetched after {} attempts",
        name, MAX_INSERT_ATTEMPTS
    )))
}

/// Count author rows
pub async fn count_authors(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
