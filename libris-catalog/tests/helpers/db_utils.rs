//! Database Test Utilities
//!
//! File-backed temporary catalogs plus seeding helpers. Each pooled
//! connection sees the same database file, unlike `:memory:` pools.

use anyhow::Result;
use axum::body::Bytes;
use libris_catalog::config::ImportSettings;
use libris_catalog::db::books::{insert_book, NewBook};
use libris_catalog::import::{CallerIdentity, ImportPipeline, ImportRequest, SourceFormat};
use libris_common::text::normalize_key;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create temporary test database with the catalog schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_libris.db");
    let pool = libris_common::db::init_database(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Pipeline with default settings except the given batch size
pub fn test_pipeline(pool: &SqlitePool, batch_size: usize) -> ImportPipeline {
    let settings = ImportSettings {
        batch_size,
        ..ImportSettings::default()
    };
    ImportPipeline::new(pool.clone(), settings)
}

/// Import request from `caller` for a text payload
pub fn test_request(payload: &str, format: SourceFormat, caller: &str) -> ImportRequest {
    ImportRequest {
        payload: Bytes::copy_from_slice(payload.as_bytes()),
        format,
        caller: CallerIdentity::new(caller).expect("test caller id must not be blank"),
        batch_size: None,
    }
}

/// Insert (or fetch) an author by name, returning its id
pub async fn seed_author(pool: &SqlitePool, name: &str) -> i64 {
    libris_catalog::db::authors::insert_or_fetch_author(pool, name, 1000)
        .await
        .expect("seed author")
        .id
}

/// Insert a book directly, bypassing the pipeline
pub async fn seed_book(pool: &SqlitePool, title: &str, isbn: Option<&str>, author_ids: Vec<i64>) -> i64 {
    let mut conn = pool.acquire().await.expect("acquire connection");
    insert_book(
        &mut conn,
        &NewBook {
            title: title.to_string(),
            normalized_title: normalize_key(title),
            published_year: None,
            isbn: isbn.map(str::to_string),
            genre: None,
            language: None,
            author_ids,
            created_by: Some("seed".to_string()),
        },
    )
    .await
    .expect("seed book")
}

/// Row count of a catalog table
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    sqlx::query_scalar(&query)
        .fetch_one(pool)
        .await
        .expect("count rows")
}

/// Author ids linked to a book, in position order
pub async fn book_authors(pool: &SqlitePool, book_id: i64) -> Vec<i64> {
    sqlx::query_scalar("SELECT author_id FROM book_authors WHERE book_id = ? ORDER BY position")
        .bind(book_id)
        .fetch_all(pool)
        .await
        .expect("load book authors")
}

/// Make every insert of a book titled `title` fail inside SQLite
pub async fn install_poison_trigger(pool: &SqlitePool, title: &str) {
    let sql = format!(
        "CREATE TRIGGER reject_poison BEFORE INSERT ON books WHEN NEW.title = '{}'
         BEGIN SELECT RAISE(ABORT, 'poisoned record'); END",
        title.replace('\'', "''")
    );
    sqlx::query(&sql).execute(pool).await.expect("install trigger");
}

/// Make every insert of the author with match key `normalized_name` fail
pub async fn install_author_block(pool: &SqlitePool, normalized_name: &str) {
    let sql = format!(
        "CREATE TRIGGER reject_author BEFORE INSERT ON authors WHEN NEW.normalized_name = '{}'
         BEGIN SELECT RAISE(ABORT, 'author table frozen'); END",
        normalized_name.replace('\'', "''")
    );
    sqlx::query(&sql).execute(pool).await.expect("install author trigger");
}
