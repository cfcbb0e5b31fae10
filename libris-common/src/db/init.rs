//! Database initialization
//!
//! Opens (or creates) the shared catalog database and makes sure every
//! catalog table exists. Table creation is idempotent, so every service
//! and every test helper can call it on startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout applied to every pooled connection
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = connect(db_path, 10).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_catalog_schema(&pool).await?;

    Ok(pool)
}

/// Open a connection pool on `db_path`
///
/// Pragmas are set through connect options so that every pooled connection
/// gets them, not just the first one:
/// - foreign keys on
/// - WAL journaling (concurrent readers with one writer)
/// - busy timeout, so writers wait for the lock before failing
pub async fn connect(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
    let db_url = format!("sqlite://{}", db_path.display());
    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create every catalog table and index (idempotent)
pub async fn create_catalog_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_authors_table(pool).await?;
    create_books_table(pool).await?;
    create_book_authors_table(pool).await?;

    info!("Catalog schema ready (settings, authors, books, book_authors)");
    Ok(())
}

/// Create the settings table
///
/// Stores runtime configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the authors table
///
/// `normalized_name` is UNIQUE: it is the final arbiter when two import runs
/// (or an import and ordinary traffic) create the same author concurrently.
pub async fn create_authors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the books table
///
/// `author_key` holds the sorted author id set ("3,17") so that the
/// title + authors duplicate check is one indexed lookup.
pub async fn create_books_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            normalized_title TEXT NOT NULL,
            published_year INTEGER,
            isbn TEXT UNIQUE,
            genre TEXT,
            language TEXT,
            author_key TEXT NOT NULL,
            created_by TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_books_title_authors ON books(normalized_title, author_key)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the book_authors linking table
pub async fn create_book_authors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS book_authors (
            book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            author_id INTEGER NOT NULL REFERENCES authors(id),
            position INTEGER NOT NULL,
            PRIMARY KEY (book_id, author_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_book_authors_author ON book_authors(author_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
