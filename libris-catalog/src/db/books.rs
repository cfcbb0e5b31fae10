//! Book database operations
//!
//! Books are never updated by the import path; the only writes here are
//! inserts. Duplicate lookups come in two flavours matching the duplicate
//! key precedence: by ISBN, and by (normalized title, author id set).

use super::AuthorId;
use libris_common::Result;
use serde::Serialize;
use sqlx::{Executor, Row, Sqlite, SqliteConnection, SqlitePool};

/// Catalog book identifier
pub type BookId = i64;

/// Book about to be inserted
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub normalized_title: String,
    pub published_year: Option<i32>,
    /// Canonical digit-only ISBN
    pub isbn: Option<String>,
    pub genre: Option<String>,
    pub language: Option<String>,
    /// Author ids in credit order
    pub author_ids: Vec<AuthorId>,
    /// Caller identity that imported the book
    pub created_by: Option<String>,
}

/// Stored book
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub published_year: Option<i32>,
    pub isbn: Option<String>,
    pub genre: Option<String>,
    pub language: Option<String>,
    pub author_ids: Vec<AuthorId>,
    pub created_by: Option<String>,
}

/// Order-independent key for an author id set ("3,17,42")
pub fn author_key(author_ids: &[AuthorId]) -> String {
    let mut ids = author_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Find a book by canonical ISBN
pub async fn find_book_by_isbn<'e, E>(executor: E, isbn: &str) -> Result<Option<BookId>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id: Option<BookId> = sqlx::query_scalar("SELECT id FROM books WHERE isbn = ? LIMIT 1")
        .bind(isbn)
        .fetch_optional(executor)
        .await?;
    Ok(id)
}

/// Find a book by normalized title and author key
pub async fn find_book_by_title_and_authors<'e, E>(
    executor: E,
    normalized_title: &str,
    author_key: &str,
) -> Result<Option<BookId>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id: Option<BookId> = sqlx::query_scalar(
        "SELECT id FROM books WHERE normalized_title = ? AND author_key = ? ORDER BY id LIMIT 1",
    )
    .bind(normalized_title)
    .bind(author_key)
    .fetch_optional(executor)
    .await?;
    Ok(id)
}

/// Insert a book and its author links on `conn`
///
/// Runs several statements, so callers pass a transaction's connection to
/// keep the book row and its links atomic.
pub async fn insert_book(conn: &mut SqliteConnection, book: &NewBook) -> Result<BookId> {
    let result = sqlx::query(
        r#"
        INSERT INTO books (
            title, normalized_title, published_year, isbn, genre, language,
            author_key, created_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(&book.title)
    .bind(&book.normalized_title)
    .bind(book.published_year)
    .bind(&book.isbn)
    .bind(&book.genre)
    .bind(&book.language)
    .bind(author_key(&book.author_ids))
    .bind(&book.created_by)
    .execute(&mut *conn)
    .await?;

    let book_id = result.last_insert_rowid();

    for (position, author_id) in book.author_ids.iter().enumerate() {
        sqlx::query(
            "INSERT OR IGNORE INTO book_authors (book_id, author_id, position) VALUES (?, ?, ?)",
        )
        .bind(book_id)
        .bind(author_id)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(book_id)
}

/// Load a book with its ordered author ids
pub async fn load_book(pool: &SqlitePool, id: BookId) -> Result<Option<Book>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, published_year, isbn, genre, language, created_by
        FROM books
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let author_ids: Vec<AuthorId> = sqlx::query_scalar(
        "SELECT author_id FROM book_authors WHERE book_id = ? ORDER BY position",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(Book {
        id: row.get("id"),
        title: row.get("title"),
        published_year: row.get("published_year"),
        isbn: row.get("isbn"),
        genre: row.get("genre"),
        language: row.get("language"),
        author_ids,
        created_by: row.get("created_by"),
    }))
}

/// Count book rows
pub async fn count_books(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::authors::insert_or_fetch_author;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let pool = libris_common::db::init_database(&temp_dir.path().join("libris.db"))
            .await
            .unwrap();
        (temp_dir, pool)
    }

    fn new_book(title: &str, isbn: Option<&str>, author_ids: Vec<AuthorId>) -> NewBook {
        NewBook {
            title: title.to_string(),
            normalized_title: libris_common::text::normalize_key(title),
            published_year: Some(1990),
            isbn: isbn.map(str::to_string),
            genre: None,
            language: None,
            author_ids,
            created_by: Some("tester".to_string()),
        }
    }

    #[test]
    fn test_author_key_is_order_independent() {
        assert_eq!(author_key(&[17, 3, 42]), "3,17,42");
        assert_eq!(author_key(&[42, 17, 3, 3]), author_key(&[3, 17, 42]));
    }

    #[tokio::test]
    async fn test_insert_and_load_book() {
        let (_dir, pool) = test_pool().await;
        let neil = insert_or_fetch_author(&pool, "Neil Gaiman", 5000).await.unwrap();
        let terry = insert_or_fetch_author(&pool, "Terry Pratchett", 5000).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let id = insert_book(
            &mut conn,
            &new_book("Good Omens", Some("9780060853983"), vec![terry.id, neil.id]),
        )
        .await
        .unwrap();
        drop(conn);

        let book = load_book(&pool, id).await.unwrap().expect("Book not found");
        assert_eq!(book.title, "Good Omens");
        assert_eq!(book.author_ids, vec![terry.id, neil.id]);
        assert_eq!(book.created_by.as_deref(), Some("tester"));

        assert_eq!(find_book_by_isbn(&pool, "9780060853983").await.unwrap(), Some(id));
        let key = author_key(&[neil.id, terry.id]);
        assert_eq!(
            find_book_by_title_and_authors(&pool, "good omens", &key).await.unwrap(),
            Some(id)
        );
        assert_eq!(count_books(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_isbn_rejected_by_storage() {
        let (_dir, pool) = test_pool().await;
        let author = insert_or_fetch_author(&pool, "Ursula K. Le Guin", 5000).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        insert_book(&mut conn, &new_book("The Dispossessed", Some("9780060512750"), vec![author.id]))
            .await
            .unwrap();
        let err = insert_book(&mut conn, &new_book("Copy", Some("9780060512750"), vec![author.id]))
            .await
            .unwrap_err();

        assert!(err.is_unique_violation());
    }
}
