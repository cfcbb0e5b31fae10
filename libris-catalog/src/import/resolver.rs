//! Author Resolver
//!
//! Maps every author name of a validated record to a catalog author id,
//! creating authors that do not exist yet.
//!
//! Within a run, an [`AuthorArena`] keeps one shared slot per match key. The
//! first record to need a name fills the slot through the database
//! insert-or-fetch loop; concurrent records with the same name wait on that
//! slot instead of racing their own inserts. A failure is stored in the slot
//! too, so every record waiting on the name fails with the same error, and
//! the slot is then evicted so later records try the database again. Across
//! runs, the UNIQUE index on `authors.normalized_name` settles races (see
//! [`crate::db::authors::insert_or_fetch_author`]).

use super::error::ResolutionError;
use super::types::{AuthorName, ResolvedRecord, ValidatedRecord};
use crate::db::authors::insert_or_fetch_author;
use crate::db::AuthorId;
use libris_common::text::normalize_key;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

type AuthorSlot = Arc<OnceCell<Result<AuthorId, ResolutionError>>>;

/// Run-scoped map from author match key to resolution result
#[derive(Default)]
pub struct AuthorArena {
    slots: Mutex<HashMap<String, AuthorSlot>>,
}

impl AuthorArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared slot for `key`, created empty on first request
    async fn slot(&self, key: &str) -> AuthorSlot {
        let mut slots = self.slots.lock().await;
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Drop a failed slot unless a newer one already replaced it
    async fn evict(&self, key: &str, failed: &AuthorSlot) {
        let mut slots = self.slots.lock().await;
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, failed)) {
            slots.remove(key);
        }
    }

    /// Number of distinct names resolved so far
    pub async fn resolved_count(&self) -> usize {
        let slots = self.slots.lock().await;
        slots
            .values()
            .filter(|slot| matches!(slot.get(), Some(Ok(_))))
            .count()
    }
}

pub struct AuthorResolver {
    db: SqlitePool,
    arena: AuthorArena,
    max_lock_wait_ms: u64,
}

impl AuthorResolver {
    pub fn new(db: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            arena: AuthorArena::new(),
            max_lock_wait_ms,
        }
    }

    /// Resolve all authors of `record`; the first failing name fails the record
    pub async fn resolve(&self, record: ValidatedRecord) -> Result<ResolvedRecord, ResolutionError> {
        let mut author_ids = Vec::with_capacity(record.authors.len());
        for author in &record.authors {
            author_ids.push(self.resolve_name(author).await?);
        }
        Ok(ResolvedRecord { record, author_ids })
    }

    /// Id for one author name
    pub async fn resolve_name(&self, author: &AuthorName) -> Result<AuthorId, ResolutionError> {
        let key = normalize_key(&author.match_name);
        let slot = self.arena.slot(&key).await;

        let result = slot
            .get_or_init(|| async {
                insert_or_fetch_author(&self.db, &author.name, self.max_lock_wait_ms)
                    .await
                    .map(|stored| stored.id)
                    .map_err(|err| {
                        tracing::warn!(author = %author.name, error = %err, "Author resolution failed");
                        ResolutionError {
                            name: author.name.clone(),
                            reason: err.to_string(),
                        }
                    })
            })
            .await
            .clone();

        if result.is_err() {
            self.arena.evict(&key, &slot).await;
        }
        result
    }

    pub fn arena(&self) -> &AuthorArena {
        &self.arena
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::authors::count_authors;
    use libris_common::text::title_case;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let pool = libris_common::db::init_database(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (temp_dir, pool)
    }

    fn author(name: &str) -> AuthorName {
        AuthorName {
            name: name.to_string(),
            match_name: title_case(name),
        }
    }

    fn record(index: usize, authors: &[&str]) -> ValidatedRecord {
        ValidatedRecord {
            index,
            title: format!("Book {}", index),
            authors: authors.iter().map(|name| author(name)).collect(),
            published_year: None,
            isbn: None,
            genre: None,
            language: None,
        }
    }

    #[tokio::test]
    async fn test_same_name_resolves_once_per_run() {
        let (_dir, pool) = test_pool().await;
        let resolver = Arc::new(AuthorResolver::new(pool.clone(), 1000));

        let mut handles = Vec::new();
        for i in 0..8 {
            let resolver = Arc::clone(&resolver);
            let name = if i % 2 == 0 { "Jane Austen" } else { "JANE  austen" };
            handles.push(tokio::spawn(async move {
                resolver.resolve(record(i, &[name])).await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.extend(handle.await.unwrap().author_ids);
        }
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 1, "every record should share one author id");
        assert_eq!(count_authors(&pool).await.unwrap(), 1);
        assert_eq!(resolver.arena().resolved_count().await, 1);
    }

    #[tokio::test]
    async fn test_author_ids_follow_author_order() {
        let (_dir, pool) = test_pool().await;
        let resolver = AuthorResolver::new(pool, 1000);

        let first = resolver.resolve(record(1, &["Terry Pratchett"])).await.unwrap();
        let both = resolver
            .resolve(record(2, &["Neil Gaiman", "Terry Pratchett"]))
            .await
            .unwrap();

        assert_eq!(both.author_ids.len(), 2);
        assert_eq!(both.author_ids[1], first.author_ids[0]);
        assert_ne!(both.author_ids[0], both.author_ids[1]);
    }

    #[tokio::test]
    async fn test_existing_author_reused_across_resolvers() {
        let (_dir, pool) = test_pool().await;

        let first_run = AuthorResolver::new(pool.clone(), 1000);
        let a = first_run.resolve_name(&author("Ursula K. Le Guin")).await.unwrap();

        let second_run = AuthorResolver::new(pool.clone(), 1000);
        let b = second_run.resolve_name(&author("ursula k. le guin")).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(count_authors(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_shared_by_waiters_then_retried() {
        let (_dir, pool) = test_pool().await;
        sqlx::query(
            "CREATE TRIGGER reject_author BEFORE INSERT ON authors
             WHEN NEW.normalized_name = 'locked name'
             BEGIN SELECT RAISE(ABORT, 'author table frozen'); END",
        )
        .execute(&pool)
        .await
        .unwrap();
        let resolver = Arc::new(AuthorResolver::new(pool.clone(), 100));

        let mut handles = Vec::new();
        for i in 0..4 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                resolver.resolve(record(i, &["Locked Name"])).await
            }));
        }

        let mut reasons = Vec::new();
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            reasons.push(err.reason);
        }
        assert!(reasons[0].contains("author table frozen"), "unexpected reason: {}", reasons[0]);
        assert!(reasons.iter().all(|reason| *reason == reasons[0]));
        assert_eq!(resolver.arena().resolved_count().await, 0);

        sqlx::query("DROP TRIGGER reject_author").execute(&pool).await.unwrap();
        let retried = resolver.resolve(record(9, &["Locked Name"])).await.unwrap();
        assert_eq!(retried.author_ids.len(), 1);
        assert_eq!(count_authors(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_becomes_resolution_error() {
        let (_dir, pool) = test_pool().await;
        let resolver = AuthorResolver::new(pool.clone(), 100);
        pool.close().await;

        let err = resolver.resolve(record(1, &["Nobody"])).await.unwrap_err();
        assert_eq!(err.name, "Nobody");
        assert!(err.to_string().starts_with("author resolution failed for 'Nobody'"));
        assert_eq!(resolver.arena().resolved_count().await, 0);
    }
}
