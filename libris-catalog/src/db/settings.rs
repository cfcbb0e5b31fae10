//! Settings database operations
//!
//! Key-value accessors for the `settings` table.

use libris_common::{Error, Result};
use sqlx::SqlitePool;

/// Read a setting and parse it
///
/// Returns `None` when the key is missing or its value is NULL.
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match row {
        Some((Some(value),)) => {
            let parsed = value.trim().parse::<T>().map_err(|e| {
                Error::Config(format!("Parse setting '{}' failed: {}", key, e))
            })?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Write a setting (insert or replace)
pub async fn set_setting<T>(db: &SqlitePool, key: &str, value: T) -> Result<()>
where
    T: ToString,
{
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_pool() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let pool = libris_common::db::init_database(&temp_dir.path().join("libris.db"))
            .await
            .unwrap();
        (temp_dir, pool)
    }

    #[tokio::test]
    async fn test_missing_setting_is_none() {
        let (_dir, pool) = test_pool().await;
        let value: Option<u64> = get_setting(&pool, "import_batch_size").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_dir, pool) = test_pool().await;
        set_setting(&pool, "import_batch_size", 40).await.unwrap();
        set_setting(&pool, "import_batch_size", 50).await.unwrap();

        let value: Option<usize> = get_setting(&pool, "import_batch_size").await.unwrap();
        assert_eq!(value, Some(50));
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let (_dir, pool) = test_pool().await;
        set_setting(&pool, "import_batch_size", "lots").await.unwrap();

        let result: Result<Option<usize>> = get_setting(&pool, "import_batch_size").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
