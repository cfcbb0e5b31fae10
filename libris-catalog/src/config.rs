//! Runtime import settings
//!
//! Loaded from the `settings` table at startup. Missing keys are written back
//! with their defaults so the database always shows the effective values.
//! Out-of-range values are clamped with a warning rather than refusing to start.

use crate::db::settings::{get_setting, set_setting};
use libris_common::Result;
use sqlx::SqlitePool;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 1000;

const DEFAULT_BATCH_SIZE: usize = 25;
const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_RESOLVER_CONCURRENCY: usize = 4;
const DEFAULT_RUN_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Import pipeline tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    /// Records per write transaction
    pub batch_size: usize,
    /// Largest accepted request body
    pub max_payload_bytes: usize,
    /// Capacity of each inter-stage channel
    pub channel_capacity: usize,
    /// Records resolved concurrently by the author resolver
    pub resolver_concurrency: usize,
    /// Wall-clock limit per run; exceeding it cancels the run
    pub run_timeout: Duration,
    /// Total backoff budget for "database is locked" retries
    pub max_lock_wait_ms: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            resolver_concurrency: DEFAULT_RESOLVER_CONCURRENCY,
            run_timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }
}

impl ImportSettings {
    /// Load settings from the database, writing back defaults for missing keys
    pub async fn load(db: &SqlitePool) -> Result<Self> {
        let batch_size = clamp(
            "import_batch_size",
            load_or_default(db, "import_batch_size", DEFAULT_BATCH_SIZE).await?,
            MIN_BATCH_SIZE,
            MAX_BATCH_SIZE,
        );
        let max_payload_bytes = clamp(
            "import_max_payload_bytes",
            load_or_default(db, "import_max_payload_bytes", DEFAULT_MAX_PAYLOAD_BYTES).await?,
            1024,
            usize::MAX,
        );
        let channel_capacity = clamp(
            "import_channel_capacity",
            load_or_default(db, "import_channel_capacity", DEFAULT_CHANNEL_CAPACITY).await?,
            1,
            4096,
        );
        let resolver_concurrency = clamp(
            "import_resolver_concurrency",
            load_or_default(db, "import_resolver_concurrency", DEFAULT_RESOLVER_CONCURRENCY).await?,
            1,
            64,
        );
        let run_timeout_secs = clamp(
            "import_run_timeout_secs",
            load_or_default(db, "import_run_timeout_secs", DEFAULT_RUN_TIMEOUT_SECS).await?,
            1,
            u64::MAX,
        );
        let max_lock_wait_ms =
            load_or_default(db, "database_max_lock_wait_ms", DEFAULT_MAX_LOCK_WAIT_MS).await?;

        let settings = Self {
            batch_size,
            max_payload_bytes,
            channel_capacity,
            resolver_concurrency,
            run_timeout: Duration::from_secs(run_timeout_secs),
            max_lock_wait_ms,
        };
        info!(?settings, "Import settings loaded");
        Ok(settings)
    }

    /// Batch size for one run: the request override if given, clamped to bounds
    pub fn effective_batch_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.batch_size)
            .clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
    }
}

async fn load_or_default<T>(db: &SqlitePool, key: &str, default: T) -> Result<T>
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match get_setting::<T>(db, key).await? {
        Some(value) => Ok(value),
        None => {
            info!("Setting '{}' not found in database, using default: {}", key, default);
            set_setting(db, key, default).await?;
            Ok(default)
        }
    }
}

fn clamp<T: PartialOrd + Display + Copy>(key: &str, value: T, min: T, max: T) -> T {
    if value < min {
        warn!("Setting '{}' = {} below minimum, using {}", key, value, min);
        min
    } else if value > max {
        warn!("Setting '{}' = {} above maximum, using {}", key, value, max);
        max
    } else {
        value
    }
}
