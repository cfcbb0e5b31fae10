//! Timed transactions
//!
//! Batch commits hold the SQLite write lock for the whole batch. Wrapping the
//! transaction records how long the pool took to hand out a connection and
//! how long the connection was held, so slow batches show up in the logs.

use libris_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::time::{Duration, Instant};

const SLOW_ACQUIRE: Duration = Duration::from_millis(500);
const LONG_HOLD: Duration = Duration::from_secs(2);

/// Transaction that logs its hold time when it ends
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    label: &'static str,
    opened: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection the transaction runs on, usable as a sqlx executor
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        let label = self.label;
        self.tx
            .as_deref_mut()
            .ok_or_else(|| Error::Internal(format!("transaction already finished ({})", label)))
    }

    pub async fn commit(mut self) -> Result<()> {
        self.finish()?.commit().await?;
        self.log_held("commit");
        Ok(())
    }

    fn finish(&mut self) -> Result<Transaction<'c, Sqlite>> {
        self.tx
            .take()
            .ok_or_else(|| Error::Internal(format!("transaction already finished ({})", self.label)))
    }

    fn log_held(&self, ended_by: &'static str) {
        let held = self.opened.elapsed();
        let held_ms = held.as_millis() as u64;
        if held > LONG_HOLD {
            tracing::warn!(label = self.label, held_ms, ended_by, "Long-running transaction");
        } else {
            tracing::debug!(label = self.label, held_ms, ended_by, "Transaction ended");
        }
    }
}

impl Drop for MonitoredTransaction<'_> {
    fn drop(&mut self) {
        // sqlx rolls back a transaction dropped while still open
        if self.tx.is_some() {
            self.log_held("drop");
        }
    }
}

/// Begin a transaction on `pool`, logging slow connection acquisition
pub async fn begin_monitored<'c>(pool: &'c SqlitePool, label: &'static str) -> Result<MonitoredTransaction<'c>> {
    let requested = Instant::now();
    let tx = pool.begin().await?;

    let waited = requested.elapsed();
    if waited > SLOW_ACQUIRE {
        tracing::warn!(
            label,
            wait_ms = waited.as_millis() as u64,
            pool_size = pool.size(),
            idle = pool.num_idle(),
            "Slow connection acquisition"
        );
    }

    Ok(MonitoredTransaction {
        tx: Some(tx),
        label,
        opened: Instant::now(),
    })
}
