//! libris-catalog library interface
//!
//! Bulk book import service. Exposes the import pipeline and the HTTP router
//! for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::ImportSettings;
use crate::import::ImportPipeline;

/// Cancellation tokens of import runs in progress, by run id
pub type ActiveRuns = Arc<RwLock<HashMap<Uuid, CancellationToken>>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Import pipeline bound to `db` and the loaded settings
    pub pipeline: ImportPipeline,
    /// Cancellation tokens for active import runs
    pub active_runs: ActiveRuns,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, settings: ImportSettings) -> Self {
        Self {
            pipeline: ImportPipeline::new(db.clone(), settings),
            db,
            active_runs: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let max_payload_bytes = state.pipeline.settings().max_payload_bytes;

    Router::new()
        .merge(api::import_routes(max_payload_bytes))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
