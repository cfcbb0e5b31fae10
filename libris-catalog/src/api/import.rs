//! Bulk import endpoints
//!
//! POST /books/import, GET /import/runs, POST /import/cancel/:run_id
//!
//! An import runs inside its request: the response is the run summary. While
//! it runs, its cancellation token sits in the shared run registry so it can
//! be cancelled by id, and a client disconnect (the handler future being
//! dropped) cancels it as well.

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::import::{CallerIdentity, ImportRequest, ImportSummary, SourceFormat};
use crate::{ActiveRuns, AppState};

const UNSUPPORTED_FORMAT: &str = "Unsupported file format. Use .json or .csv";

/// Query parameters of POST /books/import
#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    /// Explicit format ("csv" or "json")
    pub format: Option<String>,
    /// Original filename, used for extension-based format inference
    pub filename: Option<String>,
    /// Batch size override for this run
    pub batch_size: Option<usize>,
    /// Caller-chosen run id, so the run can be cancelled while in flight
    pub run_id: Option<Uuid>,
}

/// Entry of GET /import/runs
#[derive(Debug, Serialize)]
pub struct ActiveRunInfo {
    pub run_id: Uuid,
}

/// POST /import/cancel response
#[derive(Debug, Serialize)]
pub struct CancelRunResponse {
    pub run_id: Uuid,
    pub cancelled: bool,
}

/// Explicit format, else filename extension, else Content-Type
fn resolve_format(query: &ImportQuery, headers: &HeaderMap) -> ApiResult<SourceFormat> {
    if let Some(name) = query.format.as_deref() {
        return SourceFormat::from_name(name)
            .ok_or_else(|| ApiError::BadRequest(UNSUPPORTED_FORMAT.to_string()));
    }

    query
        .filename
        .as_deref()
        .and_then(SourceFormat::from_filename)
        .or_else(|| {
            headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .and_then(SourceFormat::from_content_type)
        })
        .ok_or_else(|| ApiError::BadRequest(UNSUPPORTED_FORMAT.to_string()))
}

/// Registry entry for a run in progress
///
/// Dropping it removes the run from the registry. Unless [`ActiveRun::finish`]
/// was called first, dropping it also cancels the run.
struct ActiveRun {
    runs: ActiveRuns,
    run_id: Uuid,
    cancel_on_drop: Option<DropGuard>,
}

impl ActiveRun {
    async fn register(runs: &ActiveRuns, run_id: Uuid) -> ApiResult<(Self, CancellationToken)> {
        let token = CancellationToken::new();
        {
            let mut active = runs.write().await;
            if active.contains_key(&run_id) {
                return Err(ApiError::Conflict(format!("Import run {} is already active", run_id)));
            }
            active.insert(run_id, token.clone());
        }

        let run = Self {
            runs: runs.clone(),
            run_id,
            cancel_on_drop: Some(token.clone().drop_guard()),
        };
        Ok((run, token))
    }

    fn finish(mut self) {
        if let Some(guard) = self.cancel_on_drop.take() {
            let _ = guard.disarm();
        }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if self.cancel_on_drop.is_some() {
            tracing::info!(run_id = %self.run_id, "Import request dropped, cancelling run");
        }
        let run_id = self.run_id;
        match self.runs.try_write() {
            Ok(mut active) => {
                active.remove(&run_id);
            }
            Err(_) => {
                let runs = self.runs.clone();
                tokio::spawn(async move {
                    runs.write().await.remove(&run_id);
                });
            }
        }
    }
}

/// POST /books/import
///
/// Body is the raw CSV or JSON file. Responds with the run summary.
pub async fn import_books(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<ImportQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<ImportSummary>> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge {
                limit: state.pipeline.settings().max_payload_bytes,
            }
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;

    let format = resolve_format(&query, &headers)?;
    let run_id = query.run_id.unwrap_or_else(Uuid::new_v4);

    tracing::info!(
        %run_id,
        %caller,
        %format,
        bytes = body.len(),
        "Import request received"
    );

    let (active_run, token) = ActiveRun::register(&state.active_runs, run_id).await?;

    let request = ImportRequest {
        payload: body,
        format,
        caller,
        batch_size: query.batch_size,
    };
    let result = state.pipeline.run_with_id(run_id, request, token).await;
    active_run.finish();

    match result {
        Ok(summary) => Ok(Json(summary)),
        Err(err) => {
            tracing::warn!(%run_id, error = %err, "Import run rejected");
            *state.last_error.write().await = Some(err.to_string());
            Err(err.into())
        }
    }
}

/// GET /import/runs
pub async fn list_active_runs(State(state): State<AppState>) -> Json<Vec<ActiveRunInfo>> {
    let active = state.active_runs.read().await;
    let mut runs: Vec<ActiveRunInfo> = active
        .keys()
        .map(|run_id| ActiveRunInfo { run_id: *run_id })
        .collect();
    runs.sort_by_key(|run| run.run_id);
    Json(runs)
}

/// POST /import/cancel/:run_id
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<CancelRunResponse>> {
    let token = state
        .active_runs
        .read()
        .await
        .get(&run_id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("Import run {} not found", run_id)))?;

    token.cancel();
    tracing::info!(%run_id, "Import run cancellation requested");

    Ok(Json(CancelRunResponse {
        run_id,
        cancelled: true,
    }))
}

/// Build import routes; the body limit follows the configured payload ceiling
pub fn import_routes(max_payload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/books/import",
            post(import_books).layer(DefaultBodyLimit::max(max_payload_bytes)),
        )
        .route("/import/runs", get(list_active_runs))
        .route("/import/cancel/:run_id", post(cancel_run))
}
