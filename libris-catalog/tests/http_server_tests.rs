//! HTTP Server & Routing Integration Tests
//!
//! Drives the router with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use libris_catalog::config::ImportSettings;
use libris_catalog::{build_router, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use helpers::{count_rows, create_test_db};

async fn test_app_with(settings: ImportSettings) -> (TempDir, sqlx::SqlitePool, Router) {
    let (dir, pool) = create_test_db().await.unwrap();
    let app = build_router(AppState::new(pool.clone(), settings));
    (dir, pool, app)
}

async fn test_app() -> (TempDir, sqlx::SqlitePool, Router) {
    test_app_with(ImportSettings::default()).await
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn import_request(uri: &str, content_type: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-caller-id", "librarian-7");
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health_reports_ok() {
    let (_dir, _pool, app) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "libris-catalog");
    assert_eq!(json["active_runs"], 0);
    assert!(json.get("last_error").is_none());
}

#[tokio::test]
async fn test_csv_import_returns_summary() {
    let (_dir, pool, app) = test_app().await;
    let csv = "title,author,year\n\
               The Left Hand of Darkness,Ursula K. Le Guin,1969\n\
               ,Nobody,2000\n";

    let response = app
        .oneshot(import_request("/books/import?filename=books.csv", None, csv))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["imported"], 1);
    assert_eq!(json["failed"], 1);
    assert!(json["run_id"].as_str().is_some());

    let details = json["details"].as_array().unwrap();
    assert_eq!(details.len(), 2);
    assert_eq!(details[0]["index"], 1);
    assert_eq!(details[0]["status"], "imported");
    assert!(details[0]["id"].as_i64().is_some());
    assert_eq!(details[1]["status"], "failed");
    assert_eq!(details[1]["reason"], "missing title");

    let created_by: String = sqlx::query_scalar("SELECT created_by FROM books")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(created_by, "librarian-7");
}

#[tokio::test]
async fn test_json_import_by_content_type() {
    let (_dir, _pool, app) = test_app().await;
    let json_body = r#"[{"title": "Solaris", "authors": ["Stanislaw Lem"], "year": 1961}]"#;

    let response = app
        .oneshot(import_request(
            "/books/import?batch_size=1",
            Some("application/json"),
            json_body,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["imported"], 1);
}

#[tokio::test]
async fn test_missing_caller_is_unauthorized() {
    let (_dir, pool, app) = test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/books/import?format=csv")
        .body(Body::from("title,author\nDune,Frank Herbert\n"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");
    assert_eq!(count_rows(&pool, "books").await, 0);
}

#[tokio::test]
async fn test_structural_error_is_bad_request_without_details() {
    let (_dir, _pool, app) = test_app().await;

    let response = app
        .oneshot(import_request(
            "/books/import?format=json",
            None,
            r#"{"title": "not an array"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "STRUCTURAL_ERROR");
    assert!(json.get("details").is_none());
}

#[tokio::test]
async fn test_unknown_format_rejected() {
    let (_dir, _pool, app) = test_app().await;

    let response = app
        .oneshot(import_request("/books/import?filename=books.xlsx", None, "whatever"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(
        json["error"]["message"],
        "Unsupported file format. Use .json or .csv"
    );
}

#[tokio::test]
async fn test_oversized_body_is_payload_too_large() {
    let settings = ImportSettings {
        max_payload_bytes: 128,
        ..ImportSettings::default()
    };
    let (_dir, pool, app) = test_app_with(settings).await;
    let csv = format!("title,author\n{}", "A Long Title,Some Author\n".repeat(20));

    let response = app
        .oneshot(import_request("/books/import?format=csv", None, &csv))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(count_rows(&pool, "books").await, 0);
}

#[tokio::test]
async fn test_cancel_unknown_run_is_not_found() {
    let (_dir, _pool, app) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/import/cancel/00000000-0000-0000-0000-000000000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_no_active_runs_after_import() {
    let (_dir, _pool, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(import_request(
            "/books/import?format=csv&run_id=6f1c1f8e-3c2b-4d7e-9a55-2b1f0f6d9c11",
            None,
            "title,author\nDune,Frank Herbert\n",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["run_id"], "6f1c1f8e-3c2b-4d7e-9a55-2b1f0f6d9c11");

    let response = app
        .oneshot(Request::builder().uri("/import/runs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json, serde_json::json!([]));
}
