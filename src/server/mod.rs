//! `taquero serve` -- HTTP JSON API over the sheet store.
//!
//! Endpoints:
//! - GET  /health                                 - Server status (exempt from auth)
//! - GET  /api/modules                            - Record modules and their sheets
//! - GET  /api/records/{module}                   - Non-deleted rows, newest first
//! - POST /api/records/{module}                   - Create, update or delete a row
//! - GET  /api/proving/{kind}                     - Methods with their batches
//! - POST /api/proving/{kind}/methods             - Create, update or delete a method
//! - POST /api/proving/{kind}/batches             - Record a batch against a method
//! - POST /api/proving/{kind}/methods/{id}/reset  - Clear a method's batches
//!
//! Every body is a `ReadResponse` or `WriteResponse`.

mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use self::handlers::{
    handle_health, handle_list_modules, handle_not_found, handle_read_methods,
    handle_read_records, handle_record_batch, handle_reset_method, handle_write_method,
    handle_write_record,
};
use self::middleware::auth_middleware;
use self::state::AppState;
use crate::config::Config;
use crate::error::{Result, TaqueroError};
use crate::storage::LoroSheetStore;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({"success": false, "error": message})),
    )
}

/// HTTP status for a failed operation.
pub(crate) fn status_for(error: &TaqueroError) -> StatusCode {
    match error {
        TaqueroError::MissingFields(_)
        | TaqueroError::InvalidRow(_)
        | TaqueroError::UnknownModule(_)
        | TaqueroError::DuplicateId(_)
        | TaqueroError::Json(_) => StatusCode::BAD_REQUEST,
        TaqueroError::RecordNotFound(_) | TaqueroError::MethodNotFound(_) => StatusCode::NOT_FOUND,
        TaqueroError::VersionConflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the router over a store. Split from [`start_server`] so tests can
/// drive it without a socket.
pub fn router(store: LoroSheetStore, api_key: Option<String>) -> Router {
    let state = Arc::new(AppState::new(store, api_key));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/modules", get(handle_list_modules))
        .route(
            "/api/records/{module}",
            get(handle_read_records).post(handle_write_record),
        )
        .route("/api/proving/{kind}", get(handle_read_methods))
        .route("/api/proving/{kind}/methods", post(handle_write_method))
        .route("/api/proving/{kind}/batches", post(handle_record_batch))
        .route(
            "/api/proving/{kind}/methods/{id}/reset",
            post(handle_reset_method),
        )
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn start_server(config: &Config, store: LoroSheetStore) -> Result<()> {
    let api_key = config.server.api_key.clone();
    if api_key.as_deref().is_some_and(|k| !k.is_empty()) {
        info!("API key authentication enabled");
    }

    let app = router(store, api_key);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "taquero listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn reading(id: &str, temperature: f64) -> Value {
        json!({
            "id": id,
            "unit": "fridge",
            "location": "Walk-in",
            "temperature": temperature,
            "checkedBy": "Ana",
        })
    }

    fn app() -> Router {
        router(LoroSheetStore::in_memory(), None)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_modules_listed() {
        let (status, body) = send(&app(), get_req("/api/modules")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 5);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let app = app();
        let (status, body) = send(&app, post_req("/api/records/temperature-logs", reading("a1", 4.0))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Created a1");

        let (status, body) = send(&app, get_req("/api/records/temperature-logs")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["id"], "a1");
    }

    #[tokio::test]
    async fn test_write_lands_in_snapshot_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let app = router(LoroSheetStore::init(tmp.path()).unwrap(), None);

        let (status, _) = send(&app, post_req("/api/records/temperature-logs", reading("a1", 4.0))).await;
        assert_eq!(status, StatusCode::OK);

        let reopened = LoroSheetStore::open(tmp.path()).unwrap();
        assert!(reopened.get("TemperatureLogs", "a1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_wrongly_typed_field_is_bad_request() {
        let mut body = reading("a1", 4.0);
        body["temperature"] = json!("warm");
        let (status, body) = send(&app(), post_req("/api/records/temperature-logs", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_missing_fields_is_bad_request() {
        let (status, body) = send(
            &app(),
            post_req("/api/records/temperature-logs", json!({"id": "a1", "unit": "fridge"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("location"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/records/suppliers")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let (status, body) = send(&app(), get_req("/api/records/payroll")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_version_conflict() {
        let app = app();
        send(&app, post_req("/api/records/temperature-logs", reading("a1", 4.0))).await;

        let mut stale = reading("a1", 6.0);
        stale["expectedVersion"] = json!(7);
        let (status, body) = send(&app, post_req("/api/records/temperature-logs", stale)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_delete_unknown_supplier_is_not_found() {
        let body = json!({
            "id": "s9",
            "name": "Farm",
            "contactName": "Jo",
            "phone": "0123",
            "status": "deleted",
        });
        let (status, _) = send(&app(), post_req("/api/records/suppliers", body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_proving_flow() {
        let app = app();
        let method = json!({
            "id": "m1",
            "foodItem": "Rice",
            "description": "Spread thin, blast chill",
            "createdBy": "Chef",
        });
        let (status, _) = send(&app, post_req("/api/proving/cooling/methods", method)).await;
        assert_eq!(status, StatusCode::OK);

        for n in 1..=3 {
            let batch = json!({
                "id": format!("b{}", n),
                "methodId": "m1",
                "batchNumber": n,
                "date": "2024-05-01",
                "endTemp": 5.0,
                "checkedBy": "Sam",
            });
            let (status, _) = send(&app, post_req("/api/proving/cooling/batches", batch)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, body) = send(&app, get_req("/api/proving/cooling")).await;
        assert_eq!(body["data"][0]["status"], "proven");
        assert_eq!(body["data"][0]["batches"].as_array().unwrap().len(), 3);

        let (status, body) = send(
            &app,
            post_req("/api/proving/cooling/methods/m1/reset", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Reset method m1 (3 batches cleared)");

        let (_, body) = send(&app, get_req("/api/proving/cooling")).await;
        assert_eq!(body["data"][0]["status"], "in-progress");
    }

    #[tokio::test]
    async fn test_batch_for_missing_method() {
        let batch = json!({
            "id": "b1",
            "methodId": "ghost",
            "batchNumber": 1,
            "date": "2024-05-01",
            "endTemp": 80.0,
            "checkedBy": "Sam",
        });
        let (status, _) = send(&app(), post_req("/api/proving/cooking/batches", batch)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, _) = send(&app(), get_req("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_key_required() {
        let app = router(LoroSheetStore::in_memory(), Some("s3cret".to_string()));

        let (status, _) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, get_req("/api/modules")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/api/modules")
            .header("x-api-key", "wrong")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let request = Request::builder()
            .uri("/api/modules")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
    }
}
