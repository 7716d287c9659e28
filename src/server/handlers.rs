//! Route handlers. Each one takes the store lock for the whole
//! read-modify-write and writes the snapshot after a successful write.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

use super::state::AppState;
use super::{json_error, status_for};
use crate::endpoint::{self, proving, ReadResponse, WriteResponse};
use crate::entity::{Module, ProvingKind};
use crate::error::{Result, TaqueroError};
use crate::storage::LoroSheetStore;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = json!({
        "success": true,
        "message": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /api/modules
pub(crate) async fn handle_list_modules() -> impl IntoResponse {
    let modules = Module::ALL
        .iter()
        .map(|m| {
            json!({
                "slug": m.slug(),
                "sheet": m.sheet_name(),
                "requiredFields": m.required_fields(),
            })
        })
        .collect();
    (StatusCode::OK, Json(ReadResponse::ok(modules)))
}

/// GET /api/records/{module}
pub(crate) async fn handle_read_records(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Response {
    let module = match parse_module(&slug) {
        Ok(m) => m,
        Err(e) => return read_failure(e),
    };

    let store = state.store.lock().await;
    let response = endpoint::read(&store, module);
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(response)).into_response()
}

/// POST /api/records/{module}
pub(crate) async fn handle_write_record(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    body: Bytes,
) -> Response {
    let result = async {
        let module = parse_module(&slug)?;
        let body = parse_body(&body)?;
        let store = state.store.lock().await;
        let receipt = endpoint::write(&store, module, body)?;
        persist(store.export_snapshot()?).await?;
        Ok::<_, TaqueroError>(receipt.message)
    }
    .await;

    write_reply(result)
}

/// GET /api/proving/{kind}
pub(crate) async fn handle_read_methods(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(k) => k,
        Err(e) => return read_failure(e),
    };

    let store = state.store.lock().await;
    let response = proving::read_methods(&store, kind);
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(response)).into_response()
}

/// POST /api/proving/{kind}/methods
pub(crate) async fn handle_write_method(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    body: Bytes,
) -> Response {
    let result = with_kind(&state, &kind, &body, |store, kind, body| {
        proving::write_method(store, kind, body).map(|r| r.message)
    })
    .await;

    write_reply(result)
}

/// POST /api/proving/{kind}/batches
pub(crate) async fn handle_record_batch(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    body: Bytes,
) -> Response {
    let result = with_kind(&state, &kind, &body, |store, kind, body| {
        proving::record_batch(store, kind, body).map(|r| r.message)
    })
    .await;

    write_reply(result)
}

/// POST /api/proving/{kind}/methods/{id}/reset
pub(crate) async fn handle_reset_method(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    let result = async {
        let kind = parse_kind(&kind)?;
        let store = state.store.lock().await;
        let receipt = proving::reset_method(&store, kind, &id)?;
        persist(store.export_snapshot()?).await?;
        Ok::<_, TaqueroError>(receipt.message)
    }
    .await;

    write_reply(result)
}

async fn with_kind<F>(state: &AppState, kind: &str, body: &[u8], op: F) -> Result<String>
where
    F: FnOnce(&LoroSheetStore, ProvingKind, Value) -> Result<String>,
{
    let kind = parse_kind(kind)?;
    let body = parse_body(body)?;
    let store = state.store.lock().await;
    let message = op(&store, kind, body)?;
    persist(store.export_snapshot()?).await?;
    Ok(message)
}

/// Write an exported snapshot without blocking the runtime. Callers keep the
/// store lock held so snapshots land in write order.
async fn persist(snapshot: Option<(PathBuf, Vec<u8>)>) -> Result<()> {
    if let Some((path, bytes)) = snapshot {
        tokio::fs::write(path, bytes).await?;
    }
    Ok(())
}

fn parse_module(slug: &str) -> Result<Module> {
    slug.parse()
        .map_err(|_| TaqueroError::UnknownModule(slug.to_string()))
}

fn parse_kind(slug: &str) -> Result<ProvingKind> {
    slug.parse()
        .map_err(|_| TaqueroError::UnknownModule(format!("proving/{}", slug)))
}

fn parse_body(body: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(body)?)
}

fn read_failure(error: TaqueroError) -> Response {
    (status_for(&error), Json(ReadResponse::failure(error))).into_response()
}

fn write_reply(result: Result<String>) -> Response {
    match result {
        Ok(message) => (StatusCode::OK, Json(WriteResponse::ok(message))).into_response(),
        Err(e) => {
            let status = status_for(&e);
            warn!(status = status.as_u16(), error = %e, "write refused");
            (status, Json(WriteResponse::failure(e))).into_response()
        }
    }
}
