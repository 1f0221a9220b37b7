use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use stackres_core::identity::{ResourceKey, StackKey};
use stackres_core::query::{self, ListOptions};
use stackres_core::signal;
use stackres_core::stack::Stack;

use crate::dispatcher::{self, SignalJob};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ResourcePath {
    tenant_id: String,
    stack_name: String,
    stack_id: String,
    resource_name: String,
}

impl ResourcePath {
    fn key(self) -> ResourceKey {
        StackKey::new(self.tenant_id, self.stack_name, self.stack_id).resource(self.resource_name)
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    nested_depth: Option<String>,
    with_detail: Option<String>,
}

/// GET /v1/{tenant_id}/stacks/{stack_name}/{stack_id}/resources
pub async fn list_resources(
    State(app): State<AppState>,
    Path((tenant_id, stack_name, stack_id)): Path<(String, String, String)>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let opts = ListOptions::parse(
        q.nested_depth.as_deref(),
        q.with_detail.as_deref(),
        app.config.limits.max_nested_depth,
    )?;
    let root = app.root.clone();
    let key = StackKey::new(tenant_id, stack_name, stack_id);
    let resources = tokio::task::spawn_blocking(move || query::list_resources(&root, &key, opts))
        .await
        .map_err(AppError::join)??;

    Ok(Json(serde_json::json!({ "resources": resources })))
}

/// GET .../resources/{resource_name}
pub async fn show_resource(
    State(app): State<AppState>,
    Path(path): Path<ResourcePath>,
) -> Result<Json<Value>, AppError> {
    let root = app.root.clone();
    let key = path.key();
    let resource = tokio::task::spawn_blocking(move || query::show_resource(&root, &key))
        .await
        .map_err(AppError::join)??;

    Ok(Json(serde_json::json!({ "resource": resource })))
}

/// GET .../resources/{resource_name}/metadata
pub async fn resource_metadata(
    State(app): State<AppState>,
    Path(path): Path<ResourcePath>,
) -> Result<Json<Value>, AppError> {
    let root = app.root.clone();
    let key = path.key();
    let metadata = tokio::task::spawn_blocking(move || query::resource_metadata(&root, &key))
        .await
        .map_err(AppError::join)??;

    Ok(Json(serde_json::json!({ "metadata": metadata })))
}

/// GET .../resources/{resource_name}/events
pub async fn resource_events(
    State(app): State<AppState>,
    Path(path): Path<ResourcePath>,
) -> Result<Json<Value>, AppError> {
    let root = app.root.clone();
    let key = path.key();
    let events = tokio::task::spawn_blocking(move || query::list_resource_events(&root, &key))
        .await
        .map_err(AppError::join)??;

    Ok(Json(serde_json::json!({ "events": events })))
}

/// POST .../resources/{resource_name}/signal: validate now, apply later.
///
/// The body is optional JSON. On acceptance the signal is queued for the
/// dispatcher and the response is an empty 200.
pub async fn signal_resource(
    State(app): State<AppState>,
    Path(path): Path<ResourcePath>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("signal body is not JSON: {e}")))?
    };

    let key = path.key();
    let lock = app.tenant_lock(&key.stack.tenant_id)?;
    let _guard = lock.lock().await;

    let root = app.root.clone();
    let (check_key, check_payload) = (key.clone(), payload.clone());
    tokio::task::spawn_blocking(move || {
        check_key.validate()?;
        let stack = Stack::lookup(&root, &check_key.stack)?;
        signal::check(&stack, &check_key.resource_name, &check_payload).map(|_| ())
    })
    .await
    .map_err(AppError::join)?
    .inspect_err(|e| tracing::warn!(resource = %key, error = %e, "signal rejected"))?;

    dispatcher::enqueue(&app, SignalJob { key, payload })?;
    Ok(StatusCode::OK)
}
