use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use stackres_core::identity::StackKey;
use stackres_core::lifecycle;
use stackres_core::query::{self, StackView};
use stackres_core::template::Template;

use crate::error::AppError;
use crate::state::{AppState, ChangeEvent};

#[derive(Deserialize)]
pub struct ListStacksQuery {
    show_nested: Option<String>,
}

/// GET /v1/{tenant_id}/stacks
pub async fn list_stacks(
    State(app): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(q): Query<ListStacksQuery>,
) -> Result<Json<Value>, AppError> {
    let show_nested = match q.show_nested.as_deref() {
        Some(raw) => query::parse_bool("show_nested", raw)?,
        None => false,
    };
    let root = app.root.clone();
    let stacks =
        tokio::task::spawn_blocking(move || query::list_stacks(&root, &tenant_id, show_nested))
            .await
            .map_err(AppError::join)??;

    Ok(Json(serde_json::json!({ "stacks": stacks })))
}

#[derive(Deserialize)]
pub struct CreateStackBody {
    stack_name: String,
    /// Either a JSON/YAML document as a string or an inline object.
    template: Value,
}

/// POST /v1/{tenant_id}/stacks: create a stack from a template.
pub async fn create_stack(
    State(app): State<AppState>,
    Path(tenant_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let body: CreateStackBody = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("invalid stack body: {e}")))?;
    let template = match &body.template {
        Value::String(source) => Template::parse(source)?,
        doc @ Value::Object(_) => Template::from_json(doc)?,
        _ => return Err(AppError::bad_request("template must be a string or an object")),
    };

    let lock = app.tenant_lock(&tenant_id)?;
    let _guard = lock.lock().await;

    let root = app.root.clone();
    let config = app.config.clone();
    let stack = tokio::task::spawn_blocking(move || {
        lifecycle::create_stack(&root, &config, &tenant_id, &body.stack_name, &template)
    })
    .await
    .map_err(AppError::join)??;

    app.notify(ChangeEvent::stack("stack_created", &stack.key()));
    let view = StackView::new(&stack);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "stack": { "id": view.id, "links": view.links } })),
    ))
}

/// GET /v1/{tenant_id}/stacks/{stack_name}: redirect to the canonical URL.
pub async fn lookup_stack(
    State(app): State<AppState>,
    Path((tenant_id, stack_name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let root = app.root.clone();
    let key = tokio::task::spawn_blocking(move || query::find_stack(&root, &tenant_id, &stack_name))
        .await
        .map_err(AppError::join)??;

    Ok((StatusCode::FOUND, [(header::LOCATION, key.url())]).into_response())
}

/// GET /v1/{tenant_id}/stacks/{stack_name}/{stack_id}
pub async fn show_stack(
    State(app): State<AppState>,
    Path((tenant_id, stack_name, stack_id)): Path<(String, String, String)>,
) -> Result<Json<Value>, AppError> {
    let root = app.root.clone();
    let key = StackKey::new(tenant_id, stack_name, stack_id);
    let stack = tokio::task::spawn_blocking(move || query::show_stack(&root, &key))
        .await
        .map_err(AppError::join)??;

    Ok(Json(serde_json::json!({ "stack": stack })))
}

/// DELETE /v1/{tenant_id}/stacks/{stack_name}/{stack_id}
pub async fn delete_stack(
    State(app): State<AppState>,
    Path((tenant_id, stack_name, stack_id)): Path<(String, String, String)>,
) -> Result<StatusCode, AppError> {
    let key = StackKey::new(tenant_id, stack_name, stack_id);
    let lock = app.tenant_lock(&key.tenant_id)?;
    let _guard = lock.lock().await;

    let root = app.root.clone();
    let delete_key = key.clone();
    tokio::task::spawn_blocking(move || lifecycle::delete_stack(&root, &delete_key))
        .await
        .map_err(AppError::join)??;

    app.notify(ChangeEvent::stack("stack_deleted", &key));
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/{tenant_id}/stacks/{stack_name}/{stack_id}/events
pub async fn stack_events(
    State(app): State<AppState>,
    Path((tenant_id, stack_name, stack_id)): Path<(String, String, String)>,
) -> Result<Json<Value>, AppError> {
    let root = app.root.clone();
    let key = StackKey::new(tenant_id, stack_name, stack_id);
    let events = tokio::task::spawn_blocking(move || query::list_events(&root, &key))
        .await
        .map_err(AppError::join)??;

    Ok(Json(serde_json::json!({ "events": events })))
}
