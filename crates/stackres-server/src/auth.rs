use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use stackres_core::config::AuthConfig;

pub const TOKEN_HEADER: &str = "x-auth-token";

/// Axum middleware that checks the `X-Auth-Token` header against the
/// configured token table.
///
/// Auth flow (evaluated in order):
/// 1. No tokens configured → passthrough
/// 2. Path outside `/v1/{tenant_id}/` → passthrough
/// 3. Header names a token granted to the path's tenant → passthrough
/// 4. Anything else → 401 JSON
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled() {
        return next.run(req).await;
    }
    let Some(tenant) = path_tenant(req.uri().path()) else {
        return next.run(req).await;
    };

    let token = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    match auth.tenant_for(token) {
        Some(granted) if granted == tenant => next.run(req).await,
        Some(_) => {
            tracing::warn!(%tenant, "token is not valid for tenant");
            unauthorized()
        }
        None => {
            tracing::warn!(%tenant, "missing or unknown auth token");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    let body = serde_json::json!({ "error": "unauthorized" });
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// Tenant segment of a `/v1/{tenant_id}/...` path.
fn path_tenant(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/v1/")?;
    let tenant = rest.split('/').next()?;
    (!tenant.is_empty()).then_some(tenant)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
