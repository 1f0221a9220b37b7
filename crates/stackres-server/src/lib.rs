pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::{middleware, Router};
use stackres_core::config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const RESOURCES: &str = "/v1/{tenant_id}/stacks/{stack_name}/{stack_id}/resources";
const RESOURCE: &str = "/v1/{tenant_id}/stacks/{stack_name}/{stack_id}/resources/{resource_name}";

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(root: PathBuf, config: Config) -> Router {
    build_router_with_state(state::AppState::new(root, config))
}

/// Build the router around existing state.
pub fn build_router_with_state(app_state: state::AppState) -> Router {
    let auth = Arc::new(app_state.config.auth.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Stacks
        .route(
            "/v1/{tenant_id}/stacks",
            get(routes::stacks::list_stacks).post(routes::stacks::create_stack),
        )
        .route(
            "/v1/{tenant_id}/stacks/{stack_name}",
            get(routes::stacks::lookup_stack),
        )
        .route(
            "/v1/{tenant_id}/stacks/{stack_name}/{stack_id}",
            get(routes::stacks::show_stack).delete(routes::stacks::delete_stack),
        )
        .route(
            "/v1/{tenant_id}/stacks/{stack_name}/{stack_id}/events",
            get(routes::stacks::stack_events),
        )
        // Resources
        .route(RESOURCES, get(routes::resources::list_resources))
        .route(RESOURCE, get(routes::resources::show_resource))
        .route(
            &format!("{RESOURCE}/metadata"),
            get(routes::resources::resource_metadata),
        )
        .route(
            &format!("{RESOURCE}/events"),
            get(routes::resources::resource_events),
        )
        .route(
            &format!("{RESOURCE}/signal"),
            axum::routing::post(routes::resources::signal_resource),
        )
        // Events (SSE)
        .route(
            "/v1/{tenant_id}/events/stream",
            get(routes::events::sse_events),
        )
        .layer(middleware::from_fn_with_state(auth, auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the API server on the configured bind address and port.
pub async fn serve(root: PathBuf, config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.service.bind, config.service.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(root, config, listener).await
}

/// Start the API server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(
    root: PathBuf,
    config: Config,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let name = config.service.name.clone();
    let app = build_router(root, config);

    tracing::info!(service = %name, "listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
