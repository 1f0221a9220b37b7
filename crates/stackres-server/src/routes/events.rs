use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /v1/{tenant_id}/events/stream: SSE stream of the tenant's applied
/// changes (stack create/delete, signals).
pub async fn sse_events(
    State(app): State<AppState>,
    Path(tenant_id): Path<String>,
) -> impl axum::response::IntoResponse {
    let rx = app.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| {
        let change = msg.ok().filter(|c| c.tenant_id == tenant_id)?;
        let event = Event::default().event(change.kind).json_data(&change).ok()?;
        Some(Ok::<Event, Infallible>(event))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
