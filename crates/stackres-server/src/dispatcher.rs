//! Background application of accepted signals.
//!
//! Handlers validate a signal synchronously and enqueue it on a bounded
//! channel; a single task drains the queue, applying each signal under the
//! tenant lock.

use serde_json::Value;
use stackres_core::identity::ResourceKey;
use stackres_core::signal;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::state::{AppState, ChangeEvent};

#[derive(Debug)]
pub struct SignalJob {
    pub key: ResourceKey,
    pub payload: Value,
}

/// Queue a validated signal. A full or closed queue is a 503.
pub fn enqueue(app: &AppState, job: SignalJob) -> Result<(), AppError> {
    app.signal_tx.try_send(job).map_err(|e| match e {
        mpsc::error::TrySendError::Full(job) => {
            tracing::warn!(resource = %job.key, "signal queue full");
            AppError::unavailable("signal queue is full, retry later")
        }
        mpsc::error::TrySendError::Closed(_) => {
            AppError::unavailable("signal dispatcher is not running")
        }
    })
}

pub async fn run(app: AppState, mut rx: mpsc::Receiver<SignalJob>) {
    while let Some(SignalJob { key, payload }) = rx.recv().await {
        let lock = match app.tenant_lock(&key.stack.tenant_id) {
            Ok(lock) => lock,
            Err(e) => {
                tracing::warn!(resource = %key, error = %e, "signal not applied");
                continue;
            }
        };
        let _guard = lock.lock().await;

        let root = app.root.clone();
        let config = app.config.clone();
        let job_key = key.clone();
        let result = tokio::task::spawn_blocking(move || {
            signal::deliver(&root, &config, &job_key, &payload)
        })
        .await;

        match result {
            Ok(Ok(_)) => app.notify(ChangeEvent::resource("signal", &key)),
            Ok(Err(e)) => tracing::warn!(resource = %key, error = %e, "signal not applied"),
            Err(e) => tracing::error!(resource = %key, "signal task join error: {e}"),
        }
    }
    tracing::debug!("signal dispatcher stopped");
}
