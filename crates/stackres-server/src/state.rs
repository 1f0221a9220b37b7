use chrono::{DateTime, Utc};
use serde::Serialize;
use stackres_core::config::Config;
use stackres_core::identity::{ResourceKey, StackKey};
use stackres_core::paths;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::dispatcher::{self, SignalJob};

/// A change applied to the store, fanned out to SSE subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub kind: &'static str,
    pub tenant_id: String,
    pub stack_name: String,
    pub stack_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn stack(kind: &'static str, key: &StackKey) -> Self {
        Self {
            kind,
            tenant_id: key.tenant_id.clone(),
            stack_name: key.stack_name.clone(),
            stack_id: key.stack_id.clone(),
            resource_name: None,
            at: Utc::now(),
        }
    }

    pub fn resource(kind: &'static str, key: &ResourceKey) -> Self {
        Self {
            resource_name: Some(key.resource_name.clone()),
            ..Self::stack(kind, &key.stack)
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub event_tx: broadcast::Sender<ChangeEvent>,
    pub signal_tx: mpsc::Sender<SignalJob>,
    locks: Arc<std::sync::Mutex<HashMap<String, Weak<Mutex<()>>>>>,
}

impl AppState {
    pub fn new(root: PathBuf, config: Config) -> Self {
        let (state, signal_rx) = Self::detached(root, config);

        // Guard: only spawn inside a Tokio runtime (skipped in sync unit tests).
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::spawn(dispatcher::run(state.clone(), signal_rx));
        }

        state
    }

    /// State whose signal queue is handed back to the caller instead of a
    /// spawned dispatcher.
    pub fn detached(root: PathBuf, config: Config) -> (Self, mpsc::Receiver<SignalJob>) {
        let (event_tx, _) = broadcast::channel(64);
        let (signal_tx, signal_rx) = mpsc::channel(config.signals.queue_depth.max(1));
        let state = Self {
            root,
            config: Arc::new(config),
            event_tx,
            signal_tx,
            locks: Arc::default(),
        };
        (state, signal_rx)
    }

    /// The mutex serializing every load-modify-save for one tenant.
    ///
    /// Entries live only as long as some caller holds the lock, so the map
    /// stays bounded by the number of tenants with work in flight.
    pub fn tenant_lock(&self, tenant_id: &str) -> stackres_core::Result<Arc<Mutex<()>>> {
        paths::validate_tenant_id(tenant_id)?;
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| lock.strong_count() > 0);
        if let Some(lock) = locks.get(tenant_id).and_then(Weak::upgrade) {
            return Ok(lock);
        }
        let lock = Arc::new(Mutex::new(()));
        locks.insert(tenant_id.to_string(), Arc::downgrade(&lock));
        Ok(lock)
    }

    pub fn notify(&self, change: ChangeEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(change);
    }
}
