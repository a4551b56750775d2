// Off-chain trigger signals polled by the on-chain keeper.

use crate::server::AppState;
use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use std::collections::HashSet;
use tokio::sync::Mutex as TokioMutex;
use tracing::info;

/// Chain zap ids whose off-chain condition has fired but not yet been executed.
#[derive(Default)]
pub struct KeeperSignals {
    pending: TokioMutex<HashSet<String>>,
}

impl KeeperSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn signal(&self, chain_zap_id: &str) {
        self.pending.lock().await.insert(chain_zap_id.to_string());
    }

    /// Returns whether a signal was pending and clears it.
    pub async fn take(&self, chain_zap_id: &str) -> bool {
        self.pending.lock().await.remove(chain_zap_id)
    }
}

pub async fn check_trigger(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    let should_execute = state.keeper_signals.take(&id).await;
    if should_execute {
        info!(chain_zap_id = %id, "Keeper picked up pending signal");
    }
    Json(json!({ "shouldExecute": should_execute }))
}

pub async fn signal(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    state.keeper_signals.signal(&id).await;
    info!(chain_zap_id = %id, "Keeper signal queued");
    Json(json!({
        "status": "success",
        "message": "Signal queued",
        "zapId": id,
    }))
}
