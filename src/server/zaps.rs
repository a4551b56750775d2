// Zap management routes.

use crate::model::{ActionSpec, NewZap, TriggerSpec, Zap, ZapPatch, ZapStatus};
use crate::server::AppState;
use crate::server::error::{ApiError, json_body};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::info;

pub const DEFAULT_RUNS_LIMIT: usize = 10;

fn trigger_of(value: &Value) -> Result<TriggerSpec, ApiError> {
    serde_json::from_value(value.clone()).map_err(|e| ApiError::BadRequest(format!("Invalid trigger: {e}")))
}

fn actions_of(value: Option<&Value>) -> Result<Vec<ActionSpec>, ApiError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(actions) => serde_json::from_value(actions.clone())
            .map_err(|e| ApiError::BadRequest(format!("Invalid actions: {e}"))),
    }
}

fn string_of(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn status_of(body: &Value) -> Option<ZapStatus> {
    string_of(body, "status").map(ZapStatus::from)
}

pub async fn create_zap(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = json_body(&body)?;
    let trigger = body
        .get("trigger")
        .filter(|t| !t.is_null())
        .ok_or_else(|| ApiError::BadRequest("Trigger is required".to_string()))?;

    let zap = state
        .store
        .create_zap(NewZap {
            name: string_of(&body, "name"),
            user_id: string_of(&body, "userId"),
            status: status_of(&body).unwrap_or_default(),
            trigger: trigger_of(trigger)?,
            actions: actions_of(body.get("actions"))?,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Zap created successfully",
            "zap": zap,
        })),
    ))
}

pub async fn register_zap(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let body = json_body(&body)?;
    let (Some(id), Some(trigger)) = (string_of(&body, "id"), body.get("trigger").filter(|t| !t.is_null())) else {
        return Err(ApiError::BadRequest("Zap ID and trigger are required".to_string()));
    };

    let now = Utc::now();
    let zap = Zap {
        name: string_of(&body, "name").unwrap_or_else(|| id.clone()),
        user_id: string_of(&body, "userId"),
        status: status_of(&body).unwrap_or_default(),
        trigger: trigger_of(trigger)?,
        actions: actions_of(body.get("actions"))?,
        created_at: now,
        updated_at: now,
        id,
    };
    let zap = state.store.register_zap(zap).await?;
    info!(zap_id = %zap.id, trigger = zap.trigger.kind(), "Zap registered for monitoring");

    Ok(Json(json!({
        "status": "success",
        "message": "Zap registered for automatic monitoring",
        "zapId": zap.id,
    })))
}

pub async fn list_zaps(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Zap>>, ApiError> {
    let user_id = query.get("userId").map(String::as_str).filter(|u| !u.is_empty());
    Ok(Json(state.store.list_zaps(user_id).await?))
}

pub async fn get_zap(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Zap>, ApiError> {
    state
        .store
        .get_zap(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Zap not found".to_string()))
}

pub async fn update_zap(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Zap>, ApiError> {
    let body = json_body(&body)?;
    let patch = ZapPatch {
        name: string_of(&body, "name"),
        status: status_of(&body),
        trigger: body.get("trigger").filter(|t| !t.is_null()).map(trigger_of).transpose()?,
        actions: match body.get("actions") {
            None | Some(Value::Null) => None,
            actions => Some(actions_of(actions)?),
        },
    };
    Ok(Json(state.store.update_zap(&id, patch).await?))
}

pub async fn delete_zap(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    state.store.delete_zap(&id).await?;
    Ok(Json(json!({ "success": true, "message": "Zap deleted successfully" })))
}

/// `limit` and `offset` fall back to their defaults when missing or unparsable.
pub async fn list_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let number = |key: &str| query.get(key).and_then(|v| v.trim().parse::<usize>().ok());
    let limit = number("limit").filter(|l| *l > 0).unwrap_or(DEFAULT_RUNS_LIMIT);
    let offset = number("offset").unwrap_or(0);
    let runs = state.store.list_runs(&id, limit, offset).await?;
    Ok(Json(json!(runs)))
}
