// Routes that run zaps on request: the per-zap webhook, webhook-trigger hooks and test runs.

use crate::executor::RunMode;
use crate::model::ZapStatus;
use crate::server::AppState;
use crate::server::error::{ApiError, json_body};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::{error, info};

pub const WALLET_HEADER: &str = "x-wallet-address";

fn headers_json(headers: &HeaderMap) -> Value {
    let map: Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect();
    Value::Object(map)
}

pub async fn zap_webhook(
    State(state): State<AppState>,
    Path(zap_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload = json_body(&body)?;
    info!(zap_id = %zap_id, "Webhook received for zap");
    let zap = state
        .store
        .get_zap(&zap_id)
        .await?
        .filter(|z| z.status != ZapStatus::Deleted)
        .ok_or_else(|| ApiError::NotFound("Zap not found".to_string()))?;

    let response = match state.executor.execute(&zap, payload, RunMode::Triggered).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": "Webhook received and zap executed",
                "zapId": zap_id,
                "result": report,
            })),
        ),
        Err(e) => {
            error!(zap_id = %zap_id, error = %e, "Webhook zap execution failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": "Webhook received but zap execution failed",
                    "zapId": zap_id,
                    "error": e.to_string(),
                })),
            )
        }
    };
    Ok(response.into_response())
}

pub async fn hook(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload = json_body(&body)?;
    let zap = state
        .store
        .find_by_webhook(&webhook_id)
        .await?
        .filter(|z| z.status == ZapStatus::Active)
        .ok_or_else(|| ApiError::NotFound("Webhook not found or inactive".to_string()))?;
    info!(zap_id = %zap.id, webhook_id = %webhook_id, "Webhook trigger fired");

    let mode = RunMode::Hook {
        webhook_id,
        headers: headers_json(&headers),
    };
    match state.executor.execute(&zap, payload, mode).await {
        Ok(report) => Ok(Json(report).into_response()),
        Err(e) => {
            error!(zap_id = %zap.id, error = %e, "Failed to process webhook");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Failed to process webhook",
                    "error": e.to_string(),
                })),
            )
                .into_response())
        }
    }
}

/// Test run. The wallet comes from `?wallet=` or the `x-wallet-address` header.
/// The body may carry the client-side `zap` and the `triggerData` to run with.
pub async fn test_zap(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut body = json_body(&body)?;
    let wallet = query
        .get("wallet")
        .cloned()
        .or_else(|| {
            headers
                .get(WALLET_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .filter(|w| !w.is_empty());
    let body_zap = body.get_mut("zap").map(Value::take);
    let trigger_data = body
        .get_mut("triggerData")
        .map(Value::take)
        .filter(|v| !v.is_null())
        .unwrap_or_else(|| json!({}));

    let zap = state.resolver.resolve(&id, body_zap).await?;
    info!(zap_id = %zap.id, wallet = ?wallet, "Test run requested");
    let report = state
        .executor
        .execute(&zap, trigger_data, RunMode::Test { wallet })
        .await?;
    Ok(Json(report).into_response())
}
