// Wallet sign-up and Google account linking.

use crate::model::GoogleAccount;
use crate::server::AppState;
use crate::server::error::{ApiError, json_body};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

pub async fn signup(body: Bytes) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = json_body(&body)?;
    let address = body
        .get("address")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Wallet address is required".to_string()))?;

    let suffix = Uuid::new_v4().simple().to_string();
    info!(wallet = %address, "Wallet signed up");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "User registered successfully",
            "token": format!("mock_jwt_token_for_{address}"),
            "user": {
                "id": format!("user_{}", &suffix[..9]),
                "address": address,
            },
        })),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkAccount {
    #[serde(default)]
    wallet: String,
    #[serde(default)]
    access_token: String,
    refresh_token: Option<String>,
    email: Option<String>,
    expiry: Option<DateTime<Utc>>,
    /// Milliseconds since the epoch, as Google's token response reports it.
    expiry_date: Option<i64>,
}

/// Stores the tokens of a completed Google consent for a wallet.
pub async fn link_google_account(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = json_body(&body)?;
    let link: LinkAccount = serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if link.wallet.is_empty() || link.access_token.is_empty() {
        return Err(ApiError::BadRequest(
            "Wallet address and access token are required".to_string(),
        ));
    }

    let expiry = link
        .expiry
        .or_else(|| link.expiry_date.and_then(DateTime::from_timestamp_millis));
    state
        .store
        .upsert_google_account(GoogleAccount {
            wallet: link.wallet.clone(),
            email: link.email.clone(),
            access_token: link.access_token,
            refresh_token: link.refresh_token,
            expiry,
        })
        .await?;
    state.hubs.invalidate(&link.wallet).await;
    info!(wallet = %link.wallet, email = ?link.email, "Google account linked");

    Ok(Json(json!({
        "status": "success",
        "message": "Google account connected",
        "wallet": link.wallet,
    })))
}

pub async fn google_status(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer "));
    if !bearer {
        return Err(ApiError::Unauthorized("Unauthorized: No token provided".to_string()));
    }
    let wallet = query
        .get("wallet")
        .filter(|w| !w.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Wallet address is required".to_string()))?;

    let account = state.store.google_account(wallet).await?;
    Ok(Json(json!({
        "status": "success",
        "connected": account.as_ref().is_some_and(|a| !a.access_token.is_empty()),
        "email": account.and_then(|a| a.email),
    })))
}
