use crate::actions::{Action, ActionContext, ActionError, ActionOutput, required_str, str_field};
use crate::model::ActionKind;
use crate::utils::{HttpClient, HttpError};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Calls an arbitrary HTTP endpoint with a JSON payload.
pub struct WebhookAction {
    http: HttpClient,
}

impl WebhookAction {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Action for WebhookAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Webhook
    }

    async fn execute(&self, ctx: &ActionContext, config: &Value) -> Result<ActionOutput, ActionError> {
        let url = required_str(config, "url")?;
        let method = str_field(config, "method")
            .unwrap_or("POST")
            .to_ascii_uppercase();

        // User headers override the JSON content type.
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(extra) = config.get("headers").and_then(Value::as_object) {
            for (name, value) in extra {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
                headers.push((name.clone(), value));
            }
        }
        let body = if method == "GET" {
            None
        } else {
            let payload = config.get("payload").cloned().unwrap_or_else(|| json!({}));
            let bytes = serde_json::to_vec(&payload)
                .map_err(|e| HttpError::InvalidRequest(format!("payload is not serializable: {e}")))?;
            Some(bytes)
        };

        let response = self
            .http
            .send(&method, url, &headers, body, WEBHOOK_TIMEOUT)
            .await?;
        let data = if response.body.is_empty() {
            json!({})
        } else {
            response.json_or_text()
        };
        if !response.is_success() {
            return Err(ActionError::HttpStatus {
                status: response.status.as_u16(),
                body: data.to_string(),
            });
        }
        info!(zap_id = %ctx.zap_id, url, status = %response.status, "Webhook called");

        Ok(ActionOutput {
            message: format!("Webhook called successfully: {url}"),
            details: json!({
                "url": url,
                "method": method,
                "status": response.status.as_u16(),
                "response": data,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::test_server;
    use axum::{
        Json, Router,
        body::Bytes,
        http::{HeaderMap, Method, StatusCode},
        routing::any,
    };

    fn ctx() -> ActionContext {
        ActionContext {
            zap_id: "zap-1".to_string(),
            zap_name: "Hook".to_string(),
            trigger_data: json!({}),
            google: None,
        }
    }

    async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Value> {
        Json(json!({
            "method": method.as_str(),
            "contentType": headers.get("content-type").and_then(|v| v.to_str().ok()),
            "auth": headers.get("x-api-key").and_then(|v| v.to_str().ok()),
            "bodyLen": body.len(),
            "body": serde_json::from_slice::<Value>(&body).ok(),
        }))
    }

    #[tokio::test]
    async fn posts_payload_with_merged_headers() {
        // --- 1. Arrange ---
        let base = test_server::spawn(Router::new().route("/hook", any(echo))).await;
        let action = WebhookAction::new(HttpClient::new());
        let config = json!({
            "url": format!("{base}/hook"),
            "headers": { "X-Api-Key": "k1", "content-type": "application/vnd.zap+json" },
            "payload": { "price": 3100 }
        });

        // --- 2. Act ---
        let output = action.execute(&ctx(), &config).await.unwrap();

        // --- 3. Assert ---
        let echoed = &output.details["response"];
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["contentType"], "application/vnd.zap+json");
        assert_eq!(echoed["auth"], "k1");
        assert_eq!(echoed["body"]["price"], 3100);
        assert_eq!(output.details["status"], 200);
    }

    #[tokio::test]
    async fn get_sends_no_body() {
        let base = test_server::spawn(Router::new().route("/hook", any(echo))).await;
        let action = WebhookAction::new(HttpClient::new());
        let config = json!({ "url": format!("{base}/hook"), "method": "get", "payload": { "a": 1 } });

        let output = action.execute(&ctx(), &config).await.unwrap();

        assert_eq!(output.details["response"]["method"], "GET");
        assert_eq!(output.details["response"]["bodyLen"], 0);
    }

    #[tokio::test]
    async fn empty_response_is_reported_as_empty_object() {
        // --- 1. Arrange ---
        let router = Router::new().route("/hook", any(|| async { StatusCode::NO_CONTENT }));
        let base = test_server::spawn(router).await;
        let action = WebhookAction::new(HttpClient::new());

        // --- 2. Act ---
        let output = action
            .execute(&ctx(), &json!({ "url": format!("{base}/hook") }))
            .await
            .unwrap();

        // --- 3. Assert ---
        assert_eq!(output.details["status"], 204);
        assert_eq!(output.details["response"], json!({}));
    }

    #[tokio::test]
    async fn error_status_fails_with_response_body() {
        let router = Router::new().route(
            "/hook",
            any(|| async { (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": "bad" }))) }),
        );
        let base = test_server::spawn(router).await;
        let action = WebhookAction::new(HttpClient::new());

        let err = action
            .execute(&ctx(), &json!({ "url": format!("{base}/hook") }))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), r#"Webhook returned 422: {"error":"bad"}"#);
        assert!(!err.is_transient());
    }
}
