use crate::error::KeeperError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use zapforge::utils::HttpClient;

pub const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Decides whether an off-chain-triggered zap should be executed now.
#[async_trait]
pub trait TriggerOracle: Send + Sync {
    async fn should_execute(&self, chain_zap_id: u64) -> Result<bool, KeeperError>;

    /// Puts a consumed signal back so the next cycle tries the zap again.
    async fn requeue(&self, chain_zap_id: u64) -> Result<(), KeeperError>;
}

/// Asks the hooks backend, which consumes the pending signal on a positive answer.
pub struct HttpTriggerOracle {
    http: HttpClient,
    backend_url: String,
}

impl HttpTriggerOracle {
    pub fn new(http: HttpClient, backend_url: impl Into<String>) -> Self {
        Self {
            http,
            backend_url: backend_url.into(),
        }
    }
}

#[async_trait]
impl TriggerOracle for HttpTriggerOracle {
    async fn should_execute(&self, chain_zap_id: u64) -> Result<bool, KeeperError> {
        let url = format!("{}/api/v1/keeper/check-trigger/{chain_zap_id}", self.backend_url);
        let response = self
            .http
            .get(&url, CHECK_TIMEOUT)
            .await
            .map_err(|e| KeeperError::Oracle(e.to_string()))?;
        if !response.is_success() {
            return Err(KeeperError::Oracle(format!("{url} returned {}", response.status)));
        }
        Ok(response
            .json_or_text()
            .get("shouldExecute")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn requeue(&self, chain_zap_id: u64) -> Result<(), KeeperError> {
        let url = format!("{}/api/v1/keeper/signal/{chain_zap_id}", self.backend_url);
        let response = self
            .http
            .post_json(&url, &[], &json!({}), CHECK_TIMEOUT)
            .await
            .map_err(|e| KeeperError::Oracle(e.to_string()))?;
        if !response.is_success() {
            return Err(KeeperError::Oracle(format!("{url} returned {}", response.status)));
        }
        Ok(())
    }
}
