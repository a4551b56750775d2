use crate::error::KeeperError;
use alloy::primitives::Address;
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3002";
pub const CYCLE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct KeeperConfig {
    pub rpc_url: String,
    pub private_key: String,
    pub contract_address: Address,
    pub backend_url: String,
    pub interval: Duration,
}

impl std::fmt::Debug for KeeperConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeeperConfig")
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .field("contract_address", &self.contract_address)
            .field("backend_url", &self.backend_url)
            .field("interval", &self.interval)
            .finish()
    }
}

impl KeeperConfig {
    pub fn from_env() -> Result<Self, KeeperError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, KeeperError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let missing: Vec<&str> = ["SEPOLIA_RPC_URL", "KEEPER_PRIVATE_KEY", "ZAP_CONTRACT_ADDRESS"]
            .into_iter()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(KeeperError::Config(format!(
                "required environment variables not set: {}",
                missing.join(", ")
            )));
        }

        let raw_address = get("ZAP_CONTRACT_ADDRESS").unwrap_or_default();
        let contract_address = raw_address
            .trim()
            .parse::<Address>()
            .map_err(|e| KeeperError::Config(format!("ZAP_CONTRACT_ADDRESS {raw_address}: {e}")))?;

        Ok(Self {
            rpc_url: get("SEPOLIA_RPC_URL").unwrap_or_default(),
            private_key: get("KEEPER_PRIVATE_KEY").unwrap_or_default(),
            contract_address,
            backend_url: get("BACKEND_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            interval: CYCLE_INTERVAL,
        })
    }
}
