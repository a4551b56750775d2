// The `price` module fires price-alert zaps when a token crosses its target.

use crate::model::{PriceCondition, PriceTrigger, TriggerSpec};
use crate::store::ZapStore;
use crate::triggers::{Probe, TriggerError, event::TriggerEvent, event::TriggerSource};
use crate::utils::HttpClient;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const COINGECKO_URL: &str = "https://api.coingecko.com";
const FEED_TIMEOUT: Duration = Duration::from_secs(5);

/// A source of USD spot prices.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn usd_price(&self, symbol: &str) -> Result<f64, TriggerError>;
}

/// The CoinGecko id for a ticker symbol.
pub fn coingecko_id(symbol: &str) -> String {
    match symbol.to_ascii_uppercase().as_str() {
        "BTC" => "bitcoin".to_string(),
        "ETH" => "ethereum".to_string(),
        "SOL" => "solana".to_string(),
        "MATIC" => "matic-network".to_string(),
        "AVAX" => "avalanche-2".to_string(),
        "DOT" => "polkadot".to_string(),
        "LINK" => "chainlink".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

/// [`PriceFeed`] over CoinGecko's simple price endpoint.
pub struct CoinGeckoFeed {
    http: HttpClient,
    base_url: String,
}

impl CoinGeckoFeed {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    async fn usd_price(&self, symbol: &str) -> Result<f64, TriggerError> {
        let id = coingecko_id(symbol);
        let url = format!(
            "{}/api/v3/simple/price?ids={id}&vs_currencies=usd",
            self.base_url
        );
        let response = self.http.get(&url, FEED_TIMEOUT).await?;
        if !response.is_success() {
            return Err(TriggerError::PriceFeed(format!(
                "price API returned {} for {symbol}",
                response.status
            )));
        }
        response.json_or_text()[&id]["usd"]
            .as_f64()
            .ok_or_else(|| TriggerError::PriceFeed(format!("no USD price for {symbol}")))
    }
}

/// Whether an observation should fire: the condition must hold now, and either
/// nothing was observed before or the price crossed the target since then.
pub fn should_fire(condition: PriceCondition, target: f64, last: Option<f64>, now: f64) -> bool {
    if !condition.is_met(now, target) {
        return false;
    }
    match (condition, last) {
        (_, None) => true,
        (PriceCondition::Above, Some(last)) => last <= target,
        (PriceCondition::Below, Some(last)) => last >= target,
    }
}

/// Checks every active price zap against the feed.
pub struct PriceProbe {
    store: Arc<dyn ZapStore>,
    feed: Arc<dyn PriceFeed>,
    last_prices: Mutex<HashMap<String, f64>>,
}

impl PriceProbe {
    pub fn new(store: Arc<dyn ZapStore>, feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            store,
            feed,
            last_prices: Mutex::new(HashMap::new()),
        }
    }

    /// Stores `price` for `key` and returns the previous observation.
    fn observe(&self, key: &str, price: f64) -> Option<f64> {
        match self.last_prices.lock() {
            Ok(mut cache) => cache.insert(key.to_string(), price),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl Probe for PriceProbe {
    fn name(&self) -> &str {
        "price"
    }

    async fn check(&self) -> Result<Vec<TriggerEvent>, TriggerError> {
        let zaps = self.store.active_zaps().await?;
        let mut quotes: HashMap<String, f64> = HashMap::new();
        let mut events = Vec::new();

        for zap in zaps {
            let TriggerSpec::Price(PriceTrigger {
                symbol,
                target_price,
                condition,
            }) = &zap.trigger
            else {
                continue;
            };
            // A zero target counts as unset.
            let symbol = symbol.as_ref().filter(|s| !s.is_empty());
            let target = (*target_price).filter(|t| *t > 0.0);
            let (Some(symbol), Some(target)) = (symbol, target) else {
                warn!(zap_id = %zap.id, "Skipping price zap: missing symbol or targetPrice");
                continue;
            };

            let price = match quotes.get(symbol) {
                Some(price) => *price,
                None => match self.feed.usd_price(symbol).await {
                    Ok(price) => {
                        quotes.insert(symbol.clone(), price);
                        price
                    }
                    Err(e) => {
                        warn!(zap_id = %zap.id, symbol = %symbol, error = %e, "Could not fetch price");
                        continue;
                    }
                },
            };

            let last = self.observe(&format!("{}-{}", zap.id, symbol), price);
            debug!(zap_id = %zap.id, symbol = %symbol, price, target, ?last, "Price observed");
            if !should_fire(*condition, target, last, price) {
                continue;
            }

            info!(zap_id = %zap.id, symbol = %symbol, price, target, condition = condition.as_str(), "Price condition met");
            events.push(TriggerEvent {
                zap_id: zap.id.clone(),
                source: TriggerSource::Price,
                payload: json!({
                    "price": price,
                    "symbol": symbol,
                    "targetPrice": target,
                    "condition": condition.as_str(),
                    "timestamp": Utc::now().to_rfc3339(),
                }),
            });
        }
        Ok(events)
    }
}
