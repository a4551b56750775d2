// The `context_hub` module caches authenticated Google hubs per linked wallet.

use super::google_auth::{AuthError, GConf, GoogleHubs, google_hubs};
use crate::model::GoogleAccount;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::debug;

struct CachedHubs {
    access_token: String,
    hubs: Arc<GoogleHubs>,
}

/// A hub for sharing Google API clients between triggers and actions.
///
/// Hubs are built once per wallet and reused until the stored access token
/// changes, at which point they are rebuilt with the new credentials.
///
/// This struct is intended to be wrapped in an `Arc`.
pub struct ContextHub {
    gconf: GConf,
    hubs: TokioMutex<HashMap<String, CachedHubs>>,
}

impl ContextHub {
    pub fn new(gconf: GConf) -> Self {
        Self {
            gconf,
            hubs: TokioMutex::new(HashMap::new()),
        }
    }

    /// Returns the hubs for `account`, building them on first use.
    pub async fn hubs_for(&self, account: &GoogleAccount) -> Result<Arc<GoogleHubs>, AuthError> {
        let key = account.wallet.to_ascii_lowercase();
        let mut cache = self.hubs.lock().await;
        if let Some(cached) = cache.get(&key) {
            if cached.access_token == account.access_token {
                return Ok(cached.hubs.clone());
            }
            debug!(wallet = %account.wallet, "Access token changed, rebuilding Google hubs");
        }

        let hubs = Arc::new(google_hubs(&self.gconf, account).await?);
        cache.insert(
            key,
            CachedHubs {
                access_token: account.access_token.clone(),
                hubs: hubs.clone(),
            },
        );
        Ok(hubs)
    }

    /// Drops the cached hubs of `wallet`.
    pub async fn invalidate(&self, wallet: &str) {
        self.hubs.lock().await.remove(&wallet.to_ascii_lowercase());
    }
}
