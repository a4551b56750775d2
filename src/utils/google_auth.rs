// The `google_auth` module builds authenticated Google API hubs for a linked account.

use crate::model::GoogleAccount;
use crate::utils::http::{HttpsConnectorType, https_connector};
use google_calendar3::CalendarHub;
use google_gmail1::{
    Gmail,
    yup_oauth2::{AuthorizedUserAuthenticator, authorized_user::AuthorizedUserSecret},
};
use google_sheets4::Sheets;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// A type alias for the Gmail hub.
pub type GmailHubType = Gmail<HttpsConnectorType>;
/// A type alias for the Sheets hub.
pub type SheetsHubType = Sheets<HttpsConnectorType>;
/// A type alias for the Calendar hub.
pub type CalendarHubType = CalendarHub<HttpsConnectorType>;

/// The `AuthError` enum defines the possible errors that can occur during authentication.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Google account for {0} has no access token")]
    MissingToken(String),
    #[error("Failed to set up token refresh: {0}")]
    Refresh(String),
}

/// The `GConf` struct holds the OAuth client used to refresh user tokens.
#[derive(Clone, Debug, Default)]
pub struct GConf(Arc<InnerConf>);

/// The inner configuration for `GConf`.
#[derive(Clone, Debug, Default)]
pub struct InnerConf {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl GConf {
    pub fn new(client_id: Option<String>, client_secret: Option<String>) -> GConf {
        GConf(Arc::new(InnerConf {
            client_id,
            client_secret,
        }))
    }

    /// The refresh secret for `account`, when both the client and the account allow it.
    fn refresh_secret(&self, account: &GoogleAccount) -> Option<AuthorizedUserSecret> {
        let client_id = self.0.client_id.clone()?;
        let client_secret = self.0.client_secret.clone()?;
        let refresh_token = account.refresh_token.clone()?;
        Some(AuthorizedUserSecret {
            client_id,
            client_secret,
            refresh_token,
            key_type: "authorized_user".to_string(),
        })
    }
}

/// The three Google APIs an account is used for.
#[derive(Clone)]
pub struct GoogleHubs {
    pub gmail: GmailHubType,
    pub sheets: SheetsHubType,
    pub calendar: CalendarHubType,
}

/// Builds the hubs for `account`.
///
/// With a refresh token and a configured OAuth client the hubs refresh their own
/// tokens. Otherwise the stored access token is used as-is until it expires.
pub async fn google_hubs(conf: &GConf, account: &GoogleAccount) -> Result<GoogleHubs, AuthError> {
    if account.access_token.is_empty() && account.refresh_token.is_none() {
        return Err(AuthError::MissingToken(account.wallet.clone()));
    }
    let https = https_connector();
    let client = || Client::builder(TokioExecutor::new()).build(https.clone());

    match conf.refresh_secret(account) {
        Some(secret) => {
            let auth = AuthorizedUserAuthenticator::builder(secret)
                .build()
                .await
                .map_err(|e| AuthError::Refresh(e.to_string()))?;
            info!(wallet = %account.wallet, "Google hubs ready with token refresh");
            Ok(GoogleHubs {
                gmail: Gmail::new(client(), auth.clone()),
                sheets: Sheets::new(client(), auth.clone()),
                calendar: CalendarHub::new(client(), auth),
            })
        }
        None => {
            debug!(wallet = %account.wallet, "Google hubs ready with a static access token");
            let token = account.access_token.clone();
            Ok(GoogleHubs {
                gmail: Gmail::new(client(), token.clone()),
                sheets: Sheets::new(client(), token.clone()),
                calendar: CalendarHub::new(client(), token),
            })
        }
    }
}
