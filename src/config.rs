// The `config` module reads service settings from the environment.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_DATA_PATH: &str = "./data/zapforge.json";
pub const DEFAULT_FROM_EMAIL: &str = "noreply@example.com";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} is required when MAIL_PROVIDER is sendgrid")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailProvider {
    Gmail,
    SendGrid,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub frontend_url: Option<String>,
    pub data_path: PathBuf,
    pub gmail_poll_interval: Duration,
    pub price_poll_interval: Duration,
    pub trigger_start_delay: Duration,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub mail_provider: MailProvider,
    pub sendgrid_api_key: Option<String>,
    pub from_email: String,
    pub coingecko_url: String,
    pub action_retries: usize,
    pub shutdown_grace: Duration,
}

/// Plain digits are seconds; anything else goes through `humantime` (`90s`, `2m`).
fn parse_duration(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let duration = |key: &'static str, default: u64| match get(key) {
            Some(raw) => parse_duration(key, &raw),
            None => Ok(Duration::from_secs(default)),
        };

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };
        let action_retries = match get("ACTION_RETRIES") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "ACTION_RETRIES",
                value: raw,
            })?,
            None => 2,
        };
        let mail_provider = match get("MAIL_PROVIDER").map(|v| v.to_ascii_lowercase()) {
            None => MailProvider::Gmail,
            Some(v) if v == "gmail" => MailProvider::Gmail,
            Some(v) if v == "sendgrid" => MailProvider::SendGrid,
            Some(value) => {
                return Err(ConfigError::Invalid {
                    key: "MAIL_PROVIDER",
                    value,
                });
            }
        };
        let sendgrid_api_key = get("SENDGRID_API_KEY");
        if mail_provider == MailProvider::SendGrid && sendgrid_api_key.is_none() {
            return Err(ConfigError::Missing("SENDGRID_API_KEY"));
        }

        Ok(Self {
            port,
            frontend_url: get("FRONTEND_URL"),
            data_path: get("ZAPFORGE_DATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH)),
            gmail_poll_interval: duration("GMAIL_POLL_SECS", 60)?,
            price_poll_interval: duration("PRICE_POLL_SECS", 60)?,
            trigger_start_delay: duration("TRIGGER_START_DELAY_SECS", 5)?,
            google_client_id: get("GOOGLE_CLIENT_ID"),
            google_client_secret: get("GOOGLE_CLIENT_SECRET"),
            mail_provider,
            sendgrid_api_key,
            from_email: get("FROM_EMAIL").unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string()),
            coingecko_url: get("COINGECKO_URL")
                .unwrap_or_else(|| crate::triggers::price::COINGECKO_URL.to_string()),
            action_retries,
            shutdown_grace: duration("SHUTDOWN_GRACE_SECS", 10)?,
        })
    }
}
