//! Side-effecting steps a zap runs once its trigger fires.
//!
//! Every action implements [`Action`]. The executor looks handlers up by
//! [`ActionKind`] in an [`ActionRegistry`] and hands them the action config
//! after template rendering.

pub mod calendar;
pub mod email;
pub mod retry;
pub mod sheets;
pub mod slack;
pub mod webhook;

pub use calendar::CalendarAction;
pub use email::{EmailAction, GmailMailer, Mailer, OutgoingEmail, SendGridMailer};
pub use retry::{RetryConfig, RetryStrategy, RetryingAction};
pub use sheets::SheetsAction;
pub use slack::SlackAction;
pub use webhook::WebhookAction;

use crate::model::{ActionKind, GoogleAccount};
use crate::utils::google_auth::AuthError;
use crate::utils::{HttpError, TEngineError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Google account not connected. Please authorize Google access first.")]
    GoogleNotConnected,
    #[error("Missing required field `{0}`")]
    MissingField(&'static str),
    #[error("Webhook returned {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("{0}")]
    Http(#[from] HttpError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("Google API error: {0}")]
    Google(String),
    #[error("Template error: {0}")]
    Template(#[from] TEngineError),
    #[error("{0}")]
    InvalidDateTime(String),
    #[error("Mail provider error: {0}")]
    Mail(String),
    #[error("Email header `{0}` must not contain line breaks")]
    InvalidHeader(&'static str),
    #[error("Action type '{0}' is not implemented yet")]
    Unsupported(String),
}

impl ActionError {
    /// The HTTP status behind the error, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ActionError::HttpStatus { status, .. } => Some(*status),
            ActionError::Google(message) | ActionError::Mail(message) => google_error_json(message)
                .and_then(|json| json["error"]["code"].as_u64())
                .and_then(|code| u16::try_from(code).ok()),
            _ => None,
        }
    }

    /// True for failures worth another attempt: rate limits, timeouts, server errors
    /// and dropped connections.
    pub fn is_transient(&self) -> bool {
        match self {
            ActionError::Http(HttpError::Transport(_)) | ActionError::Http(HttpError::Timeout(_)) => {
                true
            }
            _ => matches!(self.status_code(), Some(429 | 408 | 500..=599)),
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        self.status_code() == Some(429)
    }

    /// The `retryDelay` a Google API error asks the caller to wait.
    pub fn retry_hint(&self) -> Option<Duration> {
        let message = match self {
            ActionError::Google(message) | ActionError::Mail(message) => message,
            _ => return None,
        };
        let json = google_error_json(message)?;
        json["error"]["details"]
            .as_array()?
            .iter()
            .filter(|d| d["@type"].as_str() == Some("type.googleapis.com/google.rpc.RetryInfo"))
            .find_map(|d| d["retryDelay"].as_str())
            .and_then(|delay| humantime::parse_duration(delay).ok())
    }
}

/// Extracts the JSON error document embedded in a Google client error message.
fn google_error_json(message: &str) -> Option<Value> {
    let start = message.find('{')?;
    serde_json::from_str(&message[start..]).ok()
}

/// What an action reports back on success.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutput {
    pub message: String,
    pub details: Value,
}

/// Run-scoped inputs shared by every action of a zap run.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub zap_id: String,
    pub zap_name: String,
    pub trigger_data: Value,
    pub google: Option<GoogleAccount>,
}

impl ActionContext {
    /// The linked Google account, or the error shown to users without one.
    pub fn google_account(&self) -> Result<&GoogleAccount, ActionError> {
        self.google.as_ref().ok_or(ActionError::GoogleNotConnected)
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    fn kind(&self) -> ActionKind;

    /// Runs the action with an already-rendered `config`.
    async fn execute(&self, ctx: &ActionContext, config: &Value) -> Result<ActionOutput, ActionError>;
}

/// Action handlers by kind.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<ActionKind, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, action: Arc<dyn Action>) -> Self {
        self.actions.insert(action.kind(), action);
        self
    }

    /// Registers `action` behind a [`RetryingAction`] unless retries are disabled.
    pub fn register_with_retry(self, action: Arc<dyn Action>, retry: &RetryConfig) -> Self {
        if retry.max_attempts == 0 {
            return self.register(action);
        }
        self.register(Arc::new(RetryingAction::new(action, retry.clone())))
    }

    pub fn get(&self, kind: &ActionKind) -> Option<Arc<dyn Action>> {
        self.actions.get(kind).cloned()
    }
}

pub(crate) fn str_field<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(crate) fn required_str<'a>(config: &'a Value, key: &'static str) -> Result<&'a str, ActionError> {
    str_field(config, key).ok_or(ActionError::MissingField(key))
}
