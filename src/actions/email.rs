// The `email` action and the mail transports behind it.

use crate::actions::{Action, ActionContext, ActionError, ActionOutput, required_str, str_field};
use crate::model::{ActionKind, GoogleAccount};
use crate::utils::HttpClient;
use crate::utils::context_hub::ContextHub;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use google_gmail1::api::Message;
use serde_json::{Value, json};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const SENDGRID_URL: &str = "https://api.sendgrid.com";
const PREVIEW_CHARS: usize = 100;
const MAIL_TIMEOUT: Duration = Duration::from_secs(30);
/// Raw bytes per RFC 2047 encoded word, keeping each word under 75 characters.
const ENCODED_WORD_BYTES: usize = 45;

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    /// Rejects header values that could smuggle in extra headers.
    pub fn validate(&self) -> Result<(), ActionError> {
        for (name, value) in [("from", &self.from), ("to", &self.to), ("subject", &self.subject)] {
            if value.contains(['\r', '\n']) {
                return Err(ActionError::InvalidHeader(name));
            }
        }
        Ok(())
    }

    /// The message as an RFC 822 document with a plain-text body.
    pub fn to_rfc822(&self) -> Result<String, ActionError> {
        self.validate()?;
        Ok(format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
            self.from,
            self.to,
            encode_header_text(&self.subject),
            self.body
        ))
    }
}

/// ASCII text passes through; anything else becomes folded `=?UTF-8?B?...?=` words.
fn encode_header_text(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in text.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(&chunk)));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(&chunk)));
    }
    words.join("\r\n ")
}

/// A transport that delivers one email and returns the provider's message id.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        account: Option<&GoogleAccount>,
        email: &OutgoingEmail,
    ) -> Result<String, ActionError>;
}

/// Sends as the zap owner's Gmail account.
pub struct GmailMailer {
    hubs: Arc<ContextHub>,
}

impl GmailMailer {
    pub fn new(hubs: Arc<ContextHub>) -> Self {
        Self { hubs }
    }
}

#[async_trait]
impl Mailer for GmailMailer {
    async fn send(
        &self,
        account: Option<&GoogleAccount>,
        email: &OutgoingEmail,
    ) -> Result<String, ActionError> {
        let account = account.ok_or(ActionError::GoogleNotConnected)?;
        let hubs = self.hubs.hubs_for(account).await?;
        let mime_type: mime::Mime = "message/rfc822"
            .parse()
            .map_err(|e: mime::FromStrError| ActionError::Mail(e.to_string()))?;
        let (_, sent) = hubs
            .gmail
            .users()
            .messages_send(Message::default(), "me")
            .upload(Cursor::new(email.to_rfc822()?.into_bytes()), mime_type)
            .await
            .map_err(|e| ActionError::Google(e.to_string()))?;
        Ok(sent.id.unwrap_or_default())
    }
}

/// Sends through SendGrid's v3 mail API.
pub struct SendGridMailer {
    http: HttpClient,
    api_key: String,
    base_url: String,
}

impl SendGridMailer {
    pub fn new(http: HttpClient, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn payload(email: &OutgoingEmail) -> Value {
        json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": { "email": email.from },
            "subject": email.subject,
            "content": [{ "type": "text/plain", "value": email.body }],
        })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(
        &self,
        _account: Option<&GoogleAccount>,
        email: &OutgoingEmail,
    ) -> Result<String, ActionError> {
        let response = self
            .http
            .post_json(
                &format!("{}/v3/mail/send", self.base_url),
                &[(
                    "Authorization".to_string(),
                    format!("Bearer {}", self.api_key),
                )],
                &Self::payload(email),
                MAIL_TIMEOUT,
            )
            .await?;
        if !response.is_success() {
            return Err(ActionError::Mail(format!(
                "SendGrid returned {}: {}",
                response.status,
                response.json_or_text()
            )));
        }
        Ok(response
            .headers
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string())
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() > PREVIEW_CHARS {
        format!("{}...", body.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        body.to_string()
    }
}

/// Sends `config.body` to `config.to` with `config.subject`.
pub struct EmailAction {
    mailer: Arc<dyn Mailer>,
    default_from: String,
}

impl EmailAction {
    pub fn new(mailer: Arc<dyn Mailer>, default_from: impl Into<String>) -> Self {
        Self {
            mailer,
            default_from: default_from.into(),
        }
    }
}

#[async_trait]
impl Action for EmailAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Email
    }

    async fn execute(&self, ctx: &ActionContext, config: &Value) -> Result<ActionOutput, ActionError> {
        let to = required_str(config, "to")?;
        let subject = required_str(config, "subject")?;
        let body = str_field(config, "body").unwrap_or_default();
        let from = str_field(config, "from")
            .map(str::to_string)
            .or_else(|| ctx.google.as_ref().and_then(|a| a.email.clone()))
            .unwrap_or_else(|| self.default_from.clone());

        let email = OutgoingEmail {
            from,
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        };
        email.validate()?;
        let message_id = self.mailer.send(ctx.google.as_ref(), &email).await?;
        info!(zap_id = %ctx.zap_id, to = %to, message_id = %message_id, "Email sent");

        Ok(ActionOutput {
            message: format!("Email sent successfully to {to}"),
            details: json!({
                "to": to,
                "subject": subject,
                "bodyPreview": preview(body),
                "messageId": message_id,
            }),
        })
    }
}
