// The `gmail` module watches linked inboxes for unread mail matching gmail-workflow zaps.

use crate::model::{GmailCriteria, GoogleAccount, TriggerSpec, Zap};
use crate::store::ZapStore;
use crate::triggers::{Probe, TriggerError, event::TriggerEvent, event::TriggerSource};
use crate::utils::context_hub::ContextHub;
use crate::utils::google_auth::GmailHubType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::api::{Message, MessagePart, ModifyMessageRequest};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Messages listed per query.
pub const MAX_RESULTS: u32 = 10;
/// How many processed message ids are remembered.
pub const PROCESSED_CAPACITY: usize = 10_000;

/// An email as handed to a zap run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboxMessage {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Read access to one mailbox.
#[async_trait]
pub trait Inbox: Send + Sync {
    /// Ids of unread messages matching `query`, at most `max_results`.
    async fn list_unread(&self, query: &str, max_results: u32) -> Result<Vec<String>, TriggerError>;

    async fn fetch(&self, id: &str) -> Result<InboxMessage, TriggerError>;

    async fn mark_read(&self, id: &str) -> Result<(), TriggerError>;
}

/// Opens the inbox of a linked account.
#[async_trait]
pub trait InboxProvider: Send + Sync {
    async fn inbox(&self, account: &GoogleAccount) -> Result<Arc<dyn Inbox>, TriggerError>;
}

/// [`Inbox`] over the Gmail API.
pub struct GmailInbox {
    hub: GmailHubType,
}

impl GmailInbox {
    pub fn new(hub: GmailHubType) -> Self {
        Self { hub }
    }
}

fn header(message: &Message, name: &str) -> Option<String> {
    message
        .payload
        .as_ref()?
        .headers
        .as_ref()?
        .iter()
        .find(|h| h.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
        .and_then(|h| h.value.clone())
}

fn plain_text(part: &MessagePart) -> Option<String> {
    let data = |p: &MessagePart| {
        p.body
            .as_ref()
            .and_then(|b| b.data.as_ref())
            .map(|d| String::from_utf8_lossy(d).into_owned())
    };
    if let Some(parts) = &part.parts {
        if let Some(text) = parts
            .iter()
            .find(|p| p.mime_type.as_deref() == Some("text/plain"))
            .and_then(data)
        {
            return Some(text);
        }
        if let Some(text) = parts.iter().find_map(plain_text) {
            return Some(text);
        }
    }
    data(part)
}

/// Flattens a Gmail message into the fields a zap sees.
pub fn to_inbox_message(message: &Message) -> InboxMessage {
    let timestamp = header(message, "Date")
        .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    InboxMessage {
        id: message.id.clone().unwrap_or_default(),
        from: header(message, "From").unwrap_or_else(|| "Unknown".to_string()),
        subject: header(message, "Subject").unwrap_or_else(|| "No Subject".to_string()),
        body: message
            .payload
            .as_ref()
            .and_then(plain_text)
            .unwrap_or_default(),
        timestamp,
    }
}

#[async_trait]
impl Inbox for GmailInbox {
    async fn list_unread(&self, query: &str, max_results: u32) -> Result<Vec<String>, TriggerError> {
        let (_, list) = self
            .hub
            .users()
            .messages_list("me")
            .q(query)
            .max_results(max_results)
            .doit()
            .await
            .map_err(|e| TriggerError::Inbox(e.to_string()))?;
        Ok(list
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect())
    }

    async fn fetch(&self, id: &str) -> Result<InboxMessage, TriggerError> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .doit()
            .await
            .map_err(|e| TriggerError::Inbox(e.to_string()))?;
        Ok(to_inbox_message(&message))
    }

    async fn mark_read(&self, id: &str) -> Result<(), TriggerError> {
        self.hub
            .users()
            .messages_modify(
                ModifyMessageRequest {
                    add_label_ids: None,
                    remove_label_ids: Some(vec!["UNREAD".to_string()]),
                },
                "me",
                id,
            )
            .doit()
            .await
            .map_err(|e| TriggerError::Inbox(e.to_string()))?;
        Ok(())
    }
}

/// Opens [`GmailInbox`]es through the shared [`ContextHub`].
pub struct GmailInboxProvider {
    hubs: Arc<ContextHub>,
}

impl GmailInboxProvider {
    pub fn new(hubs: Arc<ContextHub>) -> Self {
        Self { hubs }
    }
}

#[async_trait]
impl InboxProvider for GmailInboxProvider {
    async fn inbox(&self, account: &GoogleAccount) -> Result<Arc<dyn Inbox>, TriggerError> {
        let hubs = self.hubs.hubs_for(account).await?;
        Ok(Arc::new(GmailInbox::new(hubs.gmail.clone())))
    }
}

/// Remembers message ids, forgetting the oldest beyond its capacity.
struct ProcessedSet {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl ProcessedSet {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
            capacity,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    fn insert(&mut self, id: String) {
        if !self.seen.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }
}

/// Checks every linked inbox against every active gmail-workflow zap.
pub struct GmailProbe {
    store: Arc<dyn ZapStore>,
    inboxes: Arc<dyn InboxProvider>,
    processed: Mutex<ProcessedSet>,
}

impl GmailProbe {
    pub fn new(store: Arc<dyn ZapStore>, inboxes: Arc<dyn InboxProvider>) -> Self {
        Self {
            store,
            inboxes,
            processed: Mutex::new(ProcessedSet::new(PROCESSED_CAPACITY)),
        }
    }

    fn is_processed(&self, id: &str) -> bool {
        self.processed
            .lock()
            .map(|set| set.contains(id))
            .unwrap_or(false)
    }

    fn remember(&self, id: &str) {
        if let Ok(mut set) = self.processed.lock() {
            set.insert(id.to_string());
        }
    }

    async fn check_account(
        &self,
        account: &GoogleAccount,
        zaps: &[(Zap, GmailCriteria)],
    ) -> Result<Vec<TriggerEvent>, TriggerError> {
        let inbox = self.inboxes.inbox(account).await?;
        let mut events = Vec::new();

        for (zap, criteria) in zaps {
            let owned_elsewhere = zap
                .user_id
                .as_deref()
                .is_some_and(|owner| !owner.eq_ignore_ascii_case(&account.wallet));
            if owned_elsewhere {
                continue;
            }

            let query = criteria.query();
            debug!(zap_id = %zap.id, wallet = %account.wallet, query = %query, "Searching inbox");
            let ids = match inbox.list_unread(&query, MAX_RESULTS).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(zap_id = %zap.id, wallet = %account.wallet, error = %e, "Inbox search failed");
                    continue;
                }
            };
            for id in ids {
                if self.is_processed(&id) {
                    continue;
                }
                let message = match inbox.fetch(&id).await {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(zap_id = %zap.id, message_id = %id, error = %e, "Failed to fetch email");
                        continue;
                    }
                };
                self.remember(&id);
                if let Err(e) = inbox.mark_read(&id).await {
                    warn!(message_id = %id, error = %e, "Failed to mark email as read");
                }

                info!(zap_id = %zap.id, message_id = %id, subject = %message.subject, "Matching email found");
                events.push(TriggerEvent {
                    zap_id: zap.id.clone(),
                    source: TriggerSource::Gmail,
                    payload: json!({ "email": message }),
                });
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl Probe for GmailProbe {
    fn name(&self) -> &str {
        "gmail"
    }

    async fn check(&self) -> Result<Vec<TriggerEvent>, TriggerError> {
        let accounts = self.store.google_accounts().await?;
        if accounts.is_empty() {
            debug!("No linked Google accounts, skipping Gmail check");
            return Ok(Vec::new());
        }

        let zaps: Vec<(Zap, GmailCriteria)> = self
            .store
            .active_zaps()
            .await?
            .into_iter()
            .filter_map(|zap| match &zap.trigger {
                TriggerSpec::GoogleWorkflow(w) => w.gmail_criteria().map(|c| (zap.clone(), c)),
                _ => None,
            })
            .collect();
        if zaps.is_empty() {
            debug!("No active Gmail zaps");
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        for account in &accounts {
            match self.check_account(account, &zaps).await {
                Ok(found) => events.extend(found),
                Err(e) => {
                    warn!(wallet = %account.wallet, error = %e, "Gmail check failed for account");
                }
            }
        }
        Ok(events)
    }
}
