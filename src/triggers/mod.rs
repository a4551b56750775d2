pub mod event;
pub mod gmail;
pub mod poll_trigger;
pub mod price;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::store::StoreError;
use crate::triggers::event::TriggerEvent;
use crate::utils::HttpError;
use crate::utils::google_auth::AuthError;

pub use crate::triggers::gmail::{GmailInbox, GmailInboxProvider, GmailProbe, Inbox, InboxProvider};
pub use crate::triggers::poll_trigger::{PollTrigger, PollTriggerBuilder};
pub use crate::triggers::price::{CoinGeckoFeed, PriceFeed, PriceProbe};

/// The `TriggerError` enum defines the possible errors that can occur within a trigger.
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Error activating the trigger: {0}")]
    ActivationError(String),
    #[error("Error authenticating the trigger: {0}")]
    AuthError(#[from] AuthError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Price feed error: {0}")]
    PriceFeed(String),
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),
    #[error("Inbox error: {0}")]
    Inbox(String),
}

#[async_trait]
pub trait Trigger: Send + Sync {
    /// Launches the trigger's long-running task.
    ///
    /// # Arguments
    /// * `tx` - The sender to send trigger events back to the engine.
    /// * `shutdown_rx` - A broadcast receiver to listen for a shutdown signal.
    async fn launch(
        &self,
        tx: mpsc::Sender<TriggerEvent>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<tokio::task::JoinHandle<()>, TriggerError>;
}

/// One round of checking an external source for zaps that should fire.
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> Result<Vec<TriggerEvent>, TriggerError>;
}
