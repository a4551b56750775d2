// The `store` module persists zaps, their run history and the Google accounts linked to wallets.

pub mod json_file;

pub use json_file::JsonFileStore;

use crate::model::{ActionRun, GoogleAccount, NewZap, Zap, ZapPatch, ZapRun};
use async_trait::async_trait;
use thiserror::Error;

/// The `StoreError` enum defines the possible errors raised by a [`ZapStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Zap {0} not found")]
    ZapNotFound(String),
}

/// Persistence contract used by the engine, the executor and the HTTP API.
#[async_trait]
pub trait ZapStore: Send + Sync {
    /// Creates a zap with a fresh `zp-<millis>-<rand9>` id.
    async fn create_zap(&self, new: NewZap) -> Result<Zap, StoreError>;

    /// Inserts the zap, or replaces the one with the same id.
    async fn register_zap(&self, zap: Zap) -> Result<Zap, StoreError>;

    /// Looks a zap up by id. Deleted zaps are still returned.
    async fn get_zap(&self, id: &str) -> Result<Option<Zap>, StoreError>;

    /// Lists the zaps that are not deleted, optionally for a single user.
    async fn list_zaps(&self, user_id: Option<&str>) -> Result<Vec<Zap>, StoreError>;

    async fn update_zap(&self, id: &str, patch: ZapPatch) -> Result<Zap, StoreError>;

    /// Soft delete: the zap stays stored with status `deleted`.
    async fn delete_zap(&self, id: &str) -> Result<(), StoreError>;

    async fn active_zaps(&self) -> Result<Vec<Zap>, StoreError>;

    async fn find_by_webhook(&self, webhook_id: &str) -> Result<Option<Zap>, StoreError>;

    /// Inserts or replaces a zap run.
    async fn record_run(&self, run: &ZapRun) -> Result<(), StoreError>;

    /// Inserts or replaces an action run.
    async fn record_action_run(&self, run: &ActionRun) -> Result<(), StoreError>;

    /// Runs of a zap, newest first.
    async fn list_runs(
        &self,
        zap_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ZapRun>, StoreError>;

    async fn action_runs(&self, zap_run_id: &str) -> Result<Vec<ActionRun>, StoreError>;

    async fn upsert_google_account(&self, account: GoogleAccount) -> Result<(), StoreError>;

    async fn google_account(&self, wallet: &str) -> Result<Option<GoogleAccount>, StoreError>;

    async fn google_accounts(&self) -> Result<Vec<GoogleAccount>, StoreError>;
}
