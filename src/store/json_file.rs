// A `ZapStore` backed by a single JSON document, cached in memory.

use crate::model::{
    ActionRun, GoogleAccount, NewZap, TriggerSpec, Zap, ZapPatch, ZapRun, ZapStatus, new_id,
};
use crate::store::{StoreError, ZapStore};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreDocument {
    #[serde(default)]
    zaps: Vec<Zap>,
    #[serde(default)]
    zap_runs: Vec<ZapRun>,
    #[serde(default)]
    action_runs: Vec<ActionRun>,
    #[serde(default)]
    google_accounts: Vec<GoogleAccount>,
}

/// A store that keeps the whole document in memory and rewrites it on every change.
///
/// Writes land in a sibling temp file that is renamed over the target, so a
/// crash never leaves a half-written document behind. A change becomes visible
/// only once it is on disk. Without a path the store never touches the disk.
pub struct JsonFileStore {
    path: Option<PathBuf>,
    doc: RwLock<StoreDocument>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store; a corrupt one is an error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => StoreDocument::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreDocument::default(),
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            zaps = doc.zaps.len(),
            "Opened zap store"
        );
        Ok(Self {
            path: Some(path),
            doc: RwLock::new(doc),
        })
    }

    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: RwLock::new(StoreDocument::default()),
        }
    }

    async fn persist(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(doc)?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "Store persisted");
        Ok(())
    }

    /// Applies `change` to a copy of the document, persists the copy and only
    /// then swaps it in. On any error the live document is left untouched.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut StoreDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut doc = self.doc.write().await;
        let mut next = doc.clone();
        let out = change(&mut next)?;
        self.persist(&next).await?;
        *doc = next;
        Ok(out)
    }
}

fn same_wallet(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[async_trait]
impl ZapStore for JsonFileStore {
    async fn create_zap(&self, new: NewZap) -> Result<Zap, StoreError> {
        let now = Utc::now();
        let name = new.name.clone().unwrap_or_else(|| new.default_name());
        let mut zap = Zap {
            // Stored ids must not carry a mock prefix.
            id: new_id("zp"),
            name,
            user_id: new.user_id,
            status: new.status,
            trigger: new.trigger,
            actions: new.actions,
            created_at: now,
            updated_at: now,
        };
        zap.normalize();

        self.commit(|doc| {
            doc.zaps.push(zap.clone());
            Ok(())
        })
        .await?;
        info!(zap_id = %zap.id, "Zap created");
        Ok(zap)
    }

    async fn register_zap(&self, mut zap: Zap) -> Result<Zap, StoreError> {
        zap.normalize();
        zap.updated_at = Utc::now();

        let zap = self
            .commit(|doc| {
                match doc.zaps.iter_mut().find(|z| z.id == zap.id) {
                    Some(existing) => {
                        zap.created_at = existing.created_at;
                        *existing = zap.clone();
                    }
                    None => doc.zaps.push(zap.clone()),
                }
                Ok(zap)
            })
            .await?;
        info!(zap_id = %zap.id, "Zap registered");
        Ok(zap)
    }

    async fn get_zap(&self, id: &str) -> Result<Option<Zap>, StoreError> {
        let doc = self.doc.read().await;
        Ok(doc.zaps.iter().find(|z| z.id == id).cloned())
    }

    async fn list_zaps(&self, user_id: Option<&str>) -> Result<Vec<Zap>, StoreError> {
        let doc = self.doc.read().await;
        Ok(doc
            .zaps
            .iter()
            .filter(|z| z.status != ZapStatus::Deleted)
            .filter(|z| match (user_id, z.user_id.as_deref()) {
                (None, _) => true,
                (Some(wanted), Some(owner)) => same_wallet(wanted, owner),
                (Some(_), None) => false,
            })
            .cloned()
            .collect())
    }

    async fn update_zap(&self, id: &str, patch: ZapPatch) -> Result<Zap, StoreError> {
        self.commit(|doc| {
            let zap = doc
                .zaps
                .iter_mut()
                .find(|z| z.id == id)
                .ok_or_else(|| StoreError::ZapNotFound(id.to_string()))?;

            if let Some(name) = patch.name {
                zap.name = name;
            }
            if let Some(status) = patch.status {
                zap.status = status;
            }
            if let Some(trigger) = patch.trigger {
                zap.trigger = trigger;
            }
            if let Some(actions) = patch.actions {
                zap.actions = actions;
            }
            zap.normalize();
            zap.updated_at = Utc::now();
            Ok(zap.clone())
        })
        .await
    }

    async fn delete_zap(&self, id: &str) -> Result<(), StoreError> {
        self.commit(|doc| {
            let zap = doc
                .zaps
                .iter_mut()
                .find(|z| z.id == id)
                .ok_or_else(|| StoreError::ZapNotFound(id.to_string()))?;
            zap.status = ZapStatus::Deleted;
            zap.updated_at = Utc::now();
            Ok(())
        })
        .await?;
        info!(zap_id = %id, "Zap deleted");
        Ok(())
    }

    async fn active_zaps(&self) -> Result<Vec<Zap>, StoreError> {
        let doc = self.doc.read().await;
        Ok(doc
            .zaps
            .iter()
            .filter(|z| z.status == ZapStatus::Active)
            .cloned()
            .collect())
    }

    async fn find_by_webhook(&self, webhook_id: &str) -> Result<Option<Zap>, StoreError> {
        let doc = self.doc.read().await;
        Ok(doc
            .zaps
            .iter()
            .filter(|z| z.status != ZapStatus::Deleted)
            .find(|z| match &z.trigger {
                TriggerSpec::Webhook(w) => w.webhook_id.as_deref() == Some(webhook_id),
                _ => false,
            })
            .cloned())
    }

    async fn record_run(&self, run: &ZapRun) -> Result<(), StoreError> {
        self.commit(|doc| {
            match doc.zap_runs.iter_mut().find(|r| r.id == run.id) {
                Some(existing) => *existing = run.clone(),
                None => doc.zap_runs.push(run.clone()),
            }
            Ok(())
        })
        .await
    }

    async fn record_action_run(&self, run: &ActionRun) -> Result<(), StoreError> {
        self.commit(|doc| {
            match doc.action_runs.iter_mut().find(|r| r.id == run.id) {
                Some(existing) => *existing = run.clone(),
                None => doc.action_runs.push(run.clone()),
            }
            Ok(())
        })
        .await
    }

    async fn list_runs(
        &self,
        zap_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ZapRun>, StoreError> {
        let doc = self.doc.read().await;
        let mut runs: Vec<ZapRun> = doc
            .zap_runs
            .iter()
            .filter(|r| r.zap_id == zap_id)
            .cloned()
            .collect();
        // Newest first; runs recorded later win ties on the timestamp.
        runs.reverse();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs.into_iter().skip(offset).take(limit).collect())
    }

    async fn action_runs(&self, zap_run_id: &str) -> Result<Vec<ActionRun>, StoreError> {
        let doc = self.doc.read().await;
        Ok(doc
            .action_runs
            .iter()
            .filter(|r| r.zap_run_id == zap_run_id)
            .cloned()
            .collect())
    }

    async fn upsert_google_account(&self, account: GoogleAccount) -> Result<(), StoreError> {
        self.commit(|doc| {
            match doc
                .google_accounts
                .iter_mut()
                .find(|a| same_wallet(&a.wallet, &account.wallet))
            {
                Some(existing) => {
                    let refresh_token = account
                        .refresh_token
                        .clone()
                        .or_else(|| existing.refresh_token.take());
                    *existing = GoogleAccount {
                        refresh_token,
                        ..account
                    };
                }
                None => doc.google_accounts.push(account),
            }
            Ok(())
        })
        .await
    }

    async fn google_account(&self, wallet: &str) -> Result<Option<GoogleAccount>, StoreError> {
        let doc = self.doc.read().await;
        Ok(doc
            .google_accounts
            .iter()
            .find(|a| same_wallet(&a.wallet, wallet))
            .cloned())
    }

    async fn google_accounts(&self) -> Result<Vec<GoogleAccount>, StoreError> {
        let doc = self.doc.read().await;
        Ok(doc
            .google_accounts
            .iter()
            .filter(|a| !a.access_token.is_empty())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionSpec, RunStatus, WebhookTrigger, ZapOrigin};
    use chrono::Duration;
    use serde_json::json;
    use tempfile::tempdir;

    fn webhook_zap(webhook_id: &str) -> NewZap {
        NewZap {
            name: None,
            user_id: Some("0xAbC".to_string()),
            status: ZapStatus::Active,
            trigger: TriggerSpec::Webhook(WebhookTrigger {
                webhook_id: Some(webhook_id.to_string()),
            }),
            actions: vec![
                serde_json::from_value::<ActionSpec>(json!({ "type": "email" })).unwrap(),
            ],
        }
    }

    fn run(zap_id: &str, id: &str, age_secs: i64) -> ZapRun {
        ZapRun {
            id: id.to_string(),
            zap_id: zap_id.to_string(),
            status: RunStatus::Completed,
            trigger_data: json!({}),
            metadata: json!({}),
            action_results: vec![],
            created_at: Utc::now() - Duration::seconds(age_secs),
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_default_name() {
        let store = JsonFileStore::in_memory();

        let zap = store.create_zap(webhook_zap("wh_1")).await.unwrap();

        assert!(zap.id.starts_with("zp-"));
        assert_eq!(zap.origin(), ZapOrigin::Persisted);
        assert_eq!(zap.name, "webhook to email Zap");
        assert_eq!(zap.actions[0].id, "action-0");
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        // --- 1. Arrange ---
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("zapforge.json");
        let store = JsonFileStore::open(&path).await.unwrap();

        // --- 2. Act ---
        let zap = store.create_zap(webhook_zap("wh_2")).await.unwrap();
        store
            .upsert_google_account(GoogleAccount {
                wallet: "0xabc".to_string(),
                email: Some("me@example.com".to_string()),
                access_token: "ya29.token".to_string(),
                refresh_token: None,
                expiry: None,
            })
            .await
            .unwrap();
        drop(store);
        let reopened = JsonFileStore::open(&path).await.unwrap();

        // --- 3. Assert ---
        let loaded = reopened.get_zap(&zap.id).await.unwrap().unwrap();
        assert_eq!(loaded.trigger, zap.trigger);
        let account = reopened.google_account("0xABC").await.unwrap();
        assert_eq!(account.unwrap().email.as_deref(), Some("me@example.com"));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let result = JsonFileStore::open(&path).await;

        assert!(matches!(result, Err(StoreError::Json(_))));
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_unchanged() {
        // --- 1. Arrange ---
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = JsonFileStore::open(data_dir.join("zapforge.json")).await.unwrap();
        let zap = store.create_zap(webhook_zap("wh_fail")).await.unwrap();
        // A plain file where the data directory should be makes every write fail.
        tokio::fs::remove_dir_all(&data_dir).await.unwrap();
        tokio::fs::write(&data_dir, b"not a directory").await.unwrap();

        // --- 2. Act ---
        let created = store.create_zap(webhook_zap("wh_lost")).await;
        let renamed = store
            .update_zap(
                &zap.id,
                ZapPatch {
                    name: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .await;
        let deleted = store.delete_zap(&zap.id).await;

        // --- 3. Assert ---
        assert!(matches!(created, Err(StoreError::Io(_))));
        assert!(matches!(renamed, Err(StoreError::Io(_))));
        assert!(matches!(deleted, Err(StoreError::Io(_))));
        let zaps = store.list_zaps(None).await.unwrap();
        assert_eq!(zaps.len(), 1);
        assert_eq!(zaps[0].name, zap.name);
        assert_eq!(zaps[0].status, ZapStatus::Active);
        assert!(store.find_by_webhook("wh_lost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_soft_and_hides_from_lists() {
        let store = JsonFileStore::in_memory();
        let zap = store.create_zap(webhook_zap("wh_3")).await.unwrap();

        store.delete_zap(&zap.id).await.unwrap();

        assert!(store.list_zaps(None).await.unwrap().is_empty());
        assert!(store.active_zaps().await.unwrap().is_empty());
        assert!(store.find_by_webhook("wh_3").await.unwrap().is_none());
        let kept = store.get_zap(&zap.id).await.unwrap().unwrap();
        assert_eq!(kept.status, ZapStatus::Deleted);
    }

    #[tokio::test]
    async fn list_filters_by_user_case_insensitively() {
        let store = JsonFileStore::in_memory();
        store.create_zap(webhook_zap("wh_4")).await.unwrap();
        let mut other = webhook_zap("wh_5");
        other.user_id = Some("0xdef".to_string());
        store.create_zap(other).await.unwrap();

        let mine = store.list_zaps(Some("0xabc")).await.unwrap();

        assert_eq!(mine.len(), 1);
        assert_eq!(store.list_zaps(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_replaces_actions_wholesale() {
        let store = JsonFileStore::in_memory();
        let zap = store.create_zap(webhook_zap("wh_6")).await.unwrap();
        let actions = vec![
            serde_json::from_value::<ActionSpec>(json!({ "type": "slack" })).unwrap(),
            serde_json::from_value::<ActionSpec>(json!({ "type": "webhook" })).unwrap(),
        ];

        let updated = store
            .update_zap(
                &zap.id,
                ZapPatch {
                    actions: Some(actions),
                    status: Some(ZapStatus::Paused),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.actions.len(), 2);
        assert_eq!(updated.actions[1].id, "action-1");
        assert_eq!(updated.status, ZapStatus::Paused);
        assert!(matches!(
            store.update_zap("missing", ZapPatch::default()).await,
            Err(StoreError::ZapNotFound(_))
        ));
    }

    #[tokio::test]
    async fn register_upserts_by_id() {
        let store = JsonFileStore::in_memory();
        let mut zap: Zap = serde_json::from_value(json!({
            "id": "zap-registered",
            "name": "first",
            "trigger": { "type": "webhook", "webhookId": "wh_7" }
        }))
        .unwrap();
        store.register_zap(zap.clone()).await.unwrap();
        zap.name = "second".to_string();

        store.register_zap(zap).await.unwrap();

        let all = store.list_zaps(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "second");
    }

    #[tokio::test]
    async fn runs_are_listed_newest_first_with_paging() {
        let store = JsonFileStore::in_memory();
        store.record_run(&run("z1", "old", 30)).await.unwrap();
        store.record_run(&run("z1", "new", 1)).await.unwrap();
        store.record_run(&run("z1", "mid", 10)).await.unwrap();
        store.record_run(&run("z2", "other", 0)).await.unwrap();

        let mut updated = run("z1", "mid", 10);
        updated.status = RunStatus::PartiallyCompleted;
        store.record_run(&updated).await.unwrap();

        let page = store.list_runs("z1", 2, 0).await.unwrap();
        let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
        assert_eq!(page[1].status, RunStatus::PartiallyCompleted);
        let rest = store.list_runs("z1", 10, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "old");
    }

    #[tokio::test]
    async fn google_account_upsert_keeps_refresh_token() {
        let store = JsonFileStore::in_memory();
        let mut account = GoogleAccount {
            wallet: "0xabc".to_string(),
            email: None,
            access_token: "first".to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry: None,
        };
        store.upsert_google_account(account.clone()).await.unwrap();
        account.access_token = "second".to_string();
        account.refresh_token = None;

        store.upsert_google_account(account).await.unwrap();

        let stored = store.google_account("0xabc").await.unwrap().unwrap();
        assert_eq!(stored.access_token, "second");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(store.google_accounts().await.unwrap().len(), 1);
    }
}
