// The `executor` module runs a zap's actions in order and records the outcome.

use crate::actions::{ActionContext, ActionError, ActionOutput, ActionRegistry};
use crate::model::{
    ActionKind, ActionResult, ActionRun, ActionRunStatus, ActionSpec, GoogleAccount, RunStatus,
    Zap, ZapOrigin, ZapRun, new_id,
};
use crate::store::{StoreError, ZapStore};
use crate::utils::TEngine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error, info, warn};

pub const SKIPPED_MESSAGE: &str = "Skipped due to previous action failure";

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    ZapNotFound(String),
    #[error("Invalid zap payload: {0}")]
    InvalidZap(String),
}

/// Why a zap is being run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// A trigger fired.
    Triggered,
    /// A user asked for a test run, optionally on behalf of a wallet.
    Test { wallet: Option<String> },
    /// A call to the zap's webhook trigger url.
    Hook { webhook_id: String, headers: Value },
}

impl RunMode {
    fn is_test(&self) -> bool {
        matches!(self, RunMode::Test { .. })
    }

    fn wallet(&self) -> Option<&str> {
        match self {
            RunMode::Test { wallet } => wallet.as_deref(),
            _ => None,
        }
    }

    fn metadata(&self, zap: &Zap, trigger_data: &Value, action_count: usize) -> Value {
        match self {
            RunMode::Hook { webhook_id, headers } => json!({
                "webhook": { "id": webhook_id, "headers": headers, "payload": trigger_data },
            }),
            _ => json!({
                "testRun": self.is_test(),
                "triggerType": zap.trigger.kind(),
                "actionCount": action_count,
            }),
        }
    }

    fn summary(&self, all_succeeded: bool) -> &'static str {
        match (self, all_succeeded) {
            (RunMode::Test { .. }, true) => "Zap test completed successfully",
            (RunMode::Test { .. }, false) => "Zap test completed with some errors",
            (RunMode::Hook { .. }, true) => "Webhook processed successfully",
            (RunMode::Hook { .. }, false) => "Webhook processed with some errors",
            (RunMode::Triggered, true) => "Zap executed successfully",
            (RunMode::Triggered, false) => "Zap executed with some errors",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZapRunReport {
    pub success: bool,
    pub message: String,
    pub zap_id: String,
    pub zap_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub action_results: Vec<ActionResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

fn failure_message(kind: &ActionKind, error: &ActionError) -> String {
    match (kind, error) {
        (_, ActionError::Unsupported(_)) | (_, ActionError::GoogleNotConnected) => error.to_string(),
        (ActionKind::Email, _) => format!("Failed to send email: {error}"),
        (ActionKind::Webhook, _) => format!("Failed to call webhook: {error}"),
        (ActionKind::Sheets, _) => format!("Failed to add row to Google Sheet: {error}"),
        (ActionKind::Calendar, _) => format!("Failed to create calendar event: {error}"),
        _ => error.to_string(),
    }
}

/// Runs zaps against the registered action handlers.
pub struct ZapExecutor {
    store: Arc<dyn ZapStore>,
    actions: ActionRegistry,
    templates: TEngine,
}

impl ZapExecutor {
    pub fn new(store: Arc<dyn ZapStore>, actions: ActionRegistry) -> Self {
        Self {
            store,
            actions,
            templates: TEngine::new(),
        }
    }

    /// The account whose credentials Google actions use.
    ///
    /// Persisted zaps act as their owner. Test runs may name a wallet. Anything
    /// else falls back to the first linked account.
    async fn resolve_account(
        &self,
        zap: &Zap,
        mode: &RunMode,
    ) -> Result<Option<GoogleAccount>, StoreError> {
        let wallet = match zap.origin() {
            ZapOrigin::Persisted => zap.user_id.as_deref().or(mode.wallet()),
            ZapOrigin::Mock => mode.wallet().or(zap.user_id.as_deref()),
        };
        match wallet {
            Some(wallet) => self.store.google_account(wallet).await,
            None => Ok(self.store.google_accounts().await?.into_iter().next()),
        }
    }

    async fn run_action(
        &self,
        action: &ActionSpec,
        ctx: &ActionContext,
        template_data: &Value,
    ) -> Result<ActionOutput, ActionError> {
        let config = self.templates.render_value(&action.config, template_data)?;
        let handler = self
            .actions
            .get(&action.kind)
            .ok_or_else(|| ActionError::Unsupported(action.kind.to_string()))?;
        handler.execute(ctx, &config).await
    }

    /// Action-run rows are bookkeeping; losing one must not strand the zap run.
    async fn record_action_run(&self, zap: &Zap, action_run: &ActionRun) {
        if let Err(e) = self.store.record_action_run(action_run).await {
            warn!(
                zap_id = %zap.id,
                action_id = %action_run.action_id,
                status = ?action_run.status,
                error = %e,
                "Failed to record action run"
            );
        }
    }

    /// Runs every action of `zap` with `trigger_data` and records the run.
    ///
    /// Action failures never abort the call; they end up in the report. In
    /// google-workflow zaps the actions after a failure are skipped.
    pub async fn execute(
        &self,
        zap: &Zap,
        trigger_data: Value,
        mode: RunMode,
    ) -> Result<ZapRunReport, ExecutorError> {
        let started_at = Utc::now();
        let persisted = zap.origin() == ZapOrigin::Persisted;
        let actions = zap.ordered_actions();
        info!(zap_id = %zap.id, action_count = actions.len(), test_run = mode.is_test(), "Executing zap");

        // Resolved before the run is recorded, so a lookup failure leaves no run behind.
        let google = self.resolve_account(zap, &mode).await?;
        let mut run = ZapRun {
            id: new_id("run"),
            zap_id: zap.id.clone(),
            status: RunStatus::Running,
            trigger_data: trigger_data.clone(),
            metadata: mode.metadata(zap, &trigger_data, actions.len()),
            action_results: Vec::new(),
            created_at: started_at,
            finished_at: None,
        };
        if persisted {
            self.store.record_run(&run).await?;
        }

        let ctx = ActionContext {
            zap_id: zap.id.clone(),
            zap_name: zap.name.clone(),
            trigger_data: trigger_data.clone(),
            google,
        };
        let template_data = json!({
            "trigger": trigger_data,
            "zap": { "id": zap.id, "name": zap.name },
        });

        let mut failed = false;
        for action in actions {
            if failed && zap.trigger.is_workflow() {
                debug!(zap_id = %zap.id, action_id = %action.id, "Skipping action after failure");
                run.action_results.push(ActionResult {
                    action_id: action.id.clone(),
                    kind: action.kind.to_string(),
                    success: false,
                    message: SKIPPED_MESSAGE.to_string(),
                    details: json!({ "skipped": true }),
                });
                if persisted {
                    let now = Utc::now();
                    let skipped = ActionRun {
                        id: new_id("arun"),
                        action_id: action.id.clone(),
                        zap_run_id: run.id.clone(),
                        status: ActionRunStatus::Skipped,
                        metadata: json!({ "message": SKIPPED_MESSAGE }),
                        created_at: now,
                        updated_at: now,
                    };
                    self.record_action_run(zap, &skipped).await;
                }
                continue;
            }

            let mut action_run = ActionRun {
                id: new_id("arun"),
                action_id: action.id.clone(),
                zap_run_id: run.id.clone(),
                status: ActionRunStatus::Running,
                metadata: json!({ "startedAt": Utc::now() }),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            if persisted {
                self.record_action_run(zap, &action_run).await;
            }

            let result = match self.run_action(action, &ctx, &template_data).await {
                Ok(output) => {
                    info!(zap_id = %zap.id, action_id = %action.id, kind = %action.kind, "Action succeeded");
                    ActionResult {
                        action_id: action.id.clone(),
                        kind: action.kind.to_string(),
                        success: true,
                        message: output.message,
                        details: output.details,
                    }
                }
                Err(e) => {
                    warn!(zap_id = %zap.id, action_id = %action.id, kind = %action.kind, error = %e, "Action failed");
                    failed = true;
                    ActionResult {
                        action_id: action.id.clone(),
                        kind: action.kind.to_string(),
                        success: false,
                        message: failure_message(&action.kind, &e),
                        details: json!({ "error": e.to_string() }),
                    }
                }
            };

            if persisted {
                action_run.status = if result.success {
                    ActionRunStatus::Success
                } else {
                    ActionRunStatus::Failed
                };
                action_run.metadata = json!({
                    "startedAt": action_run.created_at,
                    "message": result.message,
                    "details": result.details,
                    "finishedAt": Utc::now(),
                });
                action_run.updated_at = Utc::now();
                self.record_action_run(zap, &action_run).await;
            }
            run.action_results.push(result);
        }

        let all_succeeded = run.action_results.iter().all(|r| r.success);
        run.status = if all_succeeded {
            RunStatus::Completed
        } else {
            RunStatus::PartiallyCompleted
        };
        let finished_at = Utc::now();
        run.finished_at = Some(finished_at);
        if persisted {
            if let Err(e) = self.store.record_run(&run).await {
                error!(zap_id = %zap.id, run_id = %run.id, error = %e, "Failed to record run outcome");
                return Err(e.into());
            }
        }

        let message = mode.summary(all_succeeded);
        info!(zap_id = %zap.id, status = ?run.status, "Zap run finished");

        Ok(ZapRunReport {
            success: true,
            message: message.to_string(),
            zap_id: zap.id.clone(),
            zap_name: zap.name.clone(),
            run_id: persisted.then(|| run.id.clone()),
            status: run.status,
            action_results: run.action_results,
            started_at,
            finished_at,
        })
    }
}

/// Finds the zap behind a test-run request.
///
/// Mock zaps live client-side. They arrive in the request body and are cached
/// so later runs can omit them; registered ones are also in the store. Other
/// ids are looked up in the store only.
pub struct ZapResolver {
    store: Arc<dyn ZapStore>,
    mock_zaps: TokioMutex<HashMap<String, Zap>>,
}

impl ZapResolver {
    pub fn new(store: Arc<dyn ZapStore>) -> Self {
        Self {
            store,
            mock_zaps: TokioMutex::new(HashMap::new()),
        }
    }

    /// Caches a client-side zap under `id`.
    pub async fn remember(&self, id: &str, mut zap: Zap) {
        zap.normalize();
        self.mock_zaps.lock().await.insert(id.to_string(), zap);
    }

    pub async fn resolve(&self, id: &str, body_zap: Option<Value>) -> Result<Zap, ExecutorError> {
        if ZapOrigin::of(id) == ZapOrigin::Persisted {
            return self
                .store
                .get_zap(id)
                .await?
                .ok_or_else(|| ExecutorError::ZapNotFound(format!("Zap with ID {id} not found in database")));
        }

        if let Some(mut raw) = body_zap.filter(|v| !v.is_null()) {
            if let Some(object) = raw.as_object_mut() {
                object.insert("id".to_string(), Value::String(id.to_string()));
            }
            let zap: Zap =
                serde_json::from_value(raw).map_err(|e| ExecutorError::InvalidZap(e.to_string()))?;
            self.remember(id, zap).await;
        }

        if let Some(zap) = self.mock_zaps.lock().await.get(id).cloned() {
            return Ok(zap);
        }
        // Zaps registered for monitoring keep their client-side id.
        self.store.get_zap(id).await?.ok_or_else(|| {
            ExecutorError::ZapNotFound(format!(
                "Mock zap with ID {id} not found. Please send zap data in the request body or ensure the zap is stored server-side."
            ))
        })
    }
}
