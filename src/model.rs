// The `model` module defines the zap data model shared by the store, the engine and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use uuid::Uuid;

/// Id prefixes of zaps that live client-side rather than in the store.
pub const MOCK_ID_PREFIXES: [&str; 2] = ["zap-", "mock-zap-"];

/// Builds an id of the form `<prefix>-<millis>-<rand9>`.
pub fn new_id(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{prefix}-{}-{}",
        Utc::now().timestamp_millis(),
        &random[..9]
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ZapStatus {
    #[default]
    Active,
    Pending,
    Paused,
    Deleted,
}

impl ZapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZapStatus::Active => "active",
            ZapStatus::Pending => "pending",
            ZapStatus::Paused => "paused",
            ZapStatus::Deleted => "deleted",
        }
    }
}

impl From<String> for ZapStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "active" => ZapStatus::Active,
            "pending" => ZapStatus::Pending,
            "deleted" => ZapStatus::Deleted,
            _ => ZapStatus::Paused,
        }
    }
}

impl From<ZapStatus> for String {
    fn from(value: ZapStatus) -> Self {
        value.as_str().to_string()
    }
}

/// Where a zap definition lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZapOrigin {
    Persisted,
    Mock,
}

impl ZapOrigin {
    pub fn of(zap_id: &str) -> Self {
        if MOCK_ID_PREFIXES.iter().any(|p| zap_id.starts_with(p)) {
            ZapOrigin::Mock
        } else {
            ZapOrigin::Persisted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceCondition {
    Above,
    Below,
}

impl PriceCondition {
    /// True when `price` is strictly on the firing side of `target`.
    pub fn is_met(&self, price: f64, target: f64) -> bool {
        match self {
            PriceCondition::Above => price > target,
            PriceCondition::Below => price < target,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceCondition::Above => "above",
            PriceCondition::Below => "below",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookTrigger {
    pub webhook_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceTrigger {
    pub symbol: Option<String>,
    pub target_price: Option<f64>,
    pub condition: PriceCondition,
}

/// Which part of an email a gmail trigger matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Subject,
    From,
    Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GmailCriteria {
    pub field: MatchField,
    pub value: String,
    pub label: String,
}

impl GmailCriteria {
    /// The Gmail search query for unread messages matching these criteria.
    pub fn query(&self) -> String {
        let mut query = format!("label:{} is:unread", self.label);
        match self.field {
            MatchField::Subject => query.push_str(&format!(" subject:{}", self.value)),
            MatchField::From => query.push_str(&format!(" from:{}", self.value)),
            MatchField::Body => query.push_str(&format!(" {}", self.value)),
        }
        query
    }
}

/// A multi-step workflow whose first step is its trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleWorkflow {
    pub workflow: Value,
}

impl GoogleWorkflow {
    /// The gmail criteria of the first step, if that step is a gmail trigger.
    pub fn gmail_criteria(&self) -> Option<GmailCriteria> {
        let first = self.workflow.get("steps")?.as_array()?.first()?;
        if first.get("type")?.as_str()? != "trigger" {
            return None;
        }
        let config = first.get("config")?;
        if !config
            .get("type")?
            .as_str()?
            .eq_ignore_ascii_case("gmail")
        {
            return None;
        }
        let field = match config
            .get("criteria")
            .and_then(Value::as_str)
            .unwrap_or("subject")
            .to_ascii_lowercase()
            .as_str()
        {
            "from" => MatchField::From,
            "body" => MatchField::Body,
            _ => MatchField::Subject,
        };
        let value = config
            .get("value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let label = config
            .get("label")
            .and_then(Value::as_str)
            .filter(|l| !l.is_empty())
            .unwrap_or("INBOX")
            .to_string();
        Some(GmailCriteria {
            field,
            value,
            label,
        })
    }
}

/// The trigger half of a zap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum TriggerSpec {
    Webhook(WebhookTrigger),
    Price(PriceTrigger),
    GoogleWorkflow(GoogleWorkflow),
    Other { kind: String, raw: Value },
}

impl TriggerSpec {
    /// The lowercase trigger type name.
    pub fn kind(&self) -> &str {
        match self {
            TriggerSpec::Webhook(_) => "webhook",
            TriggerSpec::Price(_) => "price",
            TriggerSpec::GoogleWorkflow(_) => "google_workflow",
            TriggerSpec::Other { kind, .. } => kind,
        }
    }

    pub fn is_workflow(&self) -> bool {
        matches!(self, TriggerSpec::GoogleWorkflow(_))
    }
}

fn string_of(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_of(value: Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl TryFrom<Value> for TriggerSpec {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| "trigger is missing a `type`".to_string())?
            .to_ascii_lowercase();
        let field = |name: &str| {
            value
                .get("metadata")
                .and_then(|m| m.get(name))
                .or_else(|| value.get(name))
                .cloned()
        };

        match kind.as_str() {
            "webhook" => Ok(TriggerSpec::Webhook(WebhookTrigger {
                webhook_id: field("webhookId").and_then(string_of),
            })),
            "price" | "price_above" | "price_below" => {
                let condition = match kind.as_str() {
                    "price_above" => PriceCondition::Above,
                    "price_below" => PriceCondition::Below,
                    _ => match field("condition")
                        .and_then(string_of)
                        .map(|c| c.to_ascii_lowercase())
                        .as_deref()
                    {
                        Some("below") => PriceCondition::Below,
                        _ => PriceCondition::Above,
                    },
                };
                Ok(TriggerSpec::Price(PriceTrigger {
                    symbol: field("symbol")
                        .or_else(|| field("token"))
                        .and_then(string_of)
                        .map(|s| s.to_ascii_uppercase()),
                    target_price: field("targetPrice")
                        .or_else(|| field("price"))
                        .and_then(number_of),
                    condition,
                }))
            }
            "google_workflow" => {
                let workflow = value
                    .get("workflow")
                    .or_else(|| value.get("config").and_then(|c| c.get("workflow")))
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(TriggerSpec::GoogleWorkflow(GoogleWorkflow { workflow }))
            }
            _ => Ok(TriggerSpec::Other { kind, raw: value }),
        }
    }
}

impl From<TriggerSpec> for Value {
    fn from(trigger: TriggerSpec) -> Self {
        match trigger {
            TriggerSpec::Webhook(w) => json!({
                "type": "webhook",
                "metadata": { "webhookId": w.webhook_id },
            }),
            TriggerSpec::Price(p) => json!({
                "type": "price",
                "metadata": {
                    "symbol": p.symbol,
                    "targetPrice": p.target_price,
                    "condition": p.condition.as_str(),
                },
            }),
            TriggerSpec::GoogleWorkflow(g) => json!({
                "type": "google_workflow",
                "workflow": g.workflow,
            }),
            TriggerSpec::Other { raw, .. } => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Email,
    Webhook,
    Slack,
    Sheets,
    Calendar,
    Unknown(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Email => "email",
            ActionKind::Webhook => "webhook",
            ActionKind::Slack => "slack",
            ActionKind::Sheets => "sheets",
            ActionKind::Calendar => "calendar",
            ActionKind::Unknown(name) => name,
        }
    }
}

impl From<&str> for ActionKind {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "email" => ActionKind::Email,
            "webhook" => ActionKind::Webhook,
            "slack" => ActionKind::Slack,
            "sheets" => ActionKind::Sheets,
            "calendar" => ActionKind::Calendar,
            _ => ActionKind::Unknown(value.to_string()),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActionKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ActionKind::from(raw.as_str()))
    }
}

/// The wire shapes an action arrives in: persisted rows keep their settings in
/// `metadata`, client-side zaps in `config` or `metadata.config`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    config: Option<Value>,
    #[serde(default)]
    sorting_order: Option<i64>,
}

impl From<RawAction> for ActionSpec {
    fn from(raw: RawAction) -> Self {
        let nested = raw
            .metadata
            .as_ref()
            .and_then(|m| m.get("config"))
            .filter(|c| c.is_object())
            .cloned();
        let kind = raw
            .kind
            .or_else(|| {
                raw.metadata
                    .as_ref()
                    .and_then(|m| m.get("type"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_default();
        let config = raw
            .config
            .filter(|c| c.is_object())
            .or(nested)
            .or(raw.metadata)
            .unwrap_or_else(|| Value::Object(Map::new()));

        ActionSpec {
            id: raw.id.and_then(string_of).unwrap_or_default(),
            kind: ActionKind::from(kind.as_str()),
            config,
            sorting_order: raw.sorting_order.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAction", rename_all = "camelCase")]
pub struct ActionSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub config: Value,
    pub sorting_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zap {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: ZapStatus,
    pub trigger: TriggerSpec,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Zap {
    pub fn origin(&self) -> ZapOrigin {
        ZapOrigin::of(&self.id)
    }

    /// Gives every action without an id a positional one.
    pub fn normalize(&mut self) {
        for (index, action) in self.actions.iter_mut().enumerate() {
            if action.id.is_empty() {
                action.id = format!("action-{index}");
            }
        }
    }

    /// Actions in execution order. The sort is stable so ties keep insertion order.
    pub fn ordered_actions(&self) -> Vec<&ActionSpec> {
        let mut actions: Vec<&ActionSpec> = self.actions.iter().collect();
        actions.sort_by_key(|a| a.sorting_order);
        actions
    }
}

/// Fields accepted when creating a zap.
#[derive(Debug, Clone)]
pub struct NewZap {
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub status: ZapStatus,
    pub trigger: TriggerSpec,
    pub actions: Vec<ActionSpec>,
}

impl NewZap {
    /// The display name used when the caller gives none, e.g. `webhook to email + sheets Zap`.
    pub fn default_name(&self) -> String {
        let actions = self
            .actions
            .iter()
            .map(|a| a.kind.as_str())
            .collect::<Vec<_>>()
            .join(" + ");
        format!("{} to {} Zap", self.trigger.kind(), actions)
    }
}

/// A partial update. `actions`, when present, replaces the whole list.
#[derive(Debug, Clone, Default)]
pub struct ZapPatch {
    pub name: Option<String>,
    pub status: Option<ZapStatus>,
    pub trigger: Option<TriggerSpec>,
    pub actions: Option<Vec<ActionSpec>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    PartiallyCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRunStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZapRun {
    pub id: String,
    pub zap_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub trigger_data: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub action_results: Vec<ActionResult>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRun {
    pub id: String,
    pub action_id: String,
    pub zap_run_id: String,
    pub status: ActionRunStatus,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Google credentials stored for a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAccount {
    pub wallet: String,
    #[serde(default)]
    pub email: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_lenient() {
        assert_eq!(ZapStatus::from("ACTIVE".to_string()), ZapStatus::Active);
        assert_eq!(ZapStatus::from("deleted".to_string()), ZapStatus::Deleted);
        assert_eq!(ZapStatus::from("archived".to_string()), ZapStatus::Paused);
    }

    #[test]
    fn origin_follows_id_prefix() {
        assert_eq!(ZapOrigin::of("zap-1700000000000-abc"), ZapOrigin::Mock);
        assert_eq!(ZapOrigin::of("mock-zap-7"), ZapOrigin::Mock);
        assert_eq!(ZapOrigin::of("clx0zap-9"), ZapOrigin::Persisted);
    }

    #[test]
    fn price_trigger_reads_metadata_and_string_targets() {
        let trigger: TriggerSpec = serde_json::from_value(json!({
            "type": "Price",
            "metadata": { "symbol": "eth", "targetPrice": "3200.5", "condition": "below" }
        }))
        .unwrap();

        assert_eq!(
            trigger,
            TriggerSpec::Price(PriceTrigger {
                symbol: Some("ETH".to_string()),
                target_price: Some(3200.5),
                condition: PriceCondition::Below,
            })
        );
    }

    #[test]
    fn price_above_alias_implies_condition() {
        let trigger: TriggerSpec =
            serde_json::from_value(json!({ "type": "price_above", "token": "BTC", "price": 70000 }))
                .unwrap();

        match trigger {
            TriggerSpec::Price(p) => {
                assert_eq!(p.symbol.as_deref(), Some("BTC"));
                assert_eq!(p.target_price, Some(70000.0));
                assert_eq!(p.condition, PriceCondition::Above);
            }
            other => panic!("unexpected trigger {other:?}"),
        }
    }

    #[test]
    fn webhook_trigger_round_trips_through_json() {
        let trigger: TriggerSpec =
            serde_json::from_value(json!({ "type": "webhook", "webhookId": "wh_1" })).unwrap();
        let value = serde_json::to_value(&trigger).unwrap();

        assert_eq!(value["metadata"]["webhookId"], "wh_1");
        let again: TriggerSpec = serde_json::from_value(value).unwrap();
        assert_eq!(again, trigger);
    }

    #[test]
    fn unknown_trigger_keeps_raw_json() {
        let raw = json!({ "type": "Cron", "schedule": "* * * * *" });
        let trigger: TriggerSpec = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(trigger.kind(), "cron");
        assert_eq!(serde_json::to_value(&trigger).unwrap(), raw);
    }

    #[test]
    fn trigger_without_type_is_rejected() {
        let result = serde_json::from_value::<TriggerSpec>(json!({ "metadata": {} }));
        assert!(result.is_err());
    }

    #[test]
    fn gmail_criteria_builds_queries() {
        let workflow = GoogleWorkflow {
            workflow: json!({
                "steps": [
                    { "type": "trigger", "config": { "type": "gmail", "criteria": "from", "value": "boss@corp.com" } },
                    { "type": "action", "config": { "type": "sheets" } }
                ]
            }),
        };
        let criteria = workflow.gmail_criteria().unwrap();
        assert_eq!(criteria.query(), "label:INBOX is:unread from:boss@corp.com");

        let body = GmailCriteria {
            field: MatchField::Body,
            value: "invoice".to_string(),
            label: "Finance".to_string(),
        };
        assert_eq!(body.query(), "label:Finance is:unread invoice");
    }

    #[test]
    fn workflow_without_gmail_first_step_has_no_criteria() {
        let workflow = GoogleWorkflow {
            workflow: json!({ "steps": [{ "type": "action", "config": { "type": "gmail" } }] }),
        };
        assert!(workflow.gmail_criteria().is_none());
    }

    #[test]
    fn actions_accept_every_config_shape() {
        let persisted: ActionSpec = serde_json::from_value(json!({
            "id": "a1", "type": "email", "metadata": { "to": "a@b.c" }, "sortingOrder": 2
        }))
        .unwrap();
        let mock: ActionSpec =
            serde_json::from_value(json!({ "type": "Webhook", "config": { "url": "http://x" } }))
                .unwrap();
        let nested: ActionSpec = serde_json::from_value(json!({
            "type": "sheets", "metadata": { "config": { "spreadsheetId": "s1" } }
        }))
        .unwrap();

        assert_eq!(persisted.config["to"], "a@b.c");
        assert_eq!(persisted.sorting_order, 2);
        assert_eq!(mock.kind, ActionKind::Webhook);
        assert_eq!(mock.config["url"], "http://x");
        assert_eq!(nested.config["spreadsheetId"], "s1");
        assert_eq!(
            ActionKind::from("telegram"),
            ActionKind::Unknown("telegram".to_string())
        );
    }

    #[test]
    fn ordered_actions_is_stable() {
        let mut zap: Zap = serde_json::from_value(json!({
            "id": "zap-1",
            "trigger": { "type": "webhook" },
            "actions": [
                { "type": "email", "sortingOrder": 1 },
                { "type": "slack", "sortingOrder": 0 },
                { "type": "webhook", "sortingOrder": 1 }
            ]
        }))
        .unwrap();
        zap.normalize();

        let kinds: Vec<_> = zap
            .ordered_actions()
            .iter()
            .map(|a| a.kind.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![ActionKind::Slack, ActionKind::Email, ActionKind::Webhook]
        );
        assert_eq!(zap.actions[2].id, "action-2");
        assert_eq!(zap.status, ZapStatus::Active);
    }

    #[test]
    fn new_ids_carry_prefix_and_suffix() {
        let id = new_id("zap");
        let parts: Vec<_> = id.split('-').collect();
        assert_eq!(parts[0], "zap");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
    }
}
