use crate::actions::{Action, ActionContext, ActionError, ActionOutput, required_str, str_field};
use crate::model::ActionKind;
use crate::utils::context_hub::ContextHub;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use google_sheets4::api::ValueRange;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

/// The row appended for a zap event.
pub fn event_row(config: &Value, now: DateTime<Utc>) -> Vec<Value> {
    let text = |key: &str, default: &str| {
        Value::String(str_field(config, key).unwrap_or(default).to_string())
    };
    vec![
        Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        text("eventTitle", "Zap Event"),
        text("eventDescription", "From automated workflow"),
        text("dateField", ""),
        text("timeField", ""),
    ]
}

/// The A1 range to append to: `range`, or the first cell of `sheetName`.
pub fn target_range(config: &Value) -> String {
    match str_field(config, "range") {
        Some(range) => range.to_string(),
        None => format!("{}!A1", str_field(config, "sheetName").unwrap_or("Sheet1")),
    }
}

/// Appends one row per run to a Google spreadsheet.
pub struct SheetsAction {
    hubs: Arc<ContextHub>,
}

impl SheetsAction {
    pub fn new(hubs: Arc<ContextHub>) -> Self {
        Self { hubs }
    }
}

#[async_trait]
impl Action for SheetsAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Sheets
    }

    async fn execute(&self, ctx: &ActionContext, config: &Value) -> Result<ActionOutput, ActionError> {
        let account = ctx.google_account()?;
        let spreadsheet_id = required_str(config, "spreadsheetId")?;
        let sheet_name = str_field(config, "sheetName").unwrap_or("Sheet1");
        let range = target_range(config);

        let hubs = self.hubs.hubs_for(account).await?;
        let request = ValueRange {
            values: Some(vec![event_row(config, Utc::now())]),
            ..Default::default()
        };
        let (_, response) = hubs
            .sheets
            .spreadsheets()
            .values_append(request, spreadsheet_id, &range)
            .value_input_option("USER_ENTERED")
            .doit()
            .await
            .map_err(|e| ActionError::Google(e.to_string()))?;

        let updates = response.updates.unwrap_or_default();
        info!(zap_id = %ctx.zap_id, spreadsheet_id, range = %range, "Row appended to sheet");
        Ok(ActionOutput {
            message: format!("Row added to Google Sheet {sheet_name}"),
            details: json!({
                "spreadsheetId": spreadsheet_id,
                "sheetName": sheet_name,
                "updatedRange": updates.updated_range,
                "updatedRows": updates.updated_rows,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::google_auth::GConf;
    use chrono::TimeZone;

    #[test]
    fn row_uses_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 11, 15, 14, 30, 0).unwrap();

        let row = event_row(&json!({ "dateField": "2024-11-20" }), now);

        assert_eq!(
            row,
            vec![
                json!("2024-11-15T14:30:00.000Z"),
                json!("Zap Event"),
                json!("From automated workflow"),
                json!("2024-11-20"),
                json!(""),
            ]
        );
    }

    #[test]
    fn range_prefers_explicit_value() {
        assert_eq!(target_range(&json!({ "range": "Log!B2" })), "Log!B2");
        assert_eq!(target_range(&json!({ "sheetName": "Events" })), "Events!A1");
        assert_eq!(target_range(&json!({})), "Sheet1!A1");
    }

    #[tokio::test]
    async fn requires_connected_google_account() {
        let action = SheetsAction::new(Arc::new(ContextHub::new(GConf::default())));
        let ctx = ActionContext {
            zap_id: "zap-1".to_string(),
            zap_name: "n".to_string(),
            trigger_data: json!({}),
            google: None,
        };

        let err = action
            .execute(&ctx, &json!({ "spreadsheetId": "s1" }))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Google account not connected. Please authorize Google access first."
        );
    }
}
