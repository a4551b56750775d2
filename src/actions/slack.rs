use crate::actions::{Action, ActionContext, ActionError, ActionOutput, str_field};
use crate::model::ActionKind;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

/// Records the Slack message a zap would post. No message leaves the process.
pub struct SlackAction;

#[async_trait]
impl Action for SlackAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Slack
    }

    async fn execute(&self, ctx: &ActionContext, config: &Value) -> Result<ActionOutput, ActionError> {
        let channel = str_field(config, "channel")
            .unwrap_or("general")
            .trim_start_matches('#');
        let message = str_field(config, "message").unwrap_or_default();
        info!(zap_id = %ctx.zap_id, channel, "Slack message recorded");

        Ok(ActionOutput {
            message: format!("Slack message would be sent to #{channel}"),
            details: json!({ "channel": channel, "message": message }),
        })
    }
}
