use handlebars::{Handlebars, handlebars_helper, no_escape};
use serde_json::{self, Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TEngineError {
    #[error("Template error: {0}")]
    TemplateError(#[from] handlebars::TemplateError),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Render error: {0}")]
    RenderError(#[from] handlebars::RenderError),
}

/// Handlebars renderer for action configuration.
///
/// Escaping is disabled since the output feeds emails, JSON bodies and sheet cells
/// rather than HTML. The `verbatim` helper renders a value as compact JSON.
pub struct TEngine {
    handlebars: Handlebars<'static>,
}

impl Default for TEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TEngine {
    pub fn new() -> Self {
        let mut te = TEngine {
            handlebars: Handlebars::new(),
        };
        handlebars_helper!(obj: |v: Value| {
            serde_json::to_string(&v).unwrap_or_default()
        });
        te.handlebars.register_escape_fn(no_escape);
        te.handlebars.register_helper("verbatim", Box::new(obj));
        te
    }

    pub fn render_template(
        &self,
        template: &str,
        data: &serde_json::Value,
    ) -> Result<String, TEngineError> {
        let result = self.handlebars.render_template(template, data)?;
        Ok(result)
    }

    /// Renders every string inside `value` that contains a `{{` expression.
    /// Keys, numbers and booleans are left untouched.
    pub fn render_value(&self, value: &Value, data: &Value) -> Result<Value, TEngineError> {
        Ok(match value {
            Value::String(s) if s.contains("{{") => Value::String(self.render_template(s, data)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.render_value(item, data))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut rendered = Map::with_capacity(map.len());
                for (key, item) in map {
                    rendered.insert(key.clone(), self.render_value(item, data)?);
                }
                Value::Object(rendered)
            }
            other => other.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn it_works() {
        let engine = TEngine::new();
        let template = "Hello, {{name}}!";
        let data = json!({"name": "World"});
        let rendered = engine.render_template(template, &data).unwrap();
        assert_eq!(rendered, "Hello, World!");
    }

    #[test]
    fn verbatim_renders_json() {
        let engine = TEngine::new();
        let data = json!({"trigger": {"price": 3100.5, "symbol": "ETH"}});
        let rendered = engine
            .render_template("payload={{verbatim trigger}}", &data)
            .unwrap();
        assert_eq!(rendered, "payload={\"price\":3100.5,\"symbol\":\"ETH\"}");
    }

    #[test]
    fn render_value_walks_nested_config() {
        let engine = TEngine::new();
        let config = json!({
            "to": "ops@example.com",
            "subject": "New mail from {{trigger.email.from}}",
            "headers": { "X-Zap": "{{zap.id}}" },
            "tags": ["{{zap.name}}", 3],
            "sendNotifications": false
        });
        let data = json!({
            "trigger": { "email": { "from": "Ada <ada@example.com>" } },
            "zap": { "id": "zap-1", "name": "Inbox relay" }
        });

        let rendered = engine.render_value(&config, &data).unwrap();

        assert_eq!(rendered["subject"], "New mail from Ada <ada@example.com>");
        assert_eq!(rendered["headers"]["X-Zap"], "zap-1");
        assert_eq!(rendered["tags"], json!(["Inbox relay", 3]));
        assert_eq!(rendered["sendNotifications"], false);
        assert_eq!(rendered["to"], "ops@example.com");
    }

    #[test]
    fn broken_template_is_an_error() {
        let engine = TEngine::new();
        let result = engine.render_value(&json!({"body": "{{#if}}"}), &json!({}));
        assert!(result.is_err());
    }
}
