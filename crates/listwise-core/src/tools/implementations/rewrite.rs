//! rewrite_text - propose new wording for a draft field. Never writes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent::subagent::types::call_labels;
use crate::ai::backend::{complete_text, ModelBackend, ModelTier};
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};
use crate::types::{DraftField, Locale};

pub struct RewriteTextTool {
    model: Arc<dyn ModelBackend>,
}

impl RewriteTextTool {
    pub fn new(model: Arc<dyn ModelBackend>) -> Self {
        Self { model }
    }
}

#[derive(Deserialize)]
struct Params {
    text: String,
    instruction: String,
    #[serde(default)]
    field: Option<DraftField>,
    #[serde(default)]
    locale: Option<Locale>,
}

#[async_trait]
impl Tool for RewriteTextTool {
    fn name(&self) -> &str {
        "rewrite_text"
    }

    fn description(&self) -> &str {
        "Rewrite a piece of listing text following an instruction. Returns the original and the \
         proposed rewrite; nothing is saved."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "Current text"},
                "instruction": {"type": "string", "description": "What to change"},
                "field": {"type": "string", "description": "Draft field the text belongs to"},
                "locale": {"type": "string", "enum": ["en", "ar"]}
            },
            "required": ["text", "instruction"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: Params = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if params.instruction.trim().is_empty() {
            return ToolResult::invalid_parameters("instruction must not be empty");
        }
        // A field's own language beats the conversation language
        let locale = params
            .field
            .and_then(DraftField::locale)
            .or(params.locale)
            .unwrap_or(ctx.agent.locale);

        let system = format!(
            "You edit e-commerce product copy. Rewrite the text the user gives you following \
             the instruction. Write in {}. Reply with the rewritten text only.",
            locale.display_name()
        );
        let prompt = format!(
            "Instruction: {}\n\nText:\n{}",
            params.instruction.trim(),
            params.text
        );

        let rewritten = match complete_text(
            self.model.as_ref(),
            call_labels::REWRITE,
            ModelTier::Fast,
            &system,
            &prompt,
        )
        .await
        {
            Ok(text) => clean_rewrite(&text),
            Err(e) => return ToolResult::error_with_code("tool_error", format!("Rewrite failed: {}", e)),
        };
        if rewritten.is_empty() {
            return ToolResult::error_with_code("tool_error", "Rewrite came back empty");
        }

        ToolResult::success_data(json!({
            "original": params.text,
            "rewritten": rewritten,
            "field": params.field,
            "locale": locale,
        }))
    }
}

/// Strip wrapping quotes or a fence the model sometimes adds.
fn clean_rewrite(text: &str) -> String {
    let mut text = text.trim();
    if let Some(inner) = text.strip_prefix("```").and_then(|t| t.strip_suffix("```")) {
        text = inner.trim_start_matches(|c: char| c.is_ascii_alphabetic()).trim();
    }
    for (open, close) in [('"', '"'), ('“', '”'), ('«', '»')] {
        if text.len() > 1 && text.starts_with(open) && text.ends_with(close) {
            text = &text[open.len_utf8()..text.len() - close.len_utf8()];
            break;
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::backend::ModelTurn;
    use crate::ai::scripted::ScriptedBackend;
    use crate::tools::implementations::test_support::ctx_for;

    #[test]
    fn test_clean_rewrite() {
        assert_eq!(clean_rewrite("  \"Shorter name\" "), "Shorter name");
        assert_eq!(clean_rewrite("```text\nHello\n```"), "Hello");
        assert_eq!(clean_rewrite("«كوب أزرق»"), "كوب أزرق");
        assert_eq!(clean_rewrite("plain"), "plain");
    }

    #[tokio::test]
    async fn test_rewrite_uses_field_language() {
        let backend = Arc::new(
            ScriptedBackend::new().script(call_labels::REWRITE, vec![ModelTurn::text("كوب قهوة")]),
        );
        let tool = RewriteTextTool::new(backend.clone());
        let result = tool
            .execute(
                json!({"text": "كوب", "instruction": "make it specific", "field": "name_ar", "locale": "en"}),
                &ctx_for("m1", "s1"),
            )
            .await;

        let data = result.data().unwrap();
        assert_eq!(data["original"], "كوب");
        assert_eq!(data["rewritten"], "كوب قهوة");
        assert_eq!(data["locale"], "ar");
        let calls = backend.calls_for(call_labels::REWRITE);
        assert!(calls[0].system.contains("Arabic"));
    }

    #[tokio::test]
    async fn test_model_failure_is_tool_error() {
        let tool = RewriteTextTool::new(Arc::new(ScriptedBackend::new()));
        let result = tool
            .execute(json!({"text": "a", "instruction": "b"}), &ctx_for("m1", "s1"))
            .await;
        assert_eq!(result.error_code().as_deref(), Some("tool_error"));
    }
}
