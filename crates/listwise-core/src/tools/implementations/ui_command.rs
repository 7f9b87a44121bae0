//! emit_ui_command - queue an instruction for the client UI

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::agent::loop_events::UiCommand;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};

const COMMAND_TYPES: &[&str] = &["navigate", "toast", "refresh", "open_panel", "highlight"];

/// Commands collected during one turn, returned with the final response.
#[derive(Clone, Default)]
pub struct CommandSink {
    commands: Arc<Mutex<Vec<UiCommand>>>,
}

impl CommandSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: UiCommand) {
        self.commands.lock().push(command);
    }

    pub fn take(&self) -> Vec<UiCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct EmitUiCommandTool {
    sink: CommandSink,
}

impl EmitUiCommandTool {
    pub fn new(sink: CommandSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Tool for EmitUiCommandTool {
    fn name(&self) -> &str {
        "emit_ui_command"
    }

    fn description(&self) -> &str {
        "Send an instruction to the merchant's screen: navigate to a page, show a toast, refresh \
         the draft list, open a panel, or highlight an item. The app carries it out after your reply."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {"type": "string", "enum": COMMAND_TYPES},
                "action": {"type": "string"},
                "path": {"type": "string", "description": "App route, for navigate"},
                "message": {"type": "string", "description": "Text, for toast"},
                "variant": {"type": "string", "enum": ["info", "success", "warning", "error"]},
                "params": {"type": "object"}
            },
            "required": ["type"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolResult {
        let command: UiCommand = match parse_params(params) {
            Ok(c) => c,
            Err(e) => return e,
        };
        if !COMMAND_TYPES.contains(&command.command_type.as_str()) {
            return ToolResult::invalid_parameters(format!(
                "Unknown command type '{}'. Use one of: {}",
                command.command_type,
                COMMAND_TYPES.join(", ")
            ));
        }
        match command.command_type.as_str() {
            "navigate" if command.path.as_deref().map_or(true, |p| !p.starts_with('/')) => {
                return ToolResult::invalid_parameters("navigate needs a path starting with '/'");
            }
            "toast" if command.message.as_deref().map_or(true, |m| m.trim().is_empty()) => {
                return ToolResult::invalid_parameters("toast needs a message");
            }
            _ => {}
        }

        tracing::debug!(command_type = %command.command_type, "Queued UI command");
        let queued = json!(command);
        self.sink.push(command);
        ToolResult::success_data(json!({"queued": queued, "pending": self.sink.len()}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::test_support::ctx_for;

    #[tokio::test]
    async fn test_commands_are_collected() {
        let sink = CommandSink::new();
        let tool = EmitUiCommandTool::new(sink.clone());
        let ctx = ctx_for("m1", "s1");

        let result = tool
            .execute(json!({"type": "navigate", "path": "/drafts", "params": {"batch": "b1"}}), &ctx)
            .await;
        assert!(!result.is_error, "{}", result.output);
        let result = tool
            .execute(json!({"type": "toast", "message": "Saved", "variant": "success"}), &ctx)
            .await;
        assert!(!result.is_error);

        let commands = sink.take();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].path.as_deref(), Some("/drafts"));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_commands_rejected() {
        let sink = CommandSink::new();
        let tool = EmitUiCommandTool::new(sink.clone());
        let ctx = ctx_for("m1", "s1");

        for params in [
            json!({"type": "delete_store"}),
            json!({"type": "navigate"}),
            json!({"type": "toast", "message": " "}),
        ] {
            let result = tool.execute(params, &ctx).await;
            assert_eq!(result.error_code().as_deref(), Some("invalid_parameters"));
        }
        assert!(sink.is_empty());
    }
}
