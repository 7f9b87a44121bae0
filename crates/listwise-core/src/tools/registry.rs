//! Tool contract and per-agent tool sets
//!
//! A tool is either executable or a pause tool. Pause tools have no executor:
//! invoking one ends the agent loop and hands its arguments to the caller.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;

use crate::agent::emitter::StepEmitter;
use crate::ai::types::AiTool;
use crate::types::AgentContext;

/// Default tool execution timeout (2 minutes)
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Tool execution result
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a success result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create a structured success envelope with `ok=true` and `data`.
    pub fn success_data(data: Value) -> Self {
        Self::success_data_with(data, Vec::new(), None)
    }

    /// Create a structured success envelope with optional warnings/metadata.
    pub fn success_data_with(data: Value, warnings: Vec<String>, metadata: Option<Value>) -> Self {
        let mut envelope = serde_json::Map::new();
        envelope.insert("ok".to_string(), Value::Bool(true));
        envelope.insert("data".to_string(), data);

        if !warnings.is_empty() {
            envelope.insert(
                "warnings".to_string(),
                Value::Array(warnings.into_iter().map(Value::String).collect()),
            );
        }

        if let Some(metadata) = metadata {
            envelope.insert("metadata".to_string(), metadata);
        }

        Self {
            output: Value::Object(envelope).to_string(),
            is_error: false,
        }
    }

    /// Create a structured error with explicit code.
    pub fn error_with_code(code: &str, msg: impl std::fmt::Display) -> Self {
        Self::error_with_details(code, msg, None)
    }

    /// Create a structured error envelope with optional data.
    pub fn error_with_details(code: &str, msg: impl std::fmt::Display, data: Option<Value>) -> Self {
        let mut envelope = serde_json::Map::new();
        envelope.insert("ok".to_string(), Value::Bool(false));
        envelope.insert(
            "error".to_string(),
            serde_json::json!({
                "code": code,
                "message": msg.to_string()
            }),
        );

        if let Some(data) = data {
            envelope.insert("data".to_string(), data);
        }

        Self {
            output: Value::Object(envelope).to_string(),
            is_error: true,
        }
    }

    /// Create an invalid-parameters error.
    pub fn invalid_parameters(msg: impl std::fmt::Display) -> Self {
        Self::error_with_code("invalid_parameters", msg)
    }

    /// Create an error result, classifying the code from the message
    pub fn error(msg: impl std::fmt::Display) -> Self {
        let message = msg.to_string();
        let code = classify_error_code(&message);
        Self::error_with_details(code, message, None)
    }

    /// The output parsed as JSON (plain-text outputs become a JSON string).
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.output).unwrap_or_else(|_| Value::String(self.output.clone()))
    }

    /// `data` of a success envelope.
    pub fn data(&self) -> Option<Value> {
        if self.is_error {
            return None;
        }
        self.json().get("data").cloned()
    }

    /// `error.code` of an error envelope.
    pub fn error_code(&self) -> Option<String> {
        if !self.is_error {
            return None;
        }
        self.json()
            .pointer("/error/code")
            .and_then(|c| c.as_str())
            .map(str::to_string)
    }
}

/// Parse tool parameters, returning a ToolResult error on failure
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolResult> {
    serde_json::from_value(params)
        .map_err(|e| ToolResult::invalid_parameters(format!("Invalid parameters: {}", e)))
}

fn classify_error_code(message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    if lower.contains("invalid parameters")
        || lower.contains("missing field")
        || lower.contains("unknown field")
    {
        "invalid_parameters"
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "timeout"
    } else if lower.contains("ownership") || lower.contains("denied") {
        "ownership_denied"
    } else if lower.contains("unknown tool") {
        "unknown_tool"
    } else {
        "tool_error"
    }
}

/// Context for tool execution
#[derive(Clone)]
pub struct ToolContext {
    /// Request context; the ownership scope of every write comes from here.
    pub agent: Arc<AgentContext>,
    /// Step emitter for tools that report incremental progress.
    pub progress: Option<StepEmitter>,
    /// Optional per-call timeout override
    pub timeout: Option<Duration>,
}

impl ToolContext {
    pub fn new(agent: Arc<AgentContext>) -> Self {
        Self {
            agent,
            progress: None,
            timeout: None,
        }
    }

    pub fn with_progress(mut self, emitter: StepEmitter) -> Self {
        self.progress = Some(emitter);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Trait for tool implementations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id)
    fn name(&self) -> &str;

    /// Tool description for AI
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult;
}

/// A declared tool with no executor. Calling it suspends the loop.
#[derive(Debug, Clone)]
pub struct PauseTool {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

#[derive(Clone)]
pub enum ToolSpec {
    Executable(Arc<dyn Tool>),
    Pause(PauseTool),
}

impl ToolSpec {
    pub fn name(&self) -> &str {
        match self {
            ToolSpec::Executable(tool) => tool.name(),
            ToolSpec::Pause(pause) => &pause.name,
        }
    }

    fn ai_tool(&self) -> AiTool {
        match self {
            ToolSpec::Executable(tool) => AiTool {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema(),
            },
            ToolSpec::Pause(pause) => AiTool {
                name: pause.name.clone(),
                description: pause.description.clone(),
                input_schema: pause.schema.clone(),
            },
        }
    }
}

/// Fixed set of tools one agent may call, built once at construction.
#[derive(Clone)]
pub struct ToolSet {
    tools: BTreeMap<String, ToolSpec>,
    default_timeout: Duration,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools
            .insert(tool.name().to_string(), ToolSpec::Executable(tool));
        self
    }

    pub fn with_pause(mut self, pause: PauseTool) -> Self {
        self.tools.insert(pause.name.clone(), ToolSpec::Pause(pause));
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All tools as AI tool definitions
    pub fn ai_tools(&self) -> Vec<AiTool> {
        self.tools.values().map(ToolSpec::ai_tool).collect()
    }

    /// Execute a tool by name with timeout and panic isolation. Never fails:
    /// every problem comes back as an error envelope.
    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> ToolResult {
        let tool = match self.tools.get(name) {
            Some(ToolSpec::Executable(tool)) => tool.clone(),
            Some(ToolSpec::Pause(_)) => {
                return ToolResult::error_with_code(
                    "tool_error",
                    format!("'{}' suspends the conversation and cannot be executed", name),
                );
            }
            None => {
                return ToolResult::error_with_code(
                    "unknown_tool",
                    format!("Unknown tool '{}'. Available: {}", name, self.names().join(", ")),
                );
            }
        };

        let timeout = ctx.timeout.unwrap_or(self.default_timeout);
        let start = Instant::now();
        let guarded = AssertUnwindSafe(tool.execute(params, ctx)).catch_unwind();

        let result = match tokio::time::timeout(timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(tool = name, panic = %detail, "Tool panicked");
                ToolResult::error_with_code(
                    "tool_panicked",
                    format!("Tool '{}' failed unexpectedly: {}", name, detail),
                )
            }
            Err(_) => {
                tracing::warn!(
                    tool = name,
                    timeout_secs = timeout.as_secs(),
                    "Tool execution timed out"
                );
                ToolResult::error_with_code(
                    "timeout",
                    format!(
                        "Tool '{}' timed out after {} seconds",
                        name,
                        timeout.as_secs()
                    ),
                )
            }
        };

        tracing::debug!(
            tool = name,
            is_error = result.is_error,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tool finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(AgentContext::new("m1", "s1")))
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input back"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
            ToolResult::success_data(json!({"echo": params, "merchant": ctx.agent.merchant_id}))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolResult {
            panic!("kaboom");
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ToolResult::success("late")
        }
    }

    fn pause() -> PauseTool {
        PauseTool {
            name: "request_confirmation".into(),
            description: "Ask the user".into(),
            schema: json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn test_executes_and_wraps_envelope() {
        let set = ToolSet::new().with_tool(Arc::new(EchoTool));
        let result = set.execute("echo", json!({"x": 1}), &ctx()).await;
        assert!(!result.is_error);
        assert_eq!(result.data().unwrap()["echo"]["x"], 1);
        assert_eq!(result.data().unwrap()["merchant"], "m1");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let set = ToolSet::new().with_tool(Arc::new(EchoTool));
        let result = set.execute("nope", json!({}), &ctx()).await;
        assert_eq!(result.error_code().as_deref(), Some("unknown_tool"));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let set = ToolSet::new().with_tool(Arc::new(PanickingTool));
        let result = set.execute("explode", json!({}), &ctx()).await;
        assert_eq!(result.error_code().as_deref(), Some("tool_panicked"));
        assert!(result.output.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_timeout_is_error_result() {
        let set = ToolSet::new().with_tool(Arc::new(SlowTool));
        let ctx = ctx().with_timeout(Duration::from_millis(20));
        let result = set.execute("slow", json!({}), &ctx).await;
        assert_eq!(result.error_code().as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_pause_tool_is_advertised_not_executed() {
        let set = ToolSet::new().with_tool(Arc::new(EchoTool)).with_pause(pause());
        let names: Vec<String> = set.ai_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo", "request_confirmation"]);
        assert!(matches!(set.get("request_confirmation"), Some(ToolSpec::Pause(_))));
        let result = set.execute("request_confirmation", json!({}), &ctx()).await;
        assert!(result.is_error);
    }

    #[test]
    fn test_tool_result_error_classification() {
        let result = ToolResult::error("Test error");
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["ok"], false);
        assert_eq!(parsed["error"]["message"], "Test error");
        assert_eq!(parsed["error"]["code"], "tool_error");
        assert_eq!(
            ToolResult::error("request timed out").error_code().as_deref(),
            Some("timeout")
        );
    }

    #[test]
    fn test_parse_params_invalid() {
        #[derive(serde::Deserialize, Debug)]
        struct Params {
            #[serde(rename = "name")]
            _name: String,
        }

        let err = parse_params::<Params>(json!({"name": 123})).unwrap_err();
        assert!(err.output.contains("Invalid parameters"));
        assert_eq!(err.error_code().as_deref(), Some("invalid_parameters"));
    }
}
