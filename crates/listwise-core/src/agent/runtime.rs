//! Bounded model + tools loop shared by the manager and every sub-agent.
//!
//! Each step asks the model for zero or more tool calls, executes executable
//! tools in the order requested, and feeds their results back. The loop ends
//! when the model answers without tool calls, when a pause tool is invoked, or
//! when the step budget runs out. Tool failures are results; only a failed
//! model call ends a run with an error.

use std::sync::Arc;

use serde_json::Value;
use tracing::Instrument;

use crate::ai::backend::{GenerateRequest, ModelBackend, ModelTier, DEFAULT_MAX_TOKENS};
use crate::ai::types::{AiToolCall, Content, FinishReason, ModelMessage, Role};
use crate::error::AgentError;
use crate::tools::registry::{ToolContext, ToolResult, ToolSet, ToolSpec};

/// Stop after this many model steps.
#[derive(Debug, Clone, Copy)]
pub struct StopCondition {
    pub max_steps: usize,
}

impl StopCondition {
    pub fn max_steps(max_steps: usize) -> Self {
        Self {
            max_steps: max_steps.max(1),
        }
    }
}

/// One model step as it happened.
#[derive(Debug, Clone)]
pub struct AgentStep {
    pub index: usize,
    pub text: String,
    pub tool_calls: Vec<AiToolCall>,
    pub finish_reason: FinishReason,
}

/// An executed tool call and its result.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub step: usize,
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub result: ToolResult,
}

/// The pause tool invocation that suspended the run.
#[derive(Debug, Clone, PartialEq)]
pub struct PausedCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFinish {
    Completed,
    Paused,
    StepBudgetExhausted,
}

#[derive(Debug, Clone)]
pub struct AgentRunResult {
    /// Last non-empty text the model produced.
    pub text: String,
    pub steps: Vec<AgentStep>,
    pub tool_results: Vec<ToolOutcome>,
    pub paused: Option<PausedCall>,
    pub finish: RunFinish,
    /// Full transcript including the input messages.
    pub transcript: Vec<ModelMessage>,
}

impl AgentRunResult {
    /// Outcomes of one tool, in execution order.
    pub fn results_for<'a>(&'a self, tool_name: &'a str) -> impl Iterator<Item = &'a ToolOutcome> {
        self.tool_results
            .iter()
            .filter(move |o| o.tool_name == tool_name)
    }
}

/// Synchronous hooks into a run, for layers that report progress.
pub trait RunObserver: Send + Sync {
    fn on_step_start(&self, _agent: &str, _step: usize, _max_steps: usize) {}
    fn on_tool_start(&self, _agent: &str, _call: &AiToolCall) {}
    fn on_tool_finish(&self, _agent: &str, _call: &AiToolCall, _result: &ToolResult) {}
    fn on_pause(&self, _agent: &str, _call: &AiToolCall) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

pub struct AgentRuntime {
    name: String,
    model: Arc<dyn ModelBackend>,
    tier: ModelTier,
    instructions: String,
    tools: ToolSet,
    stop: StopCondition,
    max_tokens: usize,
}

impl AgentRuntime {
    pub fn new(
        name: impl Into<String>,
        model: Arc<dyn ModelBackend>,
        tier: ModelTier,
        instructions: impl Into<String>,
        tools: ToolSet,
        stop: StopCondition,
    ) -> Self {
        Self {
            name: name.into(),
            model,
            tier,
            instructions: instructions.into(),
            tools,
            stop,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub async fn run(
        &self,
        messages: Vec<ModelMessage>,
        ctx: &ToolContext,
    ) -> Result<AgentRunResult, AgentError> {
        self.run_observed(messages, ctx, &NoopObserver).await
    }

    pub async fn run_observed(
        &self,
        messages: Vec<ModelMessage>,
        ctx: &ToolContext,
        observer: &dyn RunObserver,
    ) -> Result<AgentRunResult, AgentError> {
        let span = tracing::info_span!("agent_run", agent = %self.name);
        self.run_inner(messages, ctx, observer).instrument(span).await
    }

    async fn run_inner(
        &self,
        messages: Vec<ModelMessage>,
        ctx: &ToolContext,
        observer: &dyn RunObserver,
    ) -> Result<AgentRunResult, AgentError> {
        let ai_tools = self.tools.ai_tools();
        let mut result = AgentRunResult {
            text: String::new(),
            steps: Vec::new(),
            tool_results: Vec::new(),
            paused: None,
            finish: RunFinish::StepBudgetExhausted,
            transcript: messages,
        };

        for index in 1..=self.stop.max_steps {
            observer.on_step_start(&self.name, index, self.stop.max_steps);

            let request = GenerateRequest::new(&self.name, self.tier, &self.instructions)
                .with_messages(result.transcript.clone())
                .with_tools(ai_tools.clone())
                .with_max_tokens(self.max_tokens);
            let turn = match self.model.generate(request).await {
                Ok(turn) => turn,
                Err(e) => {
                    tracing::error!(step = index, error = %e, "Model call failed");
                    return Err(AgentError::ModelInvocation(e));
                }
            };

            tracing::debug!(
                step = index,
                tool_calls = turn.tool_calls.len(),
                text_len = turn.text.len(),
                "Model step"
            );

            if !turn.text.trim().is_empty() {
                result.text = turn.text.trim().to_string();
            }
            result.steps.push(AgentStep {
                index,
                text: turn.text.clone(),
                tool_calls: turn.tool_calls.clone(),
                finish_reason: turn.finish_reason.clone(),
            });

            let mut assistant = Vec::new();
            if !turn.text.is_empty() {
                assistant.push(Content::Text {
                    text: turn.text.clone(),
                });
            }
            for call in &turn.tool_calls {
                assistant.push(Content::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                });
            }
            result.transcript.push(ModelMessage {
                role: Role::Assistant,
                content: assistant,
            });

            if turn.tool_calls.is_empty() {
                result.finish = RunFinish::Completed;
                return Ok(result);
            }

            let mut tool_results = Vec::new();
            for call in &turn.tool_calls {
                if let Some(ToolSpec::Pause(_)) = self.tools.get(&call.name) {
                    tracing::info!(tool = %call.name, step = index, "Run paused");
                    observer.on_pause(&self.name, call);
                    if !tool_results.is_empty() {
                        result.transcript.push(ModelMessage {
                            role: Role::User,
                            content: tool_results,
                        });
                    }
                    result.paused = Some(PausedCall {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    });
                    result.finish = RunFinish::Paused;
                    return Ok(result);
                }

                observer.on_tool_start(&self.name, call);
                let outcome = self
                    .tools
                    .execute(&call.name, call.arguments.clone(), ctx)
                    .await;
                if outcome.is_error {
                    tracing::info!(tool = %call.name, output = %outcome.output, "Tool returned error");
                }
                observer.on_tool_finish(&self.name, call, &outcome);

                tool_results.push(Content::ToolResult {
                    tool_use_id: call.id.clone(),
                    output: Value::String(outcome.output.clone()),
                    is_error: outcome.is_error.then_some(true),
                });
                result.tool_results.push(ToolOutcome {
                    step: index,
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: outcome,
                });
            }
            result.transcript.push(ModelMessage {
                role: Role::User,
                content: tool_results,
            });
        }

        tracing::warn!(max_steps = self.stop.max_steps, "Step budget exhausted");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::backend::ModelTurn;
    use crate::ai::scripted::ScriptedBackend;
    use crate::error::ModelError;
    use crate::tools::registry::{PauseTool, Tool};
    use crate::types::AgentContext;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct CountingTool {
        calls: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "count"
        }

        fn description(&self) -> &str {
            "Counts"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolResult {
            let mut calls = self.calls.lock();
            calls.push(params);
            ToolResult::success_data(json!({"n": calls.len()}))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(AgentContext::new("m1", "s1")))
    }

    fn runtime(backend: ScriptedBackend, tool: Arc<CountingTool>, max_steps: usize) -> AgentRuntime {
        let tools = ToolSet::new().with_tool(tool).with_pause(PauseTool {
            name: "ask".into(),
            description: "Ask the user".into(),
            schema: json!({"type": "object"}),
        });
        AgentRuntime::new(
            "tester",
            Arc::new(backend),
            ModelTier::Fast,
            "You test things",
            tools,
            StopCondition::max_steps(max_steps),
        )
    }

    fn counting() -> Arc<CountingTool> {
        Arc::new(CountingTool {
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_tools_run_in_order_then_completes() {
        let backend = ScriptedBackend::new().script(
            "tester",
            vec![
                ModelTurn::tool_calls(vec![
                    AiToolCall { id: "1".into(), name: "count".into(), arguments: json!({"i": 1}) },
                    AiToolCall { id: "2".into(), name: "count".into(), arguments: json!({"i": 2}) },
                ]),
                ModelTurn::text("All counted"),
            ],
        );
        let tool = counting();
        let result = runtime(backend, tool.clone(), 5).run(vec![ModelMessage::user_text("go")], &ctx()).await.unwrap();

        assert_eq!(result.finish, RunFinish::Completed);
        assert_eq!(result.text, "All counted");
        assert_eq!(result.steps.len(), 2);
        assert_eq!(*tool.calls.lock(), vec![json!({"i": 1}), json!({"i": 2})]);
        assert_eq!(result.tool_results[1].result.data().unwrap()["n"], 2);
    }

    #[tokio::test]
    async fn test_pause_halts_before_later_calls() {
        let backend = ScriptedBackend::new().script(
            "tester",
            vec![ModelTurn::tool_calls(vec![
                AiToolCall { id: "1".into(), name: "count".into(), arguments: json!({}) },
                AiToolCall { id: "2".into(), name: "ask".into(), arguments: json!({"q": "ok?"}) },
                AiToolCall { id: "3".into(), name: "count".into(), arguments: json!({}) },
            ])],
        );
        let tool = counting();
        let result = runtime(backend, tool.clone(), 5).run(vec![ModelMessage::user_text("go")], &ctx()).await.unwrap();

        assert_eq!(result.finish, RunFinish::Paused);
        assert_eq!(result.paused.as_ref().unwrap().arguments["q"], "ok?");
        assert_eq!(tool.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let backend = ScriptedBackend::new().respond("tester", |req| {
            let fed_back = req.messages.iter().any(|m| m.tool_results().any(|(_, _, err)| err));
            if fed_back {
                Ok(ModelTurn::text("recovered"))
            } else {
                Ok(ModelTurn::tool_call("x", "teleport", json!({})))
            }
        });
        let result = runtime(backend, counting(), 3).run(vec![ModelMessage::user_text("go")], &ctx()).await.unwrap();
        assert_eq!(result.text, "recovered");
        assert_eq!(result.tool_results[0].result.error_code().as_deref(), Some("unknown_tool"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let backend = ScriptedBackend::new()
            .respond("tester", |_| Ok(ModelTurn::tool_call("c", "count", json!({}))));
        let tool = counting();
        let result = runtime(backend, tool.clone(), 3).run(vec![ModelMessage::user_text("go")], &ctx()).await.unwrap();
        assert_eq!(result.finish, RunFinish::StepBudgetExhausted);
        assert_eq!(tool.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_model_failure_is_terminal() {
        let backend = ScriptedBackend::new()
            .script_results("tester", vec![Err(ModelError::new("quota").with_status(429))]);
        let err = runtime(backend, counting(), 3).run(vec![ModelMessage::user_text("go")], &ctx()).await.unwrap_err();
        assert!(matches!(err, AgentError::ModelInvocation(_)));
        assert!(err.is_retryable());
    }
}
