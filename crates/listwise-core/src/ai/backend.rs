//! Model backend contract
//!
//! One call = one model step: given instructions, a transcript, and the tools
//! on offer, the backend returns text and zero or more proposed tool calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{AiTool, AiToolCall, FinishReason, ModelMessage, Usage};
use crate::error::ModelError;

/// Which provider tier a call runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Fast and cheap - vision, editing, small classification calls
    Fast,
    /// Higher quality - orchestration and bilingual copy generation
    Quality,
}

/// A single model step request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Label of the calling agent or tool ("manager", "vision", ...).
    pub agent: String,
    pub tier: ModelTier,
    pub system: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<AiTool>,
    pub max_tokens: usize,
}

impl GenerateRequest {
    pub fn new(agent: impl Into<String>, tier: ModelTier, system: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            tier,
            system: system.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_messages(mut self, messages: Vec<ModelMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tools(mut self, tools: Vec<AiTool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Text of the most recent user message.
    pub fn last_user_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::types::Role::User && !m.text().is_empty())
            .map(|m| m.text())
            .unwrap_or_default()
    }

    /// Whether the latest message carries tool results, i.e. the model is
    /// being asked to continue after its own tool calls.
    pub fn ends_with_tool_results(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.tool_results().next().is_some())
    }
}

pub const DEFAULT_MAX_TOKENS: usize = 4096;

/// What the model produced for one step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: String,
    pub tool_calls: Vec<AiToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

impl ModelTurn {
    /// A plain text answer with no tool calls.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A step that proposes a single tool call.
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::tool_calls(vec![AiToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }])
    }

    pub fn tool_calls(calls: Vec<AiToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls: calls,
            finish_reason: FinishReason::ToolCalls,
            usage: Usage::default(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<ModelTurn, ModelError>;
}

/// Single-shot completion without tools. Used by tools that need generated
/// text (copywriting, rewriting, classification).
pub async fn complete_text(
    backend: &dyn ModelBackend,
    agent: &str,
    tier: ModelTier,
    system: &str,
    user_message: &str,
) -> Result<String, ModelError> {
    let request = GenerateRequest::new(agent, tier, system)
        .with_messages(vec![ModelMessage::user_text(user_message)]);
    let turn = backend.generate(request).await?;
    Ok(turn.text.trim().to_string())
}
