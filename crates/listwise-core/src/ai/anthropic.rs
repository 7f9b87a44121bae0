//! Anthropic Messages API backend
//!
//! Non-streaming: every agent step is one request/response pair. Transient
//! failures are retried here so agents only ever see terminal errors.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info_span, Instrument};

use super::backend::{GenerateRequest, ModelBackend, ModelTier, ModelTurn};
use super::retry::{with_retry, RetryConfig};
use super::types::{AiToolCall, Content, FinishReason, ModelMessage, Role, Usage};
use crate::config::ModelSettings;
use crate::error::ModelError;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

pub struct AnthropicBackend {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    fast_model: String,
    quality_model: String,
    retry: RetryConfig,
}

impl AnthropicBackend {
    pub fn new(settings: &ModelSettings) -> Result<Self, ModelError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ModelError::new("No API key configured (set LISTWISE_API_KEY or ANTHROPIC_API_KEY)")
            })?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: settings.base_url.clone(),
            api_key,
            fast_model: settings.fast_model.clone(),
            quality_model: settings.quality_model.clone(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_model,
            ModelTier::Quality => &self.quality_model,
        }
    }

    async fn send_once(&self, body: &Value) -> Result<Value, ModelError> {
        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or(text);

        let mut err = ModelError::new(message).with_status(status.as_u16());
        if let Some(delay) = retry_after {
            err = err.with_retry_after(delay);
        }
        Err(err)
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<ModelTurn, ModelError> {
        let model = self.model_for(request.tier).to_string();
        let body = build_request_body(&model, &request);
        let span = info_span!("model_call", agent = %request.agent, model = %model);

        async {
            debug!(messages = request.messages.len(), tools = request.tools.len(), "Sending request");
            let json = with_retry(&self.retry, || self.send_once(&body)).await?;
            parse_response(&json)
        }
        .instrument(span)
        .await
    }
}

/// Build the Messages API body for one step.
pub fn build_request_body(model: &str, request: &GenerateRequest) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": request.max_tokens,
        "system": request.system,
        "messages": convert_messages(&request.messages),
    });
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect(),
        );
    }
    body
}

/// Convert transcript messages, merging consecutive same-role messages since
/// the API requires strict user/assistant alternation.
fn convert_messages(messages: &[ModelMessage]) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::new();
    let mut last_role: Option<Role> = None;

    for msg in messages {
        let blocks: Vec<Value> = msg.content.iter().filter_map(convert_content).collect();
        if blocks.is_empty() {
            continue;
        }
        if last_role == Some(msg.role) {
            if let Some(Value::Array(existing)) =
                result.last_mut().and_then(|m| m.get_mut("content"))
            {
                existing.extend(blocks);
                continue;
            }
        }
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        result.push(json!({ "role": role, "content": blocks }));
        last_role = Some(msg.role);
    }
    result
}

fn convert_content(content: &Content) -> Option<Value> {
    match content {
        Content::Text { text } if text.is_empty() => None,
        Content::Text { text } => Some(json!({ "type": "text", "text": text })),
        Content::Image { image } => {
            if let Some(url) = &image.url {
                Some(json!({
                    "type": "image",
                    "source": { "type": "url", "url": url }
                }))
            } else {
                image.base64.as_ref().map(|data| {
                    json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.media_type.as_deref().unwrap_or("image/jpeg"),
                            "data": data
                        }
                    })
                })
            }
        }
        Content::ToolUse { id, name, input } => Some(json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input
        })),
        Content::ToolResult {
            tool_use_id,
            output,
            is_error,
        } => {
            let text = match output {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let mut block = json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": text
            });
            if is_error == &Some(true) {
                block["is_error"] = Value::Bool(true);
            }
            Some(block)
        }
    }
}

/// Parse a Messages API response into a model turn.
pub fn parse_response(json: &Value) -> Result<ModelTurn, ModelError> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| ModelError::new("Response has no content array"))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(chunk) = block.get("text").and_then(|t| t.as_str()) {
                    text.push_str(chunk);
                }
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                let name = block.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                tool_calls.push(AiToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
                });
            }
            // Thinking and other block types carry nothing the loop needs
            _ => {}
        }
    }

    let finish_reason = match json.get("stop_reason").and_then(|s| s.as_str()) {
        Some("end_turn") | Some("stop_sequence") | None => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some(other) => FinishReason::Other(other.to_string()),
    };

    let usage = Usage {
        prompt_tokens: json
            .pointer("/usage/input_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize,
        completion_tokens: json
            .pointer("/usage/output_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize,
    };

    Ok(ModelTurn {
        text: text.trim().to_string(),
        tool_calls,
        finish_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::{AiTool, ImageContent};

    #[test]
    fn test_body_merges_consecutive_user_messages() {
        let request = GenerateRequest::new("manager", ModelTier::Quality, "be helpful")
            .with_messages(vec![
                ModelMessage::user_text("hello"),
                ModelMessage {
                    role: Role::User,
                    content: vec![Content::Image {
                        image: ImageContent {
                            url: Some("https://cdn.example.com/a.jpg".into()),
                            base64: None,
                            media_type: None,
                        },
                    }],
                },
            ])
            .with_tools(vec![AiTool {
                name: "list_drafts".into(),
                description: "List drafts".into(),
                input_schema: json!({"type": "object"}),
            }]);

        let body = build_request_body("claude-test", &request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[0]["content"][1]["source"]["type"], "url");
        assert_eq!(body["tools"][0]["name"], "list_drafts");
        assert_eq!(body["system"], "be helpful");
    }

    #[test]
    fn test_tool_result_is_error_flag() {
        let msg = ModelMessage {
            role: Role::User,
            content: vec![Content::ToolResult {
                tool_use_id: "t1".into(),
                output: json!("{\"ok\":false}"),
                is_error: Some(true),
            }],
        };
        let converted = convert_messages(&[msg]);
        assert_eq!(converted[0]["content"][0]["is_error"], true);
        assert_eq!(converted[0]["content"][0]["content"], "{\"ok\":false}");
    }

    #[test]
    fn test_parse_tool_use_response() {
        let json = json!({
            "content": [
                {"type": "text", "text": "Grouping your images now."},
                {"type": "tool_use", "id": "toolu_1", "name": "analyze_product_images", "input": {"image_urls": ["a.jpg"]}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 120, "output_tokens": 30}
        });
        let turn = parse_response(&json).unwrap();
        assert_eq!(turn.text, "Grouping your images now.");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "analyze_product_images");
        assert_eq!(turn.finish_reason, FinishReason::ToolCalls);
        assert_eq!(turn.usage.prompt_tokens, 120);
    }

    #[test]
    fn test_parse_rejects_missing_content() {
        assert!(parse_response(&json!({"type": "error"})).is_err());
    }

    #[test]
    fn test_missing_api_key_is_error() {
        let settings = ModelSettings::default();
        assert!(AnthropicBackend::new(&settings).is_err());
    }
}
