//! Wire protocol for a streamed manager turn.
//!
//! A turn is a sequence of `StreamFrame`s: step frames in phase order, one
//! response frame, and a done sentinel. An error frame replaces the response
//! and the sentinel. Transport layers (SSE server, CLI) map frames to their own
//! presentation with [`StreamFrame::event_name`] and [`StreamFrame::payload`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::implementations::PendingConfirmation;

/// Phase of a turn. Declaration order is the only legal progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Planning,
    Executing,
    Synthesizing,
    Complete,
}

impl StepType {
    pub fn as_str(self) -> &'static str {
        match self {
            StepType::Planning => "planning",
            StepType::Executing => "executing",
            StepType::Synthesizing => "synthesizing",
            StepType::Complete => "complete",
        }
    }
}

/// One progress event. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_progress: Option<BulkProgressData>,
}

impl StepUpdate {
    pub fn new(step_type: StepType, message: impl Into<String>) -> Self {
        Self {
            step_type,
            step: None,
            total_steps: None,
            agent: None,
            action: None,
            message: message.into(),
            data: None,
            bulk_progress: None,
        }
    }

    pub fn planning(message: impl Into<String>) -> Self {
        Self::new(StepType::Planning, message)
    }

    pub fn executing(message: impl Into<String>) -> Self {
        Self::new(StepType::Executing, message)
    }

    pub fn synthesizing(message: impl Into<String>) -> Self {
        Self::new(StepType::Synthesizing, message)
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(StepType::Complete, message)
    }

    pub fn with_step(mut self, step: usize, total_steps: usize) -> Self {
        self.step = Some(step);
        self.total_steps = Some(total_steps);
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_bulk_progress(mut self, progress: BulkProgressData) -> Self {
        self.bulk_progress = Some(progress);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Fallback,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedItem {
    pub id: String,
    pub label: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<String>,
}

/// Snapshot of a bulk operation's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkProgressData {
    pub operation_id: String,
    pub operation_label: String,
    pub current: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    pub completed_items: Vec<CompletedItem>,
}

/// A client-side instruction the manager emits. Never executed server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiCommand {
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// One tool call the manager made during the turn, as reported to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    pub result: Value,
    pub is_error: bool,
}

/// Final payload of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub content: String,
    pub tool_invocations: Vec<ToolInvocation>,
    pub steps: Vec<StepUpdate>,
    pub commands: Vec<UiCommand>,
    /// Present when the turn ended waiting for the user to confirm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<PendingConfirmation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Step(StepUpdate),
    Response(TurnResponse),
    Error {
        error: String,
        details: Option<String>,
        retryable: bool,
    },
    Done,
}

impl StreamFrame {
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamFrame::Step(_) => "step",
            StreamFrame::Response(_) => "response",
            StreamFrame::Error { .. } => "error",
            StreamFrame::Done => "done",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            StreamFrame::Step(step) => serde_json::to_value(step).unwrap_or(Value::Null),
            StreamFrame::Response(response) => {
                serde_json::to_value(response).unwrap_or(Value::Null)
            }
            StreamFrame::Error {
                error,
                details,
                retryable,
            } => serde_json::json!({
                "error": error,
                "details": details,
                "retryable": retryable,
            }),
            StreamFrame::Done => serde_json::json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_update_wire_shape() {
        let step = StepUpdate::executing("Generating 2/5")
            .with_step(2, 5)
            .with_agent("product_intelligence")
            .with_bulk_progress(BulkProgressData {
                operation_id: "op1".into(),
                operation_label: "Generating listings".into(),
                current: 2,
                total: 5,
                current_item: Some("Mug".into()),
                completed_items: vec![CompletedItem {
                    id: "group-1".into(),
                    label: "Mug".into(),
                    status: ItemStatus::Success,
                    draft_id: Some("d1".into()),
                }],
            });

        let v = serde_json::to_value(&step).unwrap();
        assert_eq!(v["type"], "executing");
        assert_eq!(v["totalSteps"], 5);
        assert_eq!(v["bulkProgress"]["operationId"], "op1");
        assert_eq!(v["bulkProgress"]["completedItems"][0]["status"], "success");
        assert_eq!(v["bulkProgress"]["completedItems"][0]["draftId"], "d1");
        assert!(v.get("action").is_none());
    }

    #[test]
    fn test_phase_order() {
        assert!(StepType::Planning < StepType::Executing);
        assert!(StepType::Synthesizing < StepType::Complete);
    }

    #[test]
    fn test_frames() {
        let error = StreamFrame::Error {
            error: "model unavailable".into(),
            details: None,
            retryable: true,
        };
        assert_eq!(error.event_name(), "error");
        assert_eq!(error.payload()["retryable"], true);

        let command = UiCommand {
            command_type: "navigate".into(),
            action: None,
            path: Some("/drafts".into()),
            message: None,
            variant: None,
            params: None,
        };
        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({"type": "navigate", "path": "/drafts"})
        );
    }
}
