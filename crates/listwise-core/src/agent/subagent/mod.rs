//! Specialised sub-agents
//!
//! Each sub-agent is an [`AgentRuntime`](super::runtime::AgentRuntime) with
//! its own instructions, tools, tier, and step budget. The manager runs one
//! per delegation with a fresh transcript; only the structured data pulled
//! from its tool results goes back.

pub mod editing;
pub mod image_edit;
pub mod product_intelligence;
pub mod types;
pub mod vision;

pub use editing::{EditProposal, EditingAgent};
pub use image_edit::{ImageEditAgent, ImageEditOutcome};
pub use product_intelligence::{GeneratedDraft, ProductIntelligenceAgent};
pub use types::{SubAgentKind, MANAGER_AGENT};
pub use vision::{VisionAgent, VisionOutcome};

use serde_json::Value;

use super::runtime::AgentRunResult;
use crate::ai::types::ModelMessage;

/// Opening message of a sub-agent run: one instruction line, then the JSON
/// payload it works on.
pub(crate) fn brief(instruction: &str, payload: &Value) -> Vec<ModelMessage> {
    vec![ModelMessage::user_text(format!("{}\n{}", instruction, payload))]
}

/// `data` of the first successful call of `tool`.
pub(crate) fn first_success(run: &AgentRunResult, tool: &str) -> Option<Value> {
    run.results_for(tool).find_map(|o| o.result.data())
}

/// `data` of every successful call of `tool`, in order.
pub(crate) fn all_successes(run: &AgentRunResult, tool: &str) -> Vec<Value> {
    run.results_for(tool).filter_map(|o| o.result.data()).collect()
}
