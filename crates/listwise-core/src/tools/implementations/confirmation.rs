//! Structural confirmation before anything reaches the catalog
//!
//! `request_confirmation` is a pause tool: calling it ends the Manager's run
//! and its arguments travel to the client as a [`PendingConfirmation`], which
//! also rides on the assistant message in the client-held history. The next
//! turn answers with a [`ConfirmationReply`]. A [`PersistencePermit`] exists
//! only for an approved reply to the pause that is still pending, and only
//! for drafts that pause asked about. `confirm_and_persist` refuses to run
//! without one.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tools::registry::PauseTool;

pub const REQUEST_CONFIRMATION: &str = "request_confirmation";

pub fn request_confirmation_tool() -> PauseTool {
    PauseTool {
        name: REQUEST_CONFIRMATION.to_string(),
        description: "Ask the merchant to approve saving drafts to the store. Required before \
                      confirm_and_persist. Ends your turn; the merchant's answer arrives with \
                      their next message."
            .to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Short description of what will be saved, in the merchant's language"
                },
                "draft_ids": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Drafts the merchant is approving"
                }
            },
            "required": ["summary", "draft_ids"]
        }),
    }
}

/// A confirmation the manager asked for and is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmation {
    /// The pause tool call id.
    pub confirmation_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub draft_ids: Vec<String>,
}

impl PendingConfirmation {
    pub fn from_pause(call_id: &str, arguments: &Value) -> Self {
        Self {
            confirmation_id: call_id.to_string(),
            summary: arguments["summary"].as_str().unwrap_or_default().to_string(),
            draft_ids: arguments["draft_ids"]
                .as_array()
                .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }

    /// Answer this confirmation for every draft it covers.
    pub fn reply(&self, approved: bool) -> ConfirmationReply {
        ConfirmationReply {
            confirmation_id: self.confirmation_id.clone(),
            approved,
            draft_ids: if approved { self.draft_ids.clone() } else { Vec::new() },
        }
    }
}

/// The client's answer to a confirmation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationReply {
    pub confirmation_id: String,
    pub approved: bool,
    #[serde(default)]
    pub draft_ids: Vec<String>,
}

/// Draft ids the merchant approved for persistence in this turn.
///
/// Fields are private and the only constructor takes a reply, so a permit
/// cannot exist unless the merchant said yes.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistencePermit {
    confirmation_id: String,
    draft_ids: BTreeSet<String>,
}

impl PersistencePermit {
    /// Permit for the drafts `reply` approves out of those `pending` asked
    /// about. An empty id list in the reply approves all of them.
    pub fn from_reply(reply: &ConfirmationReply, pending: &PendingConfirmation) -> Option<Self> {
        if !reply.approved || reply.confirmation_id != pending.confirmation_id {
            return None;
        }
        let requested: BTreeSet<String> = pending.draft_ids.iter().cloned().collect();
        let draft_ids: BTreeSet<String> = if reply.draft_ids.is_empty() {
            requested
        } else {
            reply
                .draft_ids
                .iter()
                .filter(|id| requested.contains(*id))
                .cloned()
                .collect()
        };
        if draft_ids.is_empty() {
            return None;
        }
        Some(Self {
            confirmation_id: reply.confirmation_id.clone(),
            draft_ids,
        })
    }

    pub fn confirmation_id(&self) -> &str {
        &self.confirmation_id
    }

    pub fn covers(&self, draft_id: &str) -> bool {
        self.draft_ids.contains(draft_id)
    }

    pub fn draft_ids(&self) -> impl Iterator<Item = &str> {
        self.draft_ids.iter().map(String::as_str)
    }
}
