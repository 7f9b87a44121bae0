//! Request and response types for the API

use listwise_core::agent::ChatMessage;
use listwise_core::types::{AgentContext, DraftStatus, OwnershipScope};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat/reset`: the history the client is about to clear.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    pub context: AgentContext,
    #[serde(default, alias = "history")]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    /// Absent when there was nothing to archive.
    pub archive_id: Option<String>,
}

/// Scope and filters for draft listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftQuery {
    pub merchant_id: String,
    pub store_id: String,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub status: Option<DraftStatus>,
}

impl DraftQuery {
    pub fn validate(&self) -> Result<(), String> {
        if self.merchant_id.trim().is_empty() || self.store_id.trim().is_empty() {
            return Err("merchantId and storeId are required".into());
        }
        Ok(())
    }

    pub fn scope(&self) -> OwnershipScope {
        OwnershipScope {
            merchant_id: self.merchant_id.clone(),
            store_id: self.store_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reset_request_accepts_client_history() {
        let req: ResetRequest = serde_json::from_value(json!({
            "context": {"merchantId": "m1", "storeId": "s1", "locale": "ar"},
            "messages": [
                {"role": "user", "content": "مرحبا"},
                {"role": "assistant", "content": "أهلاً", "toolInvocations": []}
            ]
        }))
        .unwrap();
        assert_eq!(req.context.merchant_id, "m1");
        assert_eq!(req.messages.len(), 2);
    }

    #[test]
    fn test_draft_query_status_filter() {
        let q: DraftQuery = serde_json::from_value(json!({
            "merchantId": "m1", "storeId": "s1", "status": "persisted"
        }))
        .unwrap();
        assert_eq!(q.status, Some(DraftStatus::Persisted));
        assert_eq!(q.scope().store_id, "s1");
        assert!(q.validate().is_ok());
    }

    #[test]
    fn test_draft_query_needs_scope() {
        let q: DraftQuery =
            serde_json::from_value(json!({"merchantId": "m1", "storeId": " "})).unwrap();
        assert!(q.validate().is_err());
    }
}
