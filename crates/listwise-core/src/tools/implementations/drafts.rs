//! Draft review tools: update_draft and list_drafts

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{require_scope, storage_error};
use crate::storage::{DraftFilter, DraftStore, DraftValue};
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};
use crate::types::{DraftField, DraftStatus};

/// The only tool that changes draft content.
pub struct UpdateDraftTool {
    drafts: DraftStore,
}

impl UpdateDraftTool {
    pub fn new(drafts: DraftStore) -> Self {
        Self { drafts }
    }
}

#[derive(Deserialize)]
struct UpdateParams {
    draft_id: String,
    field: DraftField,
    value: Value,
    merchant_id: String,
}

#[async_trait]
impl Tool for UpdateDraftTool {
    fn name(&self) -> &str {
        "update_draft"
    }

    fn description(&self) -> &str {
        "Set one field of a draft. Only drafts that have not been persisted or discarded can change."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "draft_id": {"type": "string"},
                "field": {
                    "type": "string",
                    "enum": ["name_en", "name_ar", "description_en", "description_ar",
                             "category_en", "category_ar", "tags", "suggested_price"]
                },
                "value": {
                    "description": "New value. Tags: array or comma-separated string. Price: number or null."
                },
                "merchant_id": {"type": "string"}
            },
            "required": ["draft_id", "field", "value", "merchant_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: UpdateParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let scope = match require_scope(ctx, Some(&params.merchant_id), None) {
            Ok(scope) => scope,
            Err(e) => return e,
        };
        let value = match DraftValue::parse(params.field, &params.value) {
            Ok(v) => v,
            Err(msg) => return ToolResult::invalid_parameters(msg),
        };

        match self
            .drafts
            .update_field(&params.draft_id, &scope, params.field, &value)
        {
            Ok(true) => match self.drafts.get(&params.draft_id, &scope) {
                Ok(draft) => ToolResult::success_data(json!({
                    "draft_id": params.draft_id,
                    "field": params.field,
                    "draft": draft,
                })),
                Err(e) => storage_error(e),
            },
            Ok(false) => ToolResult::error_with_code(
                "not_found_or_locked",
                format!(
                    "Draft {} was not found for this store or is no longer editable",
                    params.draft_id
                ),
            ),
            Err(e) => storage_error(e),
        }
    }
}

pub struct ListDraftsTool {
    drafts: DraftStore,
}

impl ListDraftsTool {
    pub fn new(drafts: DraftStore) -> Self {
        Self { drafts }
    }
}

#[derive(Deserialize, Default)]
struct ListParams {
    #[serde(default)]
    batch_id: Option<String>,
    #[serde(default)]
    status: Option<DraftStatus>,
}

#[async_trait]
impl Tool for ListDraftsTool {
    fn name(&self) -> &str {
        "list_drafts"
    }

    fn description(&self) -> &str {
        "List the current store's drafts, optionally filtered by batch or status."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "batch_id": {"type": "string"},
                "status": {"type": "string", "enum": ["draft", "persisted", "discarded"]}
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ListParams = if params.is_null() {
            ListParams::default()
        } else {
            match parse_params(params) {
                Ok(p) => p,
                Err(e) => return e,
            }
        };
        let filter = DraftFilter {
            batch_id: params.batch_id,
            status: params.status,
        };
        match self.drafts.list(&ctx.agent.scope(), &filter) {
            Ok(drafts) => {
                let items: Vec<Value> = drafts
                    .iter()
                    .map(|d| {
                        json!({
                            "id": d.id,
                            "name_en": d.name_en,
                            "name_ar": d.name_ar,
                            "category_en": d.category_en,
                            "suggested_price": d.suggested_price,
                            "primary_image_url": d.primary_image_url,
                            "confidence": d.confidence,
                            "status": d.status,
                            "batch_id": d.batch_id,
                        })
                    })
                    .collect();
                ToolResult::success_data(json!({"count": items.len(), "drafts": items}))
            }
            Err(e) => storage_error(e),
        }
    }
}
