//! The persistence gate: confirm_and_persist and discard_drafts

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::confirmation::PersistencePermit;
use super::{require_scope, storage_error};
use crate::storage::{CatalogStore, DraftStore};
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};

/// Copies approved drafts into the catalog. Built per turn with the permit
/// from that turn's confirmation reply, if any.
pub struct ConfirmAndPersistTool {
    catalog: CatalogStore,
    permit: Option<PersistencePermit>,
}

impl ConfirmAndPersistTool {
    pub fn new(catalog: CatalogStore, permit: Option<PersistencePermit>) -> Self {
        Self { catalog, permit }
    }
}

#[derive(Deserialize)]
struct PersistParams {
    draft_ids: Vec<String>,
    #[serde(default)]
    store_id: Option<String>,
    #[serde(default)]
    merchant_id: Option<String>,
}

#[async_trait]
impl Tool for ConfirmAndPersistTool {
    fn name(&self) -> &str {
        "confirm_and_persist"
    }

    fn description(&self) -> &str {
        "Save approved drafts to the store catalog. Only works for drafts the merchant approved \
         through request_confirmation."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "draft_ids": {"type": "array", "items": {"type": "string"}},
                "store_id": {"type": "string"},
                "merchant_id": {"type": "string"}
            },
            "required": ["draft_ids"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: PersistParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let scope = match require_scope(ctx, params.merchant_id.as_deref(), params.store_id.as_deref()) {
            Ok(scope) => scope,
            Err(e) => return e,
        };
        if params.draft_ids.is_empty() {
            return ToolResult::invalid_parameters("draft_ids must not be empty");
        }

        let Some(permit) = &self.permit else {
            return ToolResult::error_with_code(
                "confirmation_required",
                "The merchant has not approved saving these drafts. Call request_confirmation first.",
            );
        };
        let uncovered: Vec<&String> = params
            .draft_ids
            .iter()
            .filter(|id| !permit.covers(id))
            .collect();
        if !uncovered.is_empty() {
            tracing::warn!(
                confirmation_id = permit.confirmation_id(),
                uncovered = uncovered.len(),
                "Refused to persist drafts outside the approval"
            );
            return ToolResult::error_with_details(
                "confirmation_required",
                "Some drafts were not part of the merchant's approval",
                Some(json!({"unapproved_draft_ids": uncovered})),
            );
        }

        match self.catalog.persist_drafts(&params.draft_ids, &scope) {
            Ok(report) => {
                let mut warnings = Vec::new();
                if report.failed_count > 0 {
                    warnings.push(format!("{} draft(s) could not be saved", report.failed_count));
                }
                if !report.skipped_draft_ids.is_empty() {
                    warnings.push(format!(
                        "{} draft(s) were not found or already saved",
                        report.skipped_draft_ids.len()
                    ));
                }
                ToolResult::success_data_with(
                    json!(report),
                    warnings,
                    Some(json!({"confirmation_id": permit.confirmation_id()})),
                )
            }
            Err(e) => storage_error(e),
        }
    }
}

pub struct DiscardDraftsTool {
    drafts: DraftStore,
}

impl DiscardDraftsTool {
    pub fn new(drafts: DraftStore) -> Self {
        Self { drafts }
    }
}

#[derive(Deserialize)]
struct DiscardParams {
    draft_ids: Vec<String>,
}

#[async_trait]
impl Tool for DiscardDraftsTool {
    fn name(&self) -> &str {
        "discard_drafts"
    }

    fn description(&self) -> &str {
        "Discard drafts the merchant does not want. Discarded drafts never reach the catalog."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "draft_ids": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["draft_ids"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: DiscardParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match self.drafts.discard(&params.draft_ids, &ctx.agent.scope()) {
            Ok(discarded) => {
                let not_discarded: Vec<&String> = params
                    .draft_ids
                    .iter()
                    .filter(|id| !discarded.contains(id))
                    .collect();
                ToolResult::success_data(json!({
                    "discarded_count": discarded.len(),
                    "discarded_draft_ids": discarded,
                    "not_discarded_draft_ids": not_discarded,
                }))
            }
            Err(e) => storage_error(e),
        }
    }
}
