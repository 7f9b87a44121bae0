//! Manager tools that delegate to sub-agents
//!
//! Each tool constructs its sub-agent, runs it once with a fresh transcript,
//! and returns only the structured data the manager needs. Listing generation
//! fans out over groups in fixed-width chunks and reports progress after each
//! chunk.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};

use super::loop_events::{BulkProgressData, CompletedItem, ItemStatus, StepUpdate};
use super::manager::ManagerServices;
use super::subagent::{
    EditingAgent, ImageEditAgent, ProductIntelligenceAgent, SubAgentKind, VisionAgent,
};
use crate::storage::DraftStore;
use crate::tools::implementations::storage_error;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};
use crate::types::{DraftField, ImageGroup, OwnershipScope, ProductDraft};

fn report(ctx: &ToolContext, step: StepUpdate) {
    if let Some(progress) = &ctx.progress {
        progress.emit(step);
    }
}

fn editable_draft(
    drafts: &DraftStore,
    draft_id: &str,
    scope: &OwnershipScope,
) -> Result<ProductDraft, ToolResult> {
    match drafts.get(draft_id, scope) {
        Ok(Some(draft)) if !draft.status.is_terminal() => Ok(draft),
        Ok(_) => Err(ToolResult::error_with_code(
            "not_found_or_locked",
            format!("Draft {} was not found for this store or is no longer editable", draft_id),
        )),
        Err(e) => Err(storage_error(e)),
    }
}

// ---------------------------------------------------------------------------
// analyze_product_images

pub struct AnalyzeProductImagesTool {
    services: ManagerServices,
    uploaded: Vec<String>,
}

impl AnalyzeProductImagesTool {
    /// `uploaded` are the image URLs that came with the request; used when the
    /// model does not pass its own list.
    pub fn new(services: ManagerServices, uploaded: Vec<String>) -> Self {
        Self { services, uploaded }
    }
}

#[derive(Deserialize, Default)]
struct AnalyzeParams {
    #[serde(default)]
    image_urls: Option<Vec<String>>,
}

#[async_trait]
impl Tool for AnalyzeProductImagesTool {
    fn name(&self) -> &str {
        "analyze_product_images"
    }

    fn description(&self) -> &str {
        "Group the merchant's uploaded product photos so each group is one product. Uses the \
         photos from the current message unless image_urls is given."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "image_urls": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: AnalyzeParams = if params.is_null() {
            AnalyzeParams::default()
        } else {
            match parse_params(params) {
                Ok(p) => p,
                Err(e) => return e,
            }
        };
        let urls = match params.image_urls {
            Some(urls) if !urls.is_empty() => urls,
            _ => self.uploaded.clone(),
        };
        if urls.is_empty() {
            return ToolResult::invalid_parameters("No images to analyze; ask the merchant to upload photos");
        }

        let kind = SubAgentKind::Vision;
        report(
            ctx,
            StepUpdate::executing(format!("Grouping {} images", urls.len()))
                .with_agent(kind.name())
                .with_action(self.name()),
        );
        let agent = VisionAgent::new(self.services.model.clone(), self.services.grouper.clone());
        match agent.analyze(&urls, ctx).await {
            Ok(outcome) => {
                let image_count: usize = outcome.groups.iter().map(|g| g.image_urls.len()).sum();
                ToolResult::success_data_with(
                    json!({
                        "groups": outcome.groups,
                        "group_count": outcome.groups.len(),
                        "image_count": image_count,
                        "summary": outcome.summary,
                    }),
                    outcome.warnings,
                    Some(json!({"direct": outcome.direct})),
                )
            }
            Err(e) => ToolResult::error_with_code("tool_error", format!("Image analysis failed: {}", e)),
        }
    }
}

// ---------------------------------------------------------------------------
// generate_product_listings

pub struct GenerateProductListingsTool {
    services: ManagerServices,
    width: usize,
}

impl GenerateProductListingsTool {
    pub fn new(services: ManagerServices, width: usize) -> Self {
        Self {
            services,
            width: width.max(1),
        }
    }
}

#[derive(Deserialize)]
struct ListingsParams {
    groups: Vec<ImageGroup>,
    #[serde(default)]
    batch_id: Option<String>,
}

#[async_trait]
impl Tool for GenerateProductListingsTool {
    fn name(&self) -> &str {
        "generate_product_listings"
    }

    fn description(&self) -> &str {
        "Create one bilingual draft listing per image group. Pass the groups exactly as \
         analyze_product_images returned them."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "groups": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "suggested_name": {"type": "string"},
                            "suggested_name_translated": {"type": "string"},
                            "image_urls": {"type": "array", "items": {"type": "string"}},
                            "primary_image_url": {"type": "string"},
                            "category_hint": {"type": "string"}
                        },
                        "required": ["id", "suggested_name", "image_urls", "primary_image_url"]
                    }
                },
                "batch_id": {"type": "string"}
            },
            "required": ["groups"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ListingsParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if params.groups.is_empty() {
            return ToolResult::invalid_parameters("groups must not be empty");
        }
        let batch_id = params
            .batch_id
            .or_else(|| ctx.agent.batch_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let total = params.groups.len();
        let kind = SubAgentKind::ProductIntelligence;
        let mut progress = BulkProgressData {
            operation_id: uuid::Uuid::new_v4().to_string(),
            operation_label: "Generating product listings".to_string(),
            current: 0,
            total,
            current_item: None,
            completed_items: Vec::new(),
        };
        let snapshot = |progress: &BulkProgressData| {
            StepUpdate::executing(format!(
                "Generated {} of {} listings",
                progress.current, progress.total
            ))
            .with_step(progress.current, progress.total)
            .with_agent(kind.name())
            .with_action(self.name())
            .with_bulk_progress(progress.clone())
        };

        let mut drafts = Vec::new();
        let mut failed = Vec::new();
        let mut fallback_count = 0;

        for (chunk_index, chunk) in params.groups.chunks(self.width).enumerate() {
            progress.current_item = Some(
                chunk
                    .iter()
                    .map(|g| g.suggested_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            report(ctx, snapshot(&progress));

            let tasks = chunk.iter().enumerate().map(|(offset, group)| {
                let index = chunk_index * self.width + offset;
                let agent = ProductIntelligenceAgent::new(
                    self.services.model.clone(),
                    self.services.stores.drafts.clone(),
                    self.services.pricing.clone(),
                );
                let batch_id = batch_id.as_str();
                async move {
                    let outcome = agent.generate(group, index, Some(batch_id), ctx).await;
                    (group, outcome)
                }
            });

            for (group, outcome) in join_all(tasks).await {
                let item = match outcome {
                    Ok(generated) => {
                        if generated.fallback {
                            fallback_count += 1;
                        }
                        let item = CompletedItem {
                            id: group.id.clone(),
                            label: group.suggested_name.clone(),
                            status: if generated.fallback {
                                ItemStatus::Fallback
                            } else {
                                ItemStatus::Success
                            },
                            draft_id: Some(generated.draft_id.clone()),
                        };
                        drafts.push(json!({
                            "group_id": group.id,
                            "draft_id": generated.draft_id,
                            "name_en": generated.draft["name_en"],
                            "name_ar": generated.draft["name_ar"],
                            "category_en": generated.draft["category_en"],
                            "suggested_price": generated.draft["suggested_price"],
                            "confidence": generated.draft["confidence"],
                            "fallback": generated.fallback,
                        }));
                        item
                    }
                    Err(e) => {
                        tracing::error!(group_id = %group.id, error = %e, "Listing generation failed");
                        failed.push(json!({"group_id": group.id, "error": e.to_string()}));
                        CompletedItem {
                            id: group.id.clone(),
                            label: group.suggested_name.clone(),
                            status: ItemStatus::Failed,
                            draft_id: None,
                        }
                    }
                };
                progress.completed_items.push(item);
                progress.current += 1;
            }
        }
        progress.current_item = None;
        report(ctx, snapshot(&progress));

        tracing::info!(
            batch_id = %batch_id,
            groups = total,
            created = drafts.len(),
            fallback = fallback_count,
            failed = failed.len(),
            "Generated listings"
        );
        let mut warnings = Vec::new();
        if fallback_count > 0 {
            warnings.push(format!(
                "{} draft(s) use placeholder text and need review",
                fallback_count
            ));
        }
        ToolResult::success_data_with(
            json!({
                "batch_id": batch_id,
                "created_count": drafts.len(),
                "fallback_count": fallback_count,
                "failed_count": failed.len(),
                "drafts": drafts,
                "failed": failed,
            }),
            warnings,
            None,
        )
    }
}

// ---------------------------------------------------------------------------
// suggest_draft_edit

pub struct SuggestDraftEditTool {
    services: ManagerServices,
}

impl SuggestDraftEditTool {
    pub fn new(services: ManagerServices) -> Self {
        Self { services }
    }
}

#[derive(Deserialize)]
struct EditParams {
    draft_id: String,
    field: DraftField,
    instruction: String,
    #[serde(default)]
    apply: bool,
}

#[async_trait]
impl Tool for SuggestDraftEditTool {
    fn name(&self) -> &str {
        "suggest_draft_edit"
    }

    fn description(&self) -> &str {
        "Propose a rewrite of one text field of a draft. Returns the before and after; set apply \
         only when the merchant has already accepted the change."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "draft_id": {"type": "string"},
                "field": {
                    "type": "string",
                    "enum": ["name_en", "name_ar", "description_en", "description_ar",
                             "category_en", "category_ar", "tags"]
                },
                "instruction": {"type": "string"},
                "apply": {"type": "boolean"}
            },
            "required": ["draft_id", "field", "instruction"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: EditParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let draft = match editable_draft(&self.services.stores.drafts, &params.draft_id, &ctx.agent.scope()) {
            Ok(d) => d,
            Err(e) => return e,
        };

        report(
            ctx,
            StepUpdate::executing(format!("Rewriting {}", params.field.column()))
                .with_agent(SubAgentKind::Editing.name())
                .with_action(self.name()),
        );
        let agent = EditingAgent::new(self.services.model.clone(), self.services.stores.drafts.clone());
        match agent
            .propose(&draft, params.field, &params.instruction, params.apply, ctx)
            .await
        {
            Ok(proposal) => ToolResult::success_data(json!(proposal)),
            Err(e) => ToolResult::error_with_code("tool_error", format!("Edit failed: {}", e)),
        }
    }
}

// ---------------------------------------------------------------------------
// edit_draft_image

pub struct EditDraftImageTool {
    services: ManagerServices,
}

impl EditDraftImageTool {
    pub fn new(services: ManagerServices) -> Self {
        Self { services }
    }
}

#[derive(Deserialize)]
struct ImageParams {
    draft_id: String,
    instruction: String,
}

#[async_trait]
impl Tool for EditDraftImageTool {
    fn name(&self) -> &str {
        "edit_draft_image"
    }

    fn description(&self) -> &str {
        "Change a draft's photos: crop, remove background, enhance, or choose a different main photo."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "draft_id": {"type": "string"},
                "instruction": {"type": "string", "description": "What the merchant wants changed"}
            },
            "required": ["draft_id", "instruction"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: ImageParams = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let draft = match editable_draft(&self.services.stores.drafts, &params.draft_id, &ctx.agent.scope()) {
            Ok(d) => d,
            Err(e) => return e,
        };

        report(
            ctx,
            StepUpdate::executing("Editing product photos")
                .with_agent(SubAgentKind::ImageEdit.name())
                .with_action(self.name()),
        );
        let agent = ImageEditAgent::new(
            self.services.model.clone(),
            self.services.stores.drafts.clone(),
            self.services.stores.assets.clone(),
        );
        match agent.edit(&draft, &params.instruction, ctx).await {
            Ok(outcome) => ToolResult::success_data(json!(outcome)),
            Err(e) => ToolResult::error_with_code("tool_error", format!("Image edit failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::emitter::StepEmitter;
    use crate::agent::loop_events::StepType;
    use crate::ai::scripted::ScriptedBackend;
    use crate::services::grouping::FilenameGrouper;
    use crate::services::pricing::NoPricing;
    use crate::storage::{Database, Stores};
    use crate::types::AgentContext;

    fn services() -> ManagerServices {
        ManagerServices {
            model: Arc::new(ScriptedBackend::new()),
            stores: Stores::new(Database::in_memory().unwrap()),
            grouper: Arc::new(FilenameGrouper),
            pricing: Arc::new(NoPricing),
        }
    }

    fn groups(n: usize) -> Vec<ImageGroup> {
        (0..n)
            .map(|i| ImageGroup {
                id: format!("g{}", i),
                suggested_name: format!("Product {}", i),
                suggested_name_translated: None,
                image_urls: vec![format!("p{}.jpg", i)],
                primary_image_url: format!("p{}.jpg", i),
                category_hint: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_analyze_defaults_to_uploaded_images() {
        let tool = AnalyzeProductImagesTool::new(
            services(),
            vec!["mug_1.jpg".into(), "mug_2.jpg".into(), "lamp.jpg".into()],
        );
        let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));
        let data = tool.execute(json!({}), &ctx).await.data().unwrap();
        assert_eq!(data["group_count"], 2);
        assert_eq!(data["image_count"], 3);
    }

    #[tokio::test]
    async fn test_listings_fan_out_in_chunks() {
        let services = services();
        let drafts = services.stores.drafts.clone();
        let tool = GenerateProductListingsTool::new(services, 3);
        let emitter = StepEmitter::recording();
        let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1"))).with_progress(emitter.clone());

        let data = tool
            .execute(json!({"groups": groups(5), "batch_id": "b1"}), &ctx)
            .await
            .data()
            .unwrap();
        assert_eq!(data["created_count"], 5);
        assert_eq!(data["fallback_count"], 5);

        let snapshots: Vec<usize> = emitter
            .steps()
            .iter()
            .filter(|s| s.step_type == StepType::Executing)
            .filter_map(|s| s.bulk_progress.as_ref().map(|p| p.current))
            .collect();
        assert_eq!(snapshots, vec![0, 3, 5]);

        let stored = drafts.list(&ctx.agent.scope(), &Default::default()).unwrap();
        assert_eq!(stored.len(), 5);
        let mut indexes: Vec<i64> = stored.iter().filter_map(|d| d.group_index).collect();
        indexes.sort();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_edit_of_foreign_draft_is_refused() {
        let services = services();
        let draft = services
            .stores
            .drafts
            .create(
                &AgentContext::new("m1", "s1").scope(),
                crate::storage::drafts::test_support::sample_draft("Mug", &["a.jpg"]),
            )
            .unwrap();
        let tool = SuggestDraftEditTool::new(services);
        let ctx = ToolContext::new(Arc::new(AgentContext::new("m2", "s2")));
        let result = tool
            .execute(
                json!({"draft_id": draft.id, "field": "name_en", "instruction": "shorter"}),
                &ctx,
            )
            .await;
        assert_eq!(result.error_code().as_deref(), Some("not_found_or_locked"));
    }
}
