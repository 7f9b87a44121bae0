//! Product Intelligence agent: one bilingual draft per image group.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::types::SubAgentKind;
use super::{brief, first_success};
use crate::agent::runtime::{AgentRuntime, StopCondition};
use crate::ai::backend::ModelBackend;
use crate::error::AgentError;
use crate::services::pricing::PricingOracle;
use crate::storage::DraftStore;
use crate::tools::implementations::{GenerateProductDetailsTool, SuggestCategoriesTool};
use crate::tools::registry::{Tool, ToolContext, ToolSet};
use crate::types::ImageGroup;

const INSTRUCTIONS: &str = "\
You prepare catalog listings. For the product group you are given, call \
generate_product_details exactly once, passing the group unchanged along with the store and \
merchant ids, batch id, and group index from the request. Call suggest_categories first only \
if the group has no category hint and the product is hard to place. Do not call \
generate_product_details more than once. Finish with one short sentence.";

/// The draft written for one group.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDraft {
    pub draft_id: String,
    pub draft: Value,
    /// The copy came from the deterministic fallback, not the model.
    pub fallback: bool,
    /// The tool ran directly because the agent did not call it.
    pub direct: bool,
}

pub struct ProductIntelligenceAgent {
    model: Arc<dyn ModelBackend>,
    drafts: DraftStore,
    pricing: Arc<dyn PricingOracle>,
}

impl ProductIntelligenceAgent {
    pub fn new(
        model: Arc<dyn ModelBackend>,
        drafts: DraftStore,
        pricing: Arc<dyn PricingOracle>,
    ) -> Self {
        Self { model, drafts, pricing }
    }

    fn runtime(&self, details_tool: Arc<GenerateProductDetailsTool>) -> AgentRuntime {
        let kind = SubAgentKind::ProductIntelligence;
        let tools = ToolSet::new()
            .with_tool(details_tool)
            .with_tool(Arc::new(SuggestCategoriesTool::new(self.model.clone())));
        AgentRuntime::new(
            kind.name(),
            self.model.clone(),
            kind.tier(),
            INSTRUCTIONS,
            tools,
            StopCondition::max_steps(kind.max_steps()),
        )
    }

    /// Produce the group's draft. A failed or incomplete agent run falls back
    /// to calling the tool directly, so every group still gets its draft.
    /// The tool is bound to `group`, whatever group the model passes.
    pub async fn generate(
        &self,
        group: &ImageGroup,
        group_index: usize,
        batch_id: Option<&str>,
        ctx: &ToolContext,
    ) -> Result<GeneratedDraft, AgentError> {
        let params = json!({
            "group": group,
            "locale": ctx.agent.locale,
            "store_type": ctx.agent.store_type,
            "store_id": ctx.agent.store_id,
            "merchant_id": ctx.agent.merchant_id,
            "batch_id": batch_id,
            "group_index": group_index,
        });
        let messages = brief("Create the listing draft for this product group.", &params);
        let details_tool = Arc::new(
            GenerateProductDetailsTool::new(self.model.clone(), self.drafts.clone(), self.pricing.clone())
                .for_group(group.clone()),
        );

        let from_agent = match self.runtime(details_tool.clone()).run(messages, ctx).await {
            Ok(run) => first_success(&run, details_tool.name()),
            Err(e) => {
                tracing::warn!(group_id = %group.id, error = %e, "Product agent failed, generating directly");
                None
            }
        };

        let direct = from_agent.is_none();
        let data = match from_agent {
            Some(data) => data,
            None => {
                let result = details_tool.execute(params, ctx).await;
                result.data().ok_or_else(|| {
                    AgentError::Delegation(format!(
                        "draft generation failed for group {}: {}",
                        group.id, result.output
                    ))
                })?
            }
        };

        let draft_id = data["draft_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AgentError::Delegation("draft result without an id".into()))?;
        Ok(GeneratedDraft {
            draft_id,
            fallback: data["fallback"].as_bool().unwrap_or(false),
            draft: data["draft"].clone(),
            direct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::subagent::types::call_labels;
    use crate::ai::backend::ModelTurn;
    use crate::ai::scripted::ScriptedBackend;
    use crate::services::pricing::NoPricing;
    use crate::storage::{Database, Stores};
    use crate::types::AgentContext;

    fn group() -> ImageGroup {
        ImageGroup {
            id: "g1".into(),
            suggested_name: "Desk Lamp".into(),
            suggested_name_translated: Some("مصباح مكتب".into()),
            image_urls: vec!["lamp_1.jpg".into(), "lamp_2.jpg".into()],
            primary_image_url: "lamp_1.jpg".into(),
            category_hint: None,
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(AgentContext::new("m1", "s1")))
    }

    #[tokio::test]
    async fn test_agent_calls_tool_once() {
        let backend = ScriptedBackend::new()
            .respond("product_intelligence", |req| {
                if req.ends_with_tool_results() {
                    return Ok(ModelTurn::text("Draft created."));
                }
                let params = crate::ai::json::extract_json_object(&req.last_user_text())
                    .unwrap_or_default();
                Ok(ModelTurn::tool_call("c1", "generate_product_details", params))
            })
            .script(
                call_labels::PRODUCT_COPY,
                vec![ModelTurn::text(
                    r#"{"name_en": "Desk Lamp", "name_ar": "مصباح مكتب", "category_en": "Lighting", "category_ar": "إضاءة", "confidence": "high"}"#,
                )],
            );
        let stores = Stores::new(Database::in_memory().unwrap());
        let agent = ProductIntelligenceAgent::new(Arc::new(backend), stores.drafts.clone(), Arc::new(NoPricing));

        let draft = agent.generate(&group(), 2, Some("b1"), &ctx()).await.unwrap();
        assert!(!draft.direct);
        assert!(!draft.fallback);
        assert_eq!(draft.draft["group_index"], 2);
        assert_eq!(draft.draft["batch_id"], "b1");
    }

    #[tokio::test]
    async fn test_model_cannot_split_one_group_into_two_drafts() {
        let backend = ScriptedBackend::new()
            .script(
                "product_intelligence",
                vec![
                    ModelTurn::tool_call(
                        "c1",
                        "generate_product_details",
                        json!({"group": group(), "merchant_id": "m1", "store_id": "s1"}),
                    ),
                    ModelTurn::tool_call(
                        "c2",
                        "generate_product_details",
                        json!({"group": {
                            "id": "g1-copy",
                            "suggested_name": "Desk Lamp",
                            "image_urls": ["lamp_2.jpg"],
                            "primary_image_url": "lamp_2.jpg"
                        }, "merchant_id": "m1", "store_id": "s1"}),
                    ),
                    ModelTurn::text("Done."),
                ],
            );
        let stores = Stores::new(Database::in_memory().unwrap());
        let agent = ProductIntelligenceAgent::new(Arc::new(backend), stores.drafts.clone(), Arc::new(NoPricing));

        let draft = agent.generate(&group(), 0, None, &ctx()).await.unwrap();
        let all = stores
            .drafts
            .list(&ctx().agent.scope(), &Default::default())
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, draft.draft_id);
        assert_eq!(all[0].image_urls, vec!["lamp_1.jpg", "lamp_2.jpg"]);
    }

    #[tokio::test]
    async fn test_failed_run_still_yields_one_draft() {
        let stores = Stores::new(Database::in_memory().unwrap());
        let agent = ProductIntelligenceAgent::new(
            Arc::new(ScriptedBackend::new()),
            stores.drafts.clone(),
            Arc::new(NoPricing),
        );
        let draft = agent.generate(&group(), 0, None, &ctx()).await.unwrap();
        assert!(draft.direct);
        assert!(draft.fallback);
        assert_eq!(draft.draft["name_ar"], "مصباح مكتب");
        assert_eq!(draft.draft["confidence"], "low");

        let all = stores
            .drafts
            .list(&ctx().agent.scope(), &Default::default())
            .unwrap();
        assert_eq!(all.len(), 1);
    }
}
