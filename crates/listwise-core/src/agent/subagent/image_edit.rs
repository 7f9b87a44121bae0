//! Image Edit agent: crop, background removal, enhancement, primary swap.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::brief;
use super::types::SubAgentKind;
use crate::agent::runtime::{AgentRuntime, StopCondition};
use crate::ai::backend::ModelBackend;
use crate::error::AgentError;
use crate::storage::{AssetLedger, DraftStore};
use crate::tools::implementations::{ImageOpTool, ImageOperation};
use crate::tools::registry::{ToolContext, ToolSet};
use crate::types::ProductDraft;

const INSTRUCTIONS: &str = "\
You edit product photos. Pick the tool that matches the merchant's request and call it for the \
draft you were given: crop_image, remove_background, enhance_image, or replace_image to make \
another of the draft's photos the main one. replace_image only accepts URLs already in the \
draft's image list. Finish with one short sentence saying what changed.";

#[derive(Debug, Clone, Serialize)]
pub struct ImageEditOutcome {
    pub draft_id: String,
    /// Result data of every operation that ran, successful or not.
    pub operations: Vec<Value>,
    pub summary: String,
}

pub struct ImageEditAgent {
    runtime: AgentRuntime,
}

impl ImageEditAgent {
    pub fn new(model: Arc<dyn ModelBackend>, drafts: DraftStore, assets: AssetLedger) -> Self {
        let kind = SubAgentKind::ImageEdit;
        let tools = ImageOperation::ALL.iter().fold(ToolSet::new(), |set, op| {
            set.with_tool(Arc::new(ImageOpTool::new(*op, drafts.clone(), assets.clone())))
        });
        Self {
            runtime: AgentRuntime::new(
                kind.name(),
                model,
                kind.tier(),
                INSTRUCTIONS,
                tools,
                StopCondition::max_steps(kind.max_steps()),
            ),
        }
    }

    pub async fn edit(
        &self,
        draft: &ProductDraft,
        instruction: &str,
        ctx: &ToolContext,
    ) -> Result<ImageEditOutcome, AgentError> {
        let payload = json!({
            "draft_id": draft.id,
            "image_urls": draft.image_urls,
            "primary_image_url": draft.primary_image_url,
            "instruction": instruction,
        });
        let run = self
            .runtime
            .run(brief("Edit this draft's images.", &payload), ctx)
            .await?;

        let operations: Vec<Value> = run
            .tool_results
            .iter()
            .map(|o| {
                json!({
                    "tool": o.tool_name,
                    "ok": !o.result.is_error,
                    "result": o.result.data().unwrap_or_else(|| o.result.json()),
                })
            })
            .collect();
        if operations.is_empty() {
            return Err(AgentError::Delegation(
                "the image agent did not run any operation".into(),
            ));
        }

        Ok(ImageEditOutcome {
            draft_id: draft.id.clone(),
            operations,
            summary: run.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::backend::ModelTurn;
    use crate::ai::scripted::ScriptedBackend;
    use crate::storage::drafts::test_support::sample_draft;
    use crate::storage::{Database, Stores};
    use crate::types::AgentContext;

    #[tokio::test]
    async fn test_swaps_primary_and_records_asset() {
        let stores = Stores::new(Database::in_memory().unwrap());
        let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));
        let draft = stores
            .drafts
            .create(&ctx.agent.scope(), sample_draft("Mug", &["a.jpg", "b.jpg"]))
            .unwrap();
        let backend = ScriptedBackend::new().script(
            "image_edit",
            vec![
                ModelTurn::tool_call(
                    "c1",
                    "replace_image",
                    json!({"draft_id": draft.id, "new_primary_url": "b.jpg"}),
                ),
                ModelTurn::text("The second photo is now the main one."),
            ],
        );
        let agent = ImageEditAgent::new(Arc::new(backend), stores.drafts.clone(), stores.assets.clone());

        let outcome = agent.edit(&draft, "use the second photo", &ctx).await.unwrap();
        assert_eq!(outcome.operations.len(), 1);
        assert_eq!(outcome.operations[0]["ok"], true);
        assert_eq!(stores.assets.for_task("m1", &draft.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_operation_is_an_error() {
        let stores = Stores::new(Database::in_memory().unwrap());
        let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));
        let draft = stores
            .drafts
            .create(&ctx.agent.scope(), sample_draft("Mug", &["a.jpg"]))
            .unwrap();
        let backend = ScriptedBackend::new().script("image_edit", vec![ModelTurn::text("Nothing to do.")]);
        let agent = ImageEditAgent::new(Arc::new(backend), stores.drafts.clone(), stores.assets.clone());
        assert!(agent.edit(&draft, "make it pop", &ctx).await.is_err());
    }
}
