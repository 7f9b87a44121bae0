//! Editing agent: proposes wording changes for one draft field.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use super::types::SubAgentKind;
use super::{all_successes, brief};
use crate::agent::runtime::{AgentRuntime, StopCondition};
use crate::ai::backend::ModelBackend;
use crate::error::AgentError;
use crate::storage::DraftStore;
use crate::tools::implementations::{RewriteTextTool, UpdateDraftTool};
use crate::tools::registry::{Tool, ToolContext, ToolSet};
use crate::types::{DraftField, ProductDraft};

const INSTRUCTIONS: &str = "\
You edit product listing text. Call rewrite_text with the current text and the merchant's \
instruction, then finish with one short sentence. You cannot change the draft yourself.";

/// Before and after for one field.
#[derive(Debug, Clone, Serialize)]
pub struct EditProposal {
    pub draft_id: String,
    pub field: DraftField,
    pub original: String,
    pub rewritten: String,
    /// The rewrite was also written to the draft.
    pub applied: bool,
}

/// The agent only proposes. When the caller asks to apply, the final rewrite
/// goes through `update_draft` after the run, so nothing the model does can
/// write a draft the merchant has not accepted.
pub struct EditingAgent {
    runtime: AgentRuntime,
    rewrite_tool: Arc<RewriteTextTool>,
    update_tool: UpdateDraftTool,
}

impl EditingAgent {
    pub fn new(model: Arc<dyn ModelBackend>, drafts: DraftStore) -> Self {
        let kind = SubAgentKind::Editing;
        let rewrite_tool = Arc::new(RewriteTextTool::new(model.clone()));
        let tools = ToolSet::new().with_tool(rewrite_tool.clone());
        Self {
            runtime: AgentRuntime::new(
                kind.name(),
                model,
                kind.tier(),
                INSTRUCTIONS,
                tools,
                StopCondition::max_steps(kind.max_steps()),
            ),
            rewrite_tool,
            update_tool: UpdateDraftTool::new(drafts),
        }
    }

    pub async fn propose(
        &self,
        draft: &ProductDraft,
        field: DraftField,
        instruction: &str,
        apply: bool,
        ctx: &ToolContext,
    ) -> Result<EditProposal, AgentError> {
        let original = field.read_text(draft).ok_or_else(|| {
            AgentError::Delegation(format!("{} cannot be rewritten", field.column()))
        })?;
        let payload = json!({
            "draft_id": draft.id,
            "merchant_id": draft.merchant_id,
            "field": field,
            "locale": field.locale(),
            "text": original,
            "instruction": instruction,
        });
        let run = self
            .runtime
            .run(brief("Rewrite this draft field.", &payload), ctx)
            .await?;

        let rewritten = all_successes(&run, self.rewrite_tool.name())
            .last()
            .and_then(|data| data["rewritten"].as_str().map(str::to_string))
            .ok_or_else(|| AgentError::Delegation("the editing agent produced no rewrite".into()))?;
        let applied = if apply {
            let write = self
                .update_tool
                .execute(
                    json!({
                        "draft_id": draft.id,
                        "field": field,
                        "value": rewritten,
                        "merchant_id": draft.merchant_id,
                    }),
                    ctx,
                )
                .await;
            if write.is_error {
                tracing::warn!(draft_id = %draft.id, output = %write.output, "Rewrite not applied");
            }
            !write.is_error
        } else {
            false
        };

        Ok(EditProposal {
            draft_id: draft.id.clone(),
            field,
            original,
            rewritten,
            applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::subagent::types::call_labels;
    use crate::ai::backend::ModelTurn;
    use crate::ai::scripted::ScriptedBackend;
    use crate::storage::drafts::test_support::sample_draft;
    use crate::storage::{Database, Stores};
    use crate::types::AgentContext;

    #[tokio::test]
    async fn test_proposal_does_not_write() {
        let stores = Stores::new(Database::in_memory().unwrap());
        let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));
        let draft = stores
            .drafts
            .create(&ctx.agent.scope(), sample_draft("Mug", &["a.jpg"]))
            .unwrap();

        let backend = ScriptedBackend::new()
            .script(
                "editing",
                vec![
                    ModelTurn::tool_call(
                        "c1",
                        "rewrite_text",
                        json!({"text": "Mug", "instruction": "more specific", "field": "name_en"}),
                    ),
                    ModelTurn::text("Here is a proposal."),
                ],
            )
            .script(call_labels::REWRITE, vec![ModelTurn::text("Blue Ceramic Mug")]);
        let agent = EditingAgent::new(Arc::new(backend), stores.drafts.clone());

        let proposal = agent
            .propose(&draft, DraftField::NameEn, "more specific", false, &ctx)
            .await
            .unwrap();
        assert_eq!(proposal.original, "Mug");
        assert_eq!(proposal.rewritten, "Blue Ceramic Mug");
        assert!(!proposal.applied);

        let stored = stores.drafts.get(&draft.id, &ctx.agent.scope()).unwrap().unwrap();
        assert_eq!(stored.name_en, "Mug");
    }

    fn rewrite_then_write(stored_value: &str) -> ScriptedBackend {
        ScriptedBackend::new()
            .script(
                "editing",
                vec![
                    ModelTurn::tool_call(
                        "c1",
                        "rewrite_text",
                        json!({"text": "Mug", "instruction": "more specific", "field": "name_en"}),
                    ),
                    ModelTurn::tool_call(
                        "c2",
                        "update_draft",
                        json!({"draft_id": "any", "field": "name_en", "value": stored_value, "merchant_id": "m1"}),
                    ),
                    ModelTurn::text("Done."),
                ],
            )
            .script(call_labels::REWRITE, vec![ModelTurn::text("Blue Ceramic Mug")])
    }

    #[tokio::test]
    async fn test_model_cannot_write_an_unaccepted_proposal() {
        let stores = Stores::new(Database::in_memory().unwrap());
        let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));
        let draft = stores
            .drafts
            .create(&ctx.agent.scope(), sample_draft("Mug", &["a.jpg"]))
            .unwrap();
        let agent = EditingAgent::new(
            Arc::new(rewrite_then_write("Blue Ceramic Mug")),
            stores.drafts.clone(),
        );

        let proposal = agent
            .propose(&draft, DraftField::NameEn, "more specific", false, &ctx)
            .await
            .unwrap();
        assert!(!proposal.applied);
        let stored = stores.drafts.get(&draft.id, &ctx.agent.scope()).unwrap().unwrap();
        assert_eq!(stored.name_en, "Mug");
    }

    #[tokio::test]
    async fn test_apply_writes_the_rewrite() {
        let stores = Stores::new(Database::in_memory().unwrap());
        let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));
        let draft = stores
            .drafts
            .create(&ctx.agent.scope(), sample_draft("Mug", &["a.jpg"]))
            .unwrap();
        let agent = EditingAgent::new(Arc::new(rewrite_then_write("Something Else")), stores.drafts.clone());

        let proposal = agent
            .propose(&draft, DraftField::NameEn, "more specific", true, &ctx)
            .await
            .unwrap();
        assert!(proposal.applied);
        let stored = stores.drafts.get(&draft.id, &ctx.agent.scope()).unwrap().unwrap();
        assert_eq!(stored.name_en, "Blue Ceramic Mug");
    }

    #[tokio::test]
    async fn test_price_is_not_rewritable() {
        let stores = Stores::new(Database::in_memory().unwrap());
        let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));
        let draft = stores
            .drafts
            .create(&ctx.agent.scope(), sample_draft("Mug", &["a.jpg"]))
            .unwrap();
        let agent = EditingAgent::new(Arc::new(ScriptedBackend::new()), stores.drafts.clone());
        let err = agent
            .propose(&draft, DraftField::SuggestedPrice, "cheaper", false, &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("suggested_price"));
    }
}
