//! Vision agent: partitions uploaded images into per-product groups.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use super::types::SubAgentKind;
use super::brief;
use crate::agent::runtime::{AgentRuntime, StopCondition};
use crate::ai::backend::ModelBackend;
use crate::error::AgentError;
use crate::services::grouping::{normalize_groups, ImageGrouper};
use crate::tools::implementations::GroupImagesTool;
use crate::tools::registry::{Tool, ToolContext, ToolSet};
use crate::types::ImageGroup;

const INSTRUCTIONS: &str = "\
You sort product photos for an online store. Call group_images once with every image URL you \
were given. Each group must show exactly one product. If you are unsure whether two photos show \
the same product, keep them in separate groups; merging two products is worse than splitting \
one. After the tool returns, reply with one short sentence describing the groups.";

#[derive(Debug, Clone, Serialize)]
pub struct VisionOutcome {
    pub groups: Vec<ImageGroup>,
    pub warnings: Vec<String>,
    /// The model's own summary, empty when grouping ran without it.
    pub summary: String,
    /// Grouping ran directly because the agent did not produce groups.
    pub direct: bool,
}

pub struct VisionAgent {
    runtime: AgentRuntime,
    group_tool: Arc<GroupImagesTool>,
}

impl VisionAgent {
    pub fn new(model: Arc<dyn ModelBackend>, grouper: Arc<dyn ImageGrouper>) -> Self {
        let kind = SubAgentKind::Vision;
        let group_tool = Arc::new(GroupImagesTool::new(grouper));
        let tools = ToolSet::new().with_tool(group_tool.clone());
        Self {
            runtime: AgentRuntime::new(
                kind.name(),
                model,
                kind.tier(),
                INSTRUCTIONS,
                tools,
                StopCondition::max_steps(kind.max_steps()),
            ),
            group_tool,
        }
    }

    pub async fn analyze(
        &self,
        image_urls: &[String],
        ctx: &ToolContext,
    ) -> Result<VisionOutcome, AgentError> {
        let image_urls: Vec<String> = image_urls
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        let payload = json!({ "image_urls": image_urls });
        let messages = brief("Group these product images.", &payload);

        let (from_agent, summary) = match self.runtime.run(messages, ctx).await {
            Ok(run) => {
                let result = run
                    .results_for(self.group_tool.name())
                    .find(|o| !o.result.is_error)
                    .map(|o| o.result.clone());
                (result, run.text)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Vision agent failed, grouping directly");
                (None, String::new())
            }
        };

        let direct = from_agent.is_none();
        let result = match from_agent {
            Some(result) => result,
            None => self.group_tool.execute(payload, ctx).await,
        };
        let Some(data) = result.data() else {
            return Err(AgentError::Delegation(format!("grouping failed: {}", result.output)));
        };
        let warnings: Vec<String> = result
            .json()
            .get("warnings")
            .and_then(|w| serde_json::from_value(w.clone()).ok())
            .unwrap_or_default();

        let raw: Vec<ImageGroup> = serde_json::from_value(data["groups"].clone())
            .map_err(|e| AgentError::Delegation(format!("malformed grouping result: {}", e)))?;
        // The model chooses which URLs reach the tool; coverage is checked
        // against what the agent was given.
        let grouped: usize = raw.iter().map(|g| g.image_urls.len()).sum();
        let groups = normalize_groups(&image_urls, raw);
        let covered: usize = groups.iter().map(|g| g.image_urls.len()).sum();
        if grouped != covered {
            tracing::warn!(grouped, covered, "Vision agent grouped a different image set");
        }
        tracing::info!(groups = groups.len(), direct, "Vision analysis done");

        Ok(VisionOutcome {
            groups,
            warnings,
            summary,
            direct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::backend::ModelTurn;
    use crate::ai::scripted::ScriptedBackend;
    use crate::services::grouping::FilenameGrouper;
    use crate::types::AgentContext;

    fn urls() -> Vec<String> {
        ["mug_1.jpg", "mug_2.jpg", "lamp.jpg"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(AgentContext::new("m1", "s1")))
    }

    #[tokio::test]
    async fn test_agent_groups_through_tool() {
        let backend = ScriptedBackend::new().script(
            "vision",
            vec![
                ModelTurn::tool_call("c1", "group_images", json!({"image_urls": urls()})),
                ModelTurn::text("Two products."),
            ],
        );
        let agent = VisionAgent::new(Arc::new(backend), Arc::new(FilenameGrouper));
        let outcome = agent.analyze(&urls(), &ctx()).await.unwrap();
        assert_eq!(outcome.groups.len(), 2);
        assert_eq!(outcome.summary, "Two products.");
        assert!(!outcome.direct);
    }

    #[tokio::test]
    async fn test_coverage_holds_when_model_passes_wrong_urls() {
        let backend = ScriptedBackend::new().script(
            "vision",
            vec![
                ModelTurn::tool_call(
                    "c1",
                    "group_images",
                    json!({"image_urls": ["mug_1.jpg", "ghost.jpg"]}),
                ),
                ModelTurn::text("Two products."),
            ],
        );
        let agent = VisionAgent::new(Arc::new(backend), Arc::new(FilenameGrouper));
        let outcome = agent.analyze(&urls(), &ctx()).await.unwrap();

        let mut covered: Vec<String> = outcome
            .groups
            .iter()
            .flat_map(|g| g.image_urls.clone())
            .collect();
        covered.sort();
        let mut expected = urls();
        expected.sort();
        assert_eq!(covered, expected);
        for group in &outcome.groups {
            assert!(group.image_urls.contains(&group.primary_image_url));
        }
    }

    #[tokio::test]
    async fn test_model_failure_groups_directly() {
        let agent = VisionAgent::new(Arc::new(ScriptedBackend::new()), Arc::new(FilenameGrouper));
        let outcome = agent.analyze(&urls(), &ctx()).await.unwrap();
        assert!(outcome.direct);
        let covered: usize = outcome.groups.iter().map(|g| g.image_urls.len()).sum();
        assert_eq!(covered, 3);
    }
}
