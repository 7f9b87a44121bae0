//! group_images - cluster uploaded images into products

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::services::grouping::{normalize_groups, ImageGrouper};
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};

pub struct GroupImagesTool {
    grouper: Arc<dyn ImageGrouper>,
}

impl GroupImagesTool {
    pub fn new(grouper: Arc<dyn ImageGrouper>) -> Self {
        Self { grouper }
    }
}

#[derive(Deserialize)]
struct Params {
    image_urls: Vec<String>,
}

#[async_trait]
impl Tool for GroupImagesTool {
    fn name(&self) -> &str {
        "group_images"
    }

    fn description(&self) -> &str {
        "Group product images so each group shows exactly one product. Every image ends up in \
         exactly one group. When unsure whether two images show the same product, keep them apart."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "image_urls": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "All image URLs to group"
                }
            },
            "required": ["image_urls"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: Params = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let urls: Vec<String> = params
            .image_urls
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if urls.is_empty() {
            return ToolResult::invalid_parameters("image_urls must contain at least one URL");
        }

        let mut warnings = Vec::new();
        let raw = match self.grouper.group(&urls, ctx.agent.locale).await {
            Ok(groups) => groups,
            Err(e) => {
                // Singletons never merge two products by mistake
                tracing::warn!(error = %e, images = urls.len(), "Grouping service failed, using singletons");
                warnings.push(format!("Grouping service unavailable ({}); each image is its own group", e));
                Vec::new()
            }
        };
        let groups = normalize_groups(&urls, raw);
        let image_count: usize = groups.iter().map(|g| g.image_urls.len()).sum();

        tracing::info!(images = image_count, groups = groups.len(), "Grouped images");
        ToolResult::success_data_with(
            json!({
                "groups": groups,
                "group_count": groups.len(),
                "image_count": image_count,
            }),
            warnings,
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::grouping::FilenameGrouper;
    use crate::types::{AgentContext, ImageGroup, Locale};

    struct BrokenGrouper;

    #[async_trait]
    impl ImageGrouper for BrokenGrouper {
        async fn group(&self, _urls: &[String], _locale: Locale) -> anyhow::Result<Vec<ImageGroup>> {
            anyhow::bail!("connection refused")
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(AgentContext::new("m1", "s1")))
    }

    #[tokio::test]
    async fn test_groups_cover_all_inputs() {
        let tool = GroupImagesTool::new(Arc::new(FilenameGrouper));
        let result = tool
            .execute(json!({"image_urls": ["mug_1.jpg", "mug_2.jpg", "lamp.jpg", "mug_1.jpg"]}), &ctx())
            .await;
        let data = result.data().unwrap();
        assert_eq!(data["group_count"], 2);
        assert_eq!(data["image_count"], 3);
    }

    #[tokio::test]
    async fn test_service_failure_falls_back_to_singletons() {
        let tool = GroupImagesTool::new(Arc::new(BrokenGrouper));
        let result = tool
            .execute(json!({"image_urls": ["a.jpg", "b.jpg"]}), &ctx())
            .await;
        assert!(!result.is_error);
        let json = result.json();
        assert_eq!(json["data"]["group_count"], 2);
        assert!(json["warnings"][0].as_str().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let tool = GroupImagesTool::new(Arc::new(FilenameGrouper));
        let result = tool.execute(json!({"image_urls": [" "]}), &ctx()).await;
        assert_eq!(result.error_code().as_deref(), Some("invalid_parameters"));
    }
}
