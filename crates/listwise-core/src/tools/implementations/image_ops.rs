//! Image edit tools: crop_image, remove_background, enhance_image, replace_image
//!
//! Originals are never modified or deleted. Every operation that succeeds is
//! appended to the generated assets ledger under the draft's id.
//!
//! Crop, background removal, and enhancement have no image backend yet: they
//! succeed with the input URL unchanged and `metadata.applied = false`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::storage_error;
use crate::storage::{AssetLedger, DraftStore};
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOperation {
    Crop,
    RemoveBackground,
    Enhance,
    Replace,
}

impl ImageOperation {
    pub const ALL: [ImageOperation; 4] = [
        ImageOperation::Crop,
        ImageOperation::RemoveBackground,
        ImageOperation::Enhance,
        ImageOperation::Replace,
    ];

    pub fn tool_name(self) -> &'static str {
        match self {
            ImageOperation::Crop => "crop_image",
            ImageOperation::RemoveBackground => "remove_background",
            ImageOperation::Enhance => "enhance_image",
            ImageOperation::Replace => "replace_image",
        }
    }

    /// Operation name recorded in the asset ledger.
    pub fn ledger_name(self) -> &'static str {
        match self {
            ImageOperation::Crop => "crop",
            ImageOperation::RemoveBackground => "remove_background",
            ImageOperation::Enhance => "enhance",
            ImageOperation::Replace => "replace_primary",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ImageOperation::Crop => "Crop one of a draft's images to a region.",
            ImageOperation::RemoveBackground => "Remove the background from one of a draft's images.",
            ImageOperation::Enhance => "Improve lighting and sharpness of one of a draft's images.",
            ImageOperation::Replace => {
                "Make another of the draft's existing images its primary image. The new primary \
                 must already belong to the draft."
            }
        }
    }
}

pub struct ImageOpTool {
    operation: ImageOperation,
    drafts: DraftStore,
    assets: AssetLedger,
}

impl ImageOpTool {
    pub fn new(operation: ImageOperation, drafts: DraftStore, assets: AssetLedger) -> Self {
        Self {
            operation,
            drafts,
            assets,
        }
    }
}

#[derive(Deserialize)]
struct Params {
    draft_id: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    new_primary_url: Option<String>,
    #[serde(default)]
    region: Option<CropRegion>,
}

#[derive(Debug, Deserialize, Serialize)]
struct CropRegion {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[async_trait]
impl Tool for ImageOpTool {
    fn name(&self) -> &str {
        self.operation.tool_name()
    }

    fn description(&self) -> &str {
        self.operation.description()
    }

    fn parameters_schema(&self) -> Value {
        match self.operation {
            ImageOperation::Replace => json!({
                "type": "object",
                "properties": {
                    "draft_id": {"type": "string"},
                    "new_primary_url": {"type": "string", "description": "One of the draft's image URLs"}
                },
                "required": ["draft_id", "new_primary_url"]
            }),
            ImageOperation::Crop => json!({
                "type": "object",
                "properties": {
                    "draft_id": {"type": "string"},
                    "image_url": {"type": "string", "description": "Defaults to the primary image"},
                    "region": {
                        "type": "object",
                        "description": "Fractions of the image size, 0 to 1",
                        "properties": {
                            "x": {"type": "number"},
                            "y": {"type": "number"},
                            "width": {"type": "number"},
                            "height": {"type": "number"}
                        },
                        "required": ["x", "y", "width", "height"]
                    }
                },
                "required": ["draft_id"]
            }),
            ImageOperation::RemoveBackground | ImageOperation::Enhance => json!({
                "type": "object",
                "properties": {
                    "draft_id": {"type": "string"},
                    "image_url": {"type": "string", "description": "Defaults to the primary image"}
                },
                "required": ["draft_id"]
            }),
        }
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: Params = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let scope = ctx.agent.scope();
        let draft = match self.drafts.get(&params.draft_id, &scope) {
            Ok(Some(d)) if !d.status.is_terminal() => d,
            Ok(_) => {
                return ToolResult::error_with_code(
                    "not_found_or_locked",
                    format!("Draft {} was not found for this store or is no longer editable", params.draft_id),
                )
            }
            Err(e) => return storage_error(e),
        };

        let (original_url, edited_url, message, metadata) = match self.operation {
            ImageOperation::Replace => {
                let Some(new_primary) = params.new_primary_url.map(|u| u.trim().to_string()) else {
                    return ToolResult::invalid_parameters("new_primary_url is required");
                };
                if !draft.image_urls.contains(&new_primary) {
                    tracing::warn!(draft_id = %draft.id, url = %new_primary, "Rejected primary image outside the draft");
                    return ToolResult::invalid_parameters(format!(
                        "{} is not one of this draft's images",
                        new_primary
                    ));
                }
                match self.drafts.set_primary_image(&draft.id, &scope, &new_primary) {
                    Ok(true) => {}
                    Ok(false) => {
                        return ToolResult::error_with_code(
                            "not_found_or_locked",
                            "Draft is no longer editable",
                        )
                    }
                    Err(e) => return storage_error(e),
                }
                (
                    draft.primary_image_url.clone(),
                    new_primary,
                    "Primary image replaced".to_string(),
                    json!({"applied": true}),
                )
            }
            op => {
                let url = params
                    .image_url
                    .map(|u| u.trim().to_string())
                    .unwrap_or_else(|| draft.primary_image_url.clone());
                if !draft.image_urls.contains(&url) {
                    return ToolResult::invalid_parameters(format!(
                        "{} is not one of this draft's images",
                        url
                    ));
                }
                let mut metadata = json!({"applied": false});
                if let (ImageOperation::Crop, Some(region)) = (op, params.region.as_ref()) {
                    metadata["region"] = json!(region);
                }
                (
                    url.clone(),
                    url,
                    format!("{} is not available yet; the image is unchanged", op.ledger_name()),
                    metadata,
                )
            }
        };

        if let Err(e) = self.assets.append(
            &scope.merchant_id,
            &draft.id,
            Some(&draft.id),
            self.operation.ledger_name(),
            &original_url,
            &edited_url,
            &metadata,
        ) {
            return storage_error(e);
        }
        tracing::info!(
            draft_id = %draft.id,
            operation = self.operation.ledger_name(),
            "Image operation recorded"
        );

        ToolResult::success_data(json!({
            "success": true,
            "original_url": original_url,
            "edited_url": edited_url,
            "message": message,
            "metadata": metadata,
        }))
    }
}
