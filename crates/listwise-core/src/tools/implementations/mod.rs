//! Tool implementations
//!
//! Sub-agent tools:
//! - group_images: cluster images into products (Vision)
//! - generate_product_details: write one bilingual draft per group (Product Intelligence)
//! - suggest_categories: pick a taxonomy label (Product Intelligence)
//! - rewrite_text: propose a rewrite, never writes (Editing)
//! - update_draft: the only field mutation (Editing, Manager)
//! - crop_image / remove_background / enhance_image / replace_image (Image Edit)
//!
//! Manager tools:
//! - list_drafts, discard_drafts, confirm_and_persist, emit_ui_command
//! - request_confirmation: pause tool, handled by the caller of the run

pub mod categories;
pub mod confirmation;
pub mod drafts;
pub mod grouping;
pub mod image_ops;
pub mod persistence;
pub mod product_details;
pub mod rewrite;
pub mod ui_command;

pub use categories::SuggestCategoriesTool;
pub use confirmation::{
    request_confirmation_tool, ConfirmationReply, PendingConfirmation, PersistencePermit,
    REQUEST_CONFIRMATION,
};
pub use drafts::{ListDraftsTool, UpdateDraftTool};
pub use grouping::GroupImagesTool;
pub use image_ops::{ImageOperation, ImageOpTool};
pub use persistence::{ConfirmAndPersistTool, DiscardDraftsTool};
pub use product_details::GenerateProductDetailsTool;
pub use rewrite::RewriteTextTool;
pub use ui_command::{CommandSink, EmitUiCommandTool};

use crate::types::OwnershipScope;

use super::registry::{ToolContext, ToolResult};

/// Resolve the write scope for a call. Ids the model passes must match the
/// request context; the context always wins.
pub(crate) fn require_scope(
    ctx: &ToolContext,
    merchant_id: Option<&str>,
    store_id: Option<&str>,
) -> Result<OwnershipScope, ToolResult> {
    let scope = ctx.agent.scope();
    if let Some(merchant_id) = merchant_id {
        if merchant_id != scope.merchant_id {
            tracing::warn!(
                requested = %merchant_id,
                "Rejected tool call for a different merchant"
            );
            return Err(ToolResult::error_with_code(
                "ownership_denied",
                "merchant_id does not match the current merchant",
            ));
        }
    }
    if let Some(store_id) = store_id {
        if store_id != scope.store_id {
            tracing::warn!(requested = %store_id, "Rejected tool call for a different store");
            return Err(ToolResult::error_with_code(
                "ownership_denied",
                "store_id does not match the current store",
            ));
        }
    }
    Ok(scope)
}

/// Storage failures become tool errors the model can see.
pub(crate) fn storage_error(e: anyhow::Error) -> ToolResult {
    tracing::error!(error = %e, "Storage error in tool");
    ToolResult::error_with_code("tool_error", format!("Storage error: {}", e))
}
