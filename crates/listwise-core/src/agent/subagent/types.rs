//! Sub-agent identities, budgets, and model tiers

use serde::{Deserialize, Serialize};

use crate::ai::backend::ModelTier;

/// Agent label of the top-level orchestrator.
pub const MANAGER_AGENT: &str = "manager";

/// Labels of single-shot generation calls made from inside tools.
pub mod call_labels {
    pub const PRODUCT_COPY: &str = "product_copy";
    pub const CATEGORY: &str = "category";
    pub const REWRITE: &str = "rewrite";
}

/// The four specialised sub-agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentKind {
    Vision,
    ProductIntelligence,
    Editing,
    ImageEdit,
}

impl SubAgentKind {
    /// Agent label used for tracing and request routing
    pub fn name(self) -> &'static str {
        match self {
            SubAgentKind::Vision => "vision",
            SubAgentKind::ProductIntelligence => "product_intelligence",
            SubAgentKind::Editing => "editing",
            SubAgentKind::ImageEdit => "image_edit",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SubAgentKind::Vision => "Vision Agent",
            SubAgentKind::ProductIntelligence => "Product Intelligence Agent",
            SubAgentKind::Editing => "Editing Agent",
            SubAgentKind::ImageEdit => "Image Edit Agent",
        }
    }

    pub fn tier(self) -> ModelTier {
        match self {
            SubAgentKind::ProductIntelligence => ModelTier::Quality,
            SubAgentKind::Vision | SubAgentKind::Editing | SubAgentKind::ImageEdit => {
                ModelTier::Fast
            }
        }
    }

    /// Step budget for one run.
    pub fn max_steps(self) -> usize {
        match self {
            SubAgentKind::Vision => 2,
            SubAgentKind::ProductIntelligence => 4,
            SubAgentKind::Editing => 3,
            SubAgentKind::ImageEdit => 3,
        }
    }
}

impl std::fmt::Display for SubAgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
