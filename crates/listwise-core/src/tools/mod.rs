//! Tools for Listwise agents
//!
//! Provides the tool contract, per-agent tool sets, and all built-in tools.

pub mod implementations;
pub mod registry;

pub use implementations::{ConfirmationReply, PendingConfirmation, PersistencePermit};
pub use registry::{parse_params, PauseTool, Tool, ToolContext, ToolResult, ToolSet, ToolSpec};
