//! Model provider layer
//!
//! Agents talk to a `ModelBackend`; the provider client and the scripted
//! backend used for tests and offline runs both implement it.

pub mod anthropic;
pub mod backend;
pub mod json;
pub mod retry;
pub mod scripted;
pub mod types;

pub use anthropic::AnthropicBackend;
pub use backend::{complete_text, GenerateRequest, ModelBackend, ModelTier, ModelTurn};
pub use scripted::ScriptedBackend;
