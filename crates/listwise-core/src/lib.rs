//! Listwise core library
//!
//! Turns uploaded product images plus free-form chat into bilingual product
//! drafts, and only moves drafts into the production catalog after a human
//! confirms them.
//!
//! - `agent` - bounded tool loop, manager orchestrator, sub-agents, step protocol
//! - `ai` - model backend abstraction and provider client
//! - `tools` - tool contract and the tool implementations agents call
//! - `services` - external collaborators (image grouping, pricing)
//! - `storage` - SQLite draft store, catalog, asset ledger, conversation archive

pub mod agent;
pub mod ai;
pub mod config;
pub mod error;
pub mod paths;
pub mod services;
pub mod storage;
pub mod tools;
pub mod types;

pub use agent::{ManagerOrchestrator, ManagerRequest, ManagerServices};
pub use config::Settings;
pub use error::{AgentError, ModelError};
pub use storage::Database;
