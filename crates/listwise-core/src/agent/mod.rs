//! Agent system for Listwise
//!
//! ## Manager (the single entry point per turn)
//! - `ManagerOrchestrator` - Runs the manager loop and streams its steps
//! - `ManagerRequest` / `ChatMessage` - Client-held history plus the new message
//! - `ManagerServices` / `ManagerConfig` - Dependencies and budgets
//!
//! ## Core Components
//! - `AgentRuntime` - Bounded model + tools loop shared by every agent
//! - `StepEmitter` - Ordered step stream for one turn
//! - `StreamFrame` - Wire protocol of a streamed turn
//!
//! ## Sub-agents
//! - Vision, Product Intelligence, Editing, Image Edit
//! - Reached only through the manager's delegation tools

pub mod context;
pub mod delegation;
pub mod emitter;
pub mod loop_events;
pub mod manager;
pub mod runtime;
pub mod session;
pub mod subagent;

pub use emitter::StepEmitter;
pub use loop_events::{
    BulkProgressData, CompletedItem, ItemStatus, StepType, StepUpdate, StreamFrame,
    ToolInvocation, TurnResponse, UiCommand,
};
pub use manager::{
    ChatMessage, InlineImage, ManagerConfig, ManagerOrchestrator, ManagerRequest, ManagerServices,
};
pub use runtime::{AgentRunResult, AgentRuntime, RunFinish, RunObserver, StopCondition};
pub use session::{archive_in_background, ChatSession};
pub use subagent::{SubAgentKind, MANAGER_AGENT};
