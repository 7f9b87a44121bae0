//! Manager orchestrator - the single entry point for a user turn.
//!
//! A turn runs the manager's tool loop once. The manager never writes to the
//! catalog itself: persistence goes through `confirm_and_persist`, which only
//! works with a permit built from the client's approved confirmation reply.
//!
//! ```text
//!  request ──► planning ──► manager loop ──► synthesizing ──► complete ──► response
//!                              │
//!                              ├─ analyze_product_images ──► Vision agent
//!                              ├─ generate_product_listings ──► Product Intelligence × N
//!                              ├─ suggest_draft_edit ──► Editing agent
//!                              ├─ edit_draft_image ──► Image Edit agent
//!                              └─ request_confirmation (pause)
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::context::{manager_instructions, response_locale};
use super::delegation::{
    AnalyzeProductImagesTool, EditDraftImageTool, GenerateProductListingsTool,
    SuggestDraftEditTool,
};
use super::emitter::StepEmitter;
use super::loop_events::{StepUpdate, StreamFrame, ToolInvocation, TurnResponse};
use super::runtime::{AgentRuntime, RunFinish, RunObserver, StopCondition};
use super::subagent::MANAGER_AGENT;
use crate::ai::anthropic::AnthropicBackend;
use crate::ai::backend::{ModelBackend, ModelTier};
use crate::ai::types::{AiToolCall, Content, ImageContent, ModelMessage, Role};
use crate::config::{AgentSettings, Settings, DEFAULT_BULK_CONCURRENCY, DEFAULT_MANAGER_MAX_STEPS};
use crate::error::AgentError;
use crate::services::grouping::{FilenameGrouper, HttpImageGrouper, ImageGrouper};
use crate::services::pricing::{CatalogPricing, PricingOracle};
use crate::storage::{Database, Stores};
use crate::tools::implementations::{
    request_confirmation_tool, CommandSink, ConfirmAndPersistTool, ConfirmationReply,
    DiscardDraftsTool, EmitUiCommandTool, ListDraftsTool, PendingConfirmation, PersistencePermit,
    UpdateDraftTool, REQUEST_CONFIRMATION,
};
use crate::tools::registry::{ToolContext, ToolResult, ToolSet};
use crate::types::{AgentContext, Locale};

/// Shared services the manager and its sub-agents need.
#[derive(Clone)]
pub struct ManagerServices {
    pub model: Arc<dyn ModelBackend>,
    pub stores: Stores,
    pub grouper: Arc<dyn ImageGrouper>,
    pub pricing: Arc<dyn PricingOracle>,
}

impl ManagerServices {
    /// Production wiring: Anthropic backend, HTTP grouping when configured,
    /// catalog-average pricing.
    pub fn from_settings(settings: &Settings, db: Database) -> Result<Self> {
        let model: Arc<dyn ModelBackend> = Arc::new(AnthropicBackend::new(&settings.model)?);
        let grouper: Arc<dyn ImageGrouper> = match &settings.services.grouping_url {
            Some(url) => Arc::new(HttpImageGrouper::new(url.clone())?),
            None => {
                tracing::info!("No grouping service configured, grouping by filename");
                Arc::new(FilenameGrouper)
            }
        };
        Ok(Self::with_model(model, db, grouper))
    }

    /// Wire around a given model backend.
    pub fn with_model(model: Arc<dyn ModelBackend>, db: Database, grouper: Arc<dyn ImageGrouper>) -> Self {
        let stores = Stores::new(db);
        let pricing = Arc::new(CatalogPricing::new(stores.catalog.clone()));
        Self {
            model,
            stores,
            grouper,
            pricing,
        }
    }
}

/// Configuration for the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub max_steps: usize,
    /// Width of the listing generation fan-out.
    pub bulk_concurrency: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MANAGER_MAX_STEPS,
            bulk_concurrency: DEFAULT_BULK_CONCURRENCY,
        }
    }
}

impl From<&AgentSettings> for ManagerConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_steps: settings.manager_max_steps.max(1),
            bulk_concurrency: settings.bulk_concurrency.max(1),
        }
    }
}

/// One message of the client-held conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Tool calls the manager made while producing this assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_invocations: Vec<ToolInvocation>,
    /// The confirmation this assistant message ended waiting on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<PendingConfirmation>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_invocations: Vec::new(),
            confirmation: None,
        }
    }

    pub fn assistant(response: &TurnResponse) -> Self {
        Self {
            role: Role::Assistant,
            content: response.content.clone(),
            tool_invocations: response.tool_invocations.clone(),
            confirmation: response.confirmation.clone(),
        }
    }
}

/// An image sent inline with the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub media_type: String,
    /// Base64 data without the `data:` prefix.
    pub data: String,
}

/// Everything one turn needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerRequest {
    #[serde(alias = "messages")]
    pub history: Vec<ChatMessage>,
    pub context: AgentContext,
    #[serde(default)]
    pub images: Vec<InlineImage>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub confirmation: Option<ConfirmationReply>,
}

impl ManagerRequest {
    pub fn new(context: AgentContext, history: Vec<ChatMessage>) -> Self {
        Self {
            history,
            context,
            images: Vec::new(),
            image_urls: Vec::new(),
            confirmation: None,
        }
    }

    pub fn with_image_urls(mut self, urls: Vec<String>) -> Self {
        self.image_urls = urls;
        self
    }

    pub fn with_confirmation(mut self, reply: ConfirmationReply) -> Self {
        self.confirmation = Some(reply);
        self
    }

    /// Text of the message this turn answers.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.history
            .last()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// The confirmation the previous assistant message asked for, if it is
    /// still open.
    pub fn pending_confirmation(&self) -> Option<&PendingConfirmation> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| m.confirmation.as_ref())
    }

    /// Permit for this turn: only an approved reply to the open confirmation.
    fn permit(&self) -> Option<PersistencePermit> {
        let reply = self.confirmation.as_ref()?;
        let Some(pending) = self.pending_confirmation() else {
            tracing::warn!(
                confirmation_id = %reply.confirmation_id,
                "Confirmation reply without an open confirmation"
            );
            return None;
        };
        let permit = PersistencePermit::from_reply(reply, pending);
        if reply.approved && permit.is_none() {
            tracing::warn!(
                confirmation_id = %reply.confirmation_id,
                pending_id = %pending.confirmation_id,
                "Confirmation reply does not match the open confirmation"
            );
        }
        permit
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.context.merchant_id.trim().is_empty() || self.context.store_id.trim().is_empty() {
            return Err("context.merchantId and context.storeId are required".into());
        }
        if self.latest_user_text().is_none() {
            return Err("the last message must be from the user".into());
        }
        Ok(())
    }
}

/// Streams manager tool calls as executing steps.
struct StepObserver {
    emitter: StepEmitter,
    step: AtomicUsize,
    max_steps: AtomicUsize,
}

impl RunObserver for StepObserver {
    fn on_step_start(&self, _agent: &str, step: usize, max_steps: usize) {
        self.step.store(step, Ordering::Relaxed);
        self.max_steps.store(max_steps, Ordering::Relaxed);
    }

    fn on_tool_start(&self, agent: &str, call: &AiToolCall) {
        self.emitter.emit(
            StepUpdate::executing(describe_tool(&call.name))
                .with_step(
                    self.step.load(Ordering::Relaxed),
                    self.max_steps.load(Ordering::Relaxed),
                )
                .with_agent(agent)
                .with_action(call.name.clone()),
        );
    }

    fn on_tool_finish(&self, _agent: &str, call: &AiToolCall, result: &ToolResult) {
        if result.is_error {
            tracing::debug!(tool = %call.name, code = ?result.error_code(), "Manager tool failed");
        }
    }
}

fn describe_tool(name: &str) -> String {
    match name {
        "analyze_product_images" => "Analyzing product images".to_string(),
        "generate_product_listings" => "Generating product listings".to_string(),
        "suggest_draft_edit" => "Drafting an edit".to_string(),
        "edit_draft_image" => "Editing product photos".to_string(),
        "list_drafts" => "Looking up drafts".to_string(),
        "update_draft" => "Updating a draft".to_string(),
        "discard_drafts" => "Discarding drafts".to_string(),
        "confirm_and_persist" => "Saving products to the store".to_string(),
        "emit_ui_command" => "Updating the screen".to_string(),
        other => format!("Running {}", other),
    }
}

pub struct ManagerOrchestrator {
    services: ManagerServices,
    config: ManagerConfig,
}

impl ManagerOrchestrator {
    pub fn new(services: ManagerServices, config: ManagerConfig) -> Self {
        Self { services, config }
    }

    pub fn services(&self) -> &ManagerServices {
        &self.services
    }

    /// Run one turn on the tokio runtime.
    ///
    /// Frames arrive in production order: steps, then either one response
    /// followed by `done`, or a single error frame.
    pub fn stream_turn(self: &Arc<Self>, request: ManagerRequest) -> mpsc::UnboundedReceiver<StreamFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            let emitter = StepEmitter::new(tx.clone());
            match orchestrator.run_turn(request, &emitter).await {
                Ok(response) => {
                    let _ = tx.send(StreamFrame::Response(response));
                    let _ = tx.send(StreamFrame::Done);
                }
                Err(e) => {
                    tracing::error!(error = %e, kind = e.kind(), "Turn failed");
                    let _ = tx.send(StreamFrame::Error {
                        error: e.kind().to_string(),
                        details: Some(e.to_string()),
                        retryable: e.is_retryable(),
                    });
                }
            }
        });

        rx
    }

    /// Run one turn, reporting steps through `emitter`.
    pub async fn run_turn(
        &self,
        request: ManagerRequest,
        emitter: &StepEmitter,
    ) -> Result<TurnResponse, AgentError> {
        request.validate().map_err(AgentError::InvalidRequest)?;
        let span = tracing::info_span!(
            "turn",
            merchant_id = %request.context.merchant_id,
            store_id = %request.context.store_id,
        );
        self.run_validated(request, emitter).instrument(span).await
    }

    async fn run_validated(
        &self,
        request: ManagerRequest,
        emitter: &StepEmitter,
    ) -> Result<TurnResponse, AgentError> {
        let latest = request.latest_user_text().unwrap_or_default().to_string();
        let locale = response_locale(&request.context, &latest);

        emitter.emit(StepUpdate::planning(planning_message(locale)).with_agent(MANAGER_AGENT));

        let permit = request.permit();
        if let Some(reply) = &request.confirmation {
            tracing::info!(
                confirmation_id = %reply.confirmation_id,
                approved = reply.approved,
                drafts = reply.draft_ids.len(),
                permitted = permit.is_some(),
                "Turn carries a confirmation reply"
            );
        }

        let messages = build_transcript(&request, permit.as_ref());
        let sink = CommandSink::new();
        let tools = self.manager_tools(&request, permit, sink.clone());
        let runtime = AgentRuntime::new(
            MANAGER_AGENT,
            self.services.model.clone(),
            ModelTier::Quality,
            manager_instructions(&request.context, locale),
            tools,
            StopCondition::max_steps(self.config.max_steps),
        );

        let ctx = ToolContext::new(Arc::new(request.context.clone())).with_progress(emitter.clone());
        let observer = StepObserver {
            emitter: emitter.clone(),
            step: AtomicUsize::new(0),
            max_steps: AtomicUsize::new(self.config.max_steps),
        };
        let run = runtime.run_observed(messages, &ctx, &observer).await?;

        emitter.emit(StepUpdate::synthesizing(synthesizing_message(locale)).with_agent(MANAGER_AGENT));

        let confirmation = run
            .paused
            .as_ref()
            .filter(|p| p.tool_name == REQUEST_CONFIRMATION)
            .map(|p| PendingConfirmation::from_pause(&p.call_id, &p.arguments));

        let mut content = run.text.clone();
        if content.is_empty() {
            content = match (&confirmation, run.finish) {
                (Some(c), _) => c.summary.clone(),
                (None, RunFinish::StepBudgetExhausted) => budget_message(locale).to_string(),
                _ => String::new(),
            };
        }

        let tool_invocations = run
            .tool_results
            .iter()
            .map(|o| ToolInvocation {
                tool_call_id: o.call_id.clone(),
                tool_name: o.tool_name.clone(),
                args: o.arguments.clone(),
                result: o.result.json(),
                is_error: o.result.is_error,
            })
            .collect();

        emitter.emit(StepUpdate::complete(complete_message(locale)).with_agent(MANAGER_AGENT));
        tracing::info!(
            steps = run.steps.len(),
            tools = run.tool_results.len(),
            finish = ?run.finish,
            paused = confirmation.is_some(),
            "Turn complete"
        );

        Ok(TurnResponse {
            content,
            tool_invocations,
            steps: emitter.steps(),
            commands: sink.take(),
            confirmation,
        })
    }

    fn manager_tools(
        &self,
        request: &ManagerRequest,
        permit: Option<PersistencePermit>,
        sink: CommandSink,
    ) -> ToolSet {
        let services = &self.services;
        ToolSet::new()
            .with_tool(Arc::new(AnalyzeProductImagesTool::new(
                services.clone(),
                request.image_urls.clone(),
            )))
            .with_tool(Arc::new(GenerateProductListingsTool::new(
                services.clone(),
                self.config.bulk_concurrency,
            )))
            .with_tool(Arc::new(SuggestDraftEditTool::new(services.clone())))
            .with_tool(Arc::new(EditDraftImageTool::new(services.clone())))
            .with_tool(Arc::new(ListDraftsTool::new(services.stores.drafts.clone())))
            .with_tool(Arc::new(UpdateDraftTool::new(services.stores.drafts.clone())))
            .with_tool(Arc::new(DiscardDraftsTool::new(services.stores.drafts.clone())))
            .with_tool(Arc::new(ConfirmAndPersistTool::new(
                services.stores.catalog.clone(),
                permit,
            )))
            .with_tool(Arc::new(EmitUiCommandTool::new(sink)))
            .with_pause(request_confirmation_tool())
    }
}

/// Model transcript for the turn: replayed history with earlier tool calls,
/// then the new user message with its images and any confirmation note.
fn build_transcript(request: &ManagerRequest, permit: Option<&PersistencePermit>) -> Vec<ModelMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    let last = request.history.len().saturating_sub(1);

    for (index, message) in request.history.iter().enumerate() {
        match message.role {
            Role::Assistant => {
                if !message.tool_invocations.is_empty() {
                    messages.push(ModelMessage {
                        role: Role::Assistant,
                        content: message
                            .tool_invocations
                            .iter()
                            .map(|t| Content::ToolUse {
                                id: t.tool_call_id.clone(),
                                name: t.tool_name.clone(),
                                input: t.args.clone(),
                            })
                            .collect(),
                    });
                    messages.push(ModelMessage {
                        role: Role::User,
                        content: message
                            .tool_invocations
                            .iter()
                            .map(|t| Content::ToolResult {
                                tool_use_id: t.tool_call_id.clone(),
                                output: Value::String(t.result.to_string()),
                                is_error: t.is_error.then_some(true),
                            })
                            .collect(),
                    });
                }
                if !message.content.trim().is_empty() {
                    messages.push(ModelMessage::assistant_text(message.content.clone()));
                }
            }
            Role::User if index == last => {
                let mut content = vec![Content::Text {
                    text: message.content.clone(),
                }];
                if let Some(note) = confirmation_note(request.confirmation.as_ref(), permit) {
                    content.push(Content::Text { text: note });
                }
                if !request.image_urls.is_empty() {
                    content.push(Content::Text {
                        text: format!(
                            "[uploaded images ({}): {}]",
                            request.image_urls.len(),
                            request.image_urls.join(", ")
                        ),
                    });
                }
                for image in &request.images {
                    content.push(Content::Image {
                        image: ImageContent {
                            url: None,
                            base64: Some(image.data.clone()),
                            media_type: Some(image.media_type.clone()),
                        },
                    });
                }
                messages.push(ModelMessage {
                    role: Role::User,
                    content,
                });
            }
            Role::User => messages.push(ModelMessage::user_text(message.content.clone())),
        }
    }
    messages
}

fn confirmation_note(reply: Option<&ConfirmationReply>, permit: Option<&PersistencePermit>) -> Option<String> {
    let reply = reply?;
    Some(match permit {
        Some(permit) => {
            let ids: Vec<&str> = permit.draft_ids().collect();
            format!(
                "[confirmation {}: approved for {} draft(s): {}]",
                reply.confirmation_id,
                ids.len(),
                ids.join(", ")
            )
        }
        None if reply.approved => format!(
            "[confirmation {}: not recognized, nothing is approved]",
            reply.confirmation_id
        ),
        None => format!("[confirmation {}: declined]", reply.confirmation_id),
    })
}

fn planning_message(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Reading your request",
        Locale::Ar => "جارٍ قراءة طلبك",
    }
}

fn synthesizing_message(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Preparing the reply",
        Locale::Ar => "جارٍ تجهيز الرد",
    }
}

fn complete_message(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Done",
        Locale::Ar => "تم",
    }
}

fn budget_message(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "I ran out of steps for this request. Tell me what to continue with.",
        Locale::Ar => "استنفدت الخطوات المتاحة لهذا الطلب. أخبرني بما تريد أن أتابع به.",
    }
}
