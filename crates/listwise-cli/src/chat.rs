//! `listwise chat` - terminal REPL over the manager
//!
//! The session keeps the history locally, like the web client does, and
//! sends it whole with every turn.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use listwise_core::agent::{
    ChatSession, ManagerConfig, ManagerOrchestrator, ManagerServices, StreamFrame, TurnResponse,
};
use listwise_core::services::FilenameGrouper;
use listwise_core::storage::Database;
use listwise_core::tools::PendingConfirmation;
use listwise_core::types::{AgentContext, Locale, StoreType};
use listwise_core::{ManagerRequest, Settings};

use crate::offline;

pub struct ChatOptions {
    pub merchant: String,
    pub store: String,
    pub locale: Locale,
    pub store_type: StoreType,
    pub images: Vec<String>,
    pub offline: bool,
}

const HELP: &str = "\
  /image <url>   attach a photo to your next message
  /yes, /no      answer a pending confirmation
  /drafts        show this session's drafts
  /reset         start over (the old chat is archived)
  /quit          exit";

pub async fn run(settings: &Settings, options: ChatOptions) -> Result<()> {
    let services = if options.offline {
        ManagerServices::with_model(
            Arc::new(offline::backend()),
            Database::in_memory()?,
            Arc::new(FilenameGrouper),
        )
    } else {
        ManagerServices::from_settings(settings, Database::new(&settings.database_path)?)?
    };
    let stores = services.stores.clone();
    let orchestrator = Arc::new(ManagerOrchestrator::new(
        services,
        ManagerConfig::from(&settings.agents),
    ));

    let context = AgentContext::new(options.merchant, options.store)
        .with_locale(options.locale)
        .with_store_type(options.store_type);
    let mut session = ChatSession::new(context, stores.conversations.clone());
    let mut attachments = options.images;
    let mut pending: Option<PendingConfirmation> = None;

    println!("Listwise chat{}. Type /help for commands.", if options.offline { " (offline)" } else { "" });
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt(attachments.len());
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut confirmation = None;
        let message = match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => {
                println!("{}", HELP);
                continue;
            }
            ("/image", url) if !url.trim().is_empty() => {
                attachments.push(url.trim().to_string());
                continue;
            }
            ("/drafts", _) => {
                let drafts = stores.drafts.list(&session.context.scope(), &Default::default())?;
                for d in drafts {
                    println!("  {}  [{}]  {} / {}", d.id, d.status, d.name_en, d.name_ar);
                }
                continue;
            }
            ("/reset", _) => {
                match session.reset() {
                    Some(id) => println!("Started over. Previous chat archived as {}.", id),
                    None => println!("Nothing to reset."),
                }
                pending = None;
                continue;
            }
            ("/yes" | "/no", _) => {
                let approved = line.starts_with("/yes");
                let Some(p) = pending.take() else {
                    println!("Nothing is waiting for confirmation.");
                    continue;
                };
                confirmation = Some(p.reply(approved));
                let answer = if approved { "Yes, go ahead." } else { "No, don't save them." };
                answer.to_string()
            }
            _ if line.starts_with('/') => {
                println!("Unknown command. Type /help.");
                continue;
            }
            _ => line.to_string(),
        };

        session.push_user(message);
        let mut request = ManagerRequest::new(session.context.clone(), session.history().to_vec())
            .with_image_urls(std::mem::take(&mut attachments));
        request.confirmation = confirmation;

        match stream_turn(&orchestrator, request).await {
            Some(response) => {
                pending = response.confirmation.clone();
                if pending.is_some() {
                    println!("  (answer with /yes or /no)");
                }
                session.push_response(&response);
            }
            None => {
                session.pop_user();
            }
        }
    }
    Ok(())
}

fn prompt(attached: usize) {
    use std::io::Write;
    if attached > 0 {
        print!("[{} photo(s)] > ", attached);
    } else {
        print!("> ");
    }
    let _ = std::io::stdout().flush();
}

/// Print frames as they arrive. Returns the response, or `None` on error.
async fn stream_turn(orchestrator: &Arc<ManagerOrchestrator>, request: ManagerRequest) -> Option<TurnResponse> {
    let mut rx = orchestrator.stream_turn(request);
    let mut response = None;
    while let Some(frame) = rx.recv().await {
        match frame {
            StreamFrame::Step(step) => match &step.bulk_progress {
                Some(progress) => println!("  · {} ({}/{})", step.message, progress.current, progress.total),
                None => println!("  · {}", step.message),
            },
            StreamFrame::Response(r) => {
                println!("\n{}\n", r.content);
                for command in &r.commands {
                    println!("  [ui] {}", serde_json::to_string(command).unwrap_or_default());
                }
                response = Some(r);
            }
            StreamFrame::Error {
                error,
                details,
                retryable,
            } => {
                println!("\nError ({}): {}", error, details.unwrap_or_default());
                if retryable {
                    println!("You can send the same message again.");
                }
            }
            StreamFrame::Done => break,
        }
    }
    response
}
