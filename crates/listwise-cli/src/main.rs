//! Listwise - turn product photos into reviewed, bilingual catalog listings

use anyhow::Result;
use clap::{Parser, Subcommand};

use listwise_core::types::{DraftStatus, Locale, StoreType};
use listwise_core::storage::DraftFilter;
use listwise_core::{paths, Settings};

mod chat;
mod drafts;
mod offline;
mod serve;

#[derive(Parser)]
#[command(name = "listwise")]
#[command(about = "Turn product photos into reviewed, bilingual catalog listings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (overrides config and LISTWISE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the listing assistant in the terminal
    ///
    /// Attach photos with --image or the /image command. Drafts are only
    /// saved to the catalog after you answer /yes to a confirmation.
    Chat {
        #[arg(long, default_value = "local-merchant")]
        merchant: String,
        #[arg(long, default_value = "local-store")]
        store: String,
        /// Reply language: en or ar
        #[arg(long, default_value = "en", value_parser = parse_locale)]
        locale: Locale,
        /// fashion, electronics, grocery, beauty, home_goods, or general
        #[arg(long, default_value = "general", value_parser = parse_store_type)]
        store_type: StoreType,
        /// Image URL to attach to the first message (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,
        /// Use a scripted model and an in-memory database
        #[arg(long)]
        offline: bool,
    },

    /// List drafts for a store
    Drafts {
        #[arg(long, default_value = "local-merchant")]
        merchant: String,
        #[arg(long, default_value = "local-store")]
        store: String,
        #[arg(long)]
        batch: Option<String>,
        /// draft, persisted, or discarded
        #[arg(long)]
        status: Option<DraftStatus>,
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn parse_locale(s: &str) -> Result<Locale, String> {
    match s.to_ascii_lowercase().as_str() {
        "en" | "english" => Ok(Locale::En),
        "ar" | "arabic" => Ok(Locale::Ar),
        other => Err(format!("unknown locale '{}', expected en or ar", other)),
    }
}

fn parse_store_type(s: &str) -> Result<StoreType, String> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
        .map_err(|e| e.to_string())
}

/// Log to a file so output doesn't interleave with the chat transcript.
fn init_file_logging() {
    let log_dir = paths::logs_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {}", e);
        return;
    }
    let log_file = match std::fs::File::create(log_dir.join("listwise.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to create log file: {}, logging disabled", e);
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load()?;

    match cli.command {
        // Serve mode logs to stdout
        Commands::Serve { port } => {
            if let Some(port) = port {
                settings.server.port = port;
            }
            serve::run(&settings).await
        }
        Commands::Chat {
            merchant,
            store,
            locale,
            store_type,
            images,
            offline,
        } => {
            init_file_logging();
            let options = chat::ChatOptions {
                merchant,
                store,
                locale,
                store_type,
                images,
                offline,
            };
            chat::run(&settings, options).await
        }
        Commands::Drafts {
            merchant,
            store,
            batch,
            status,
            json,
        } => {
            init_file_logging();
            drafts::run(&settings, &merchant, &store, DraftFilter { batch_id: batch, status }, json)
        }
    }
}
