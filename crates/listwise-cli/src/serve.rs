//! `listwise serve` - the HTTP API server

use anyhow::Result;

use listwise_core::Settings;

pub async fn run(settings: &Settings) -> Result<()> {
    // Initialize tracing for server mode (stdout, not file)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    println!();
    println!("  Listwise API on http://localhost:{}", settings.server.port);
    println!("  Database: {}", settings.database_path.display());
    println!();

    let server = listwise_server::start_server(settings);
    tokio::select! {
        result = server => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}
