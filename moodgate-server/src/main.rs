use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (MOODGATE_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("MOODGATE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("moodgate_server=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let config = moodgate_server::config::ServerConfig::parse();
    tracing::info!("Starting moodgate server on {}", config.listen_addr);
    if config.telegram_token.is_empty() {
        tracing::warn!("TELEGRAM_TOKEN not set: identity linking will reject every payload");
    }

    let db = Arc::new(moodgate_server::db::Db::open(&config.db_path)?);
    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(moodgate_server::web::SharedState::new(config, db));
    let app = moodgate_server::web::router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
