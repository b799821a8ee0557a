use anyhow::Result;
use clap::Parser;
use linkgate::config::Config;
use linkgate::server::Server;
use linkgate::store::redacted;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("linkgate={},tower_http=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting linkgate");
    tracing::info!(
        "Configuration: bind_addr={}, store={:?}, redis_url={}",
        config.bind_addr,
        config.store,
        redacted(&config.redis_url)
    );

    let server = Server::new(config)
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
